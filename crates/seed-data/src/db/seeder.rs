//! Database seeding utilities.

use std::collections::HashMap;
use std::fmt;

use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{Connection, PgConnection, PgPool, Postgres};
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::dataset::SeedDataset;
use crate::db::schema;
use dashboard::auth::hash_password;
use dashboard::models::{Customer, Invoice, RevenuePoint, User};

type InsertQuery<'q> = Query<'q, Postgres, PgArguments>;

/// The tables the seeder owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Users,
    Customers,
    Invoices,
    Revenue,
}

impl Table {
    /// Order in which [`Seeder::seed`] visits the tables.
    pub const SEED_ORDER: [Table; 4] = [
        Table::Users,
        Table::Customers,
        Table::Invoices,
        Table::Revenue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Users => "users",
            Table::Customers => "customers",
            Table::Invoices => "invoices",
            Table::Revenue => "revenue",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Failed to create table {table}: {source}")]
    Schema {
        table: Table,
        #[source]
        source: sqlx::Error,
    },
    #[error("Insert into {table} rejected: {source}")]
    ConstraintViolation {
        table: Table,
        #[source]
        source: sqlx::Error,
    },
    #[error("Database error: {0}")]
    Connection(#[from] sqlx::Error),
    #[error("Failed to hash password: {0}")]
    Hashing(#[from] bcrypt::BcryptError),
    #[error("Password hashing task failed: {0}")]
    HashingTask(#[from] tokio::task::JoinError),
}

impl SeedError {
    /// Errors reported by the server count as rejected rows; anything else
    /// means the connection itself failed.
    fn from_insert(table: Table, err: sqlx::Error) -> Self {
        if err.as_database_error().is_some() {
            SeedError::ConstraintViolation { table, source: err }
        } else {
            SeedError::Connection(err)
        }
    }

    /// The table being seeded when the error occurred, if known.
    pub fn table(&self) -> Option<Table> {
        match self {
            SeedError::Schema { table, .. } | SeedError::ConstraintViolation { table, .. } => {
                Some(*table)
            }
            _ => None,
        }
    }
}

/// Progress of a single table through a seeding run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    NotStarted,
    TableEnsured,
    TransactionOpen,
    Committed,
    RolledBack,
}

fn transition(table: Table, state: TableState) {
    debug!(table = %table, state = ?state, "table state");
}

/// Result of a single insert-or-skip statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The row's key was already present; nothing was written.
    Skipped,
}

impl InsertOutcome {
    fn from_rows_affected(rows: u64) -> Self {
        if rows == 0 {
            InsertOutcome::Skipped
        } else {
            InsertOutcome::Inserted
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReport {
    pub table: Table,
    pub attempted: usize,
    pub inserted: usize,
    pub skipped: usize,
}

impl TableReport {
    fn new(table: Table, attempted: usize) -> Self {
        Self {
            table,
            attempted,
            inserted: 0,
            skipped: 0,
        }
    }

    fn record(&mut self, outcome: InsertOutcome) {
        match outcome {
            InsertOutcome::Inserted => self.inserted += 1,
            InsertOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Per-table results of a completed run, in seeding order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub tables: Vec<TableReport>,
}

impl SeedReport {
    pub fn table(&self, table: Table) -> Option<&TableReport> {
        self.tables.iter().find(|report| report.table == table)
    }

    pub fn total_inserted(&self) -> usize {
        self.tables.iter().map(|report| report.inserted).sum()
    }
}

/// Creates the dashboard tables and inserts seed records, skipping any whose
/// key is already present.
pub struct Seeder {
    pool: PgPool,
}

impl Seeder {
    /// Creates a new seeder with the given database pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Seeds every table over one connection, in [`Table::SEED_ORDER`].
    ///
    /// Each table commits on its own. A failure stops the run but leaves
    /// earlier tables committed.
    pub async fn seed(&self, dataset: &SeedDataset) -> Result<SeedReport, SeedError> {
        for invoice in dataset.dangling_invoices() {
            warn!(
                customer_id = %invoice.customer_id,
                amount = invoice.amount,
                date = %invoice.date,
                "invoice references a customer missing from the dataset"
            );
        }

        let mut conn = self.pool.acquire().await?;

        let mut report = SeedReport::default();
        report
            .tables
            .push(self.seed_users(&mut conn, &dataset.users).await?);
        report
            .tables
            .push(self.seed_customers(&mut conn, &dataset.customers).await?);
        report
            .tables
            .push(self.seed_invoices(&mut conn, &dataset.invoices).await?);
        report
            .tables
            .push(self.seed_revenue(&mut conn, &dataset.revenue).await?);

        Ok(report)
    }

    /// Seeds users keyed by id, storing bcrypt hashes in place of their
    /// passwords. A new id with an email already taken is rejected.
    pub async fn seed_users(
        &self,
        conn: &mut PgConnection,
        users: &[User],
    ) -> Result<TableReport, SeedError> {
        let table = Table::Users;
        transition(table, TableState::NotStarted);
        ensure_table(conn, table, &[schema::CREATE_USERS]).await?;

        let hashes = hash_passwords(users).await?;

        let inserts = users
            .iter()
            .zip(hashes)
            .map(|(user, password_hash)| {
                sqlx::query(
                    r#"
                    INSERT INTO users (id, name, email, password)
                    VALUES ($1, $2, $3, $4)
                    ON CONFLICT (id) DO NOTHING
                    "#,
                )
                .bind(user.id)
                .bind(&user.name)
                .bind(&user.email)
                .bind(password_hash)
            })
            .collect();

        insert_all(conn, table, inserts).await
    }

    /// Seeds customers keyed by id.
    pub async fn seed_customers(
        &self,
        conn: &mut PgConnection,
        customers: &[Customer],
    ) -> Result<TableReport, SeedError> {
        let table = Table::Customers;
        transition(table, TableState::NotStarted);
        ensure_table(conn, table, &[schema::CREATE_CUSTOMERS]).await?;

        let inserts = customers
            .iter()
            .map(|customer| {
                sqlx::query(
                    r#"
                    INSERT INTO customers (id, name, email, image_url)
                    VALUES ($1, $2, $3, $4)
                    ON CONFLICT (id) DO NOTHING
                    "#,
                )
                .bind(customer.id)
                .bind(&customer.name)
                .bind(&customer.email)
                .bind(&customer.image_url)
            })
            .collect();

        insert_all(conn, table, inserts).await
    }

    /// Seeds invoices. Ids come from the database, so the n-th copy of an
    /// invoice in `invoices` is skipped once n identical rows already exist.
    pub async fn seed_invoices(
        &self,
        conn: &mut PgConnection,
        invoices: &[Invoice],
    ) -> Result<TableReport, SeedError> {
        let table = Table::Invoices;
        transition(table, TableState::NotStarted);
        ensure_table(
            conn,
            table,
            &[
                schema::CREATE_INVOICES,
                schema::CREATE_UUID_EXTENSION,
                schema::INVOICE_ID_DEFAULT,
            ],
        )
        .await?;

        let inserts = invoices
            .iter()
            .zip(occurrences(invoices))
            .map(|(invoice, occurrence)| {
                sqlx::query(
                    r#"
                    INSERT INTO invoices (customer_id, amount, status, date)
                    SELECT $1, $2, $3, $4
                    WHERE (
                        SELECT COUNT(*) FROM invoices
                        WHERE customer_id = $1 AND amount = $2 AND status = $3 AND date = $4
                    ) < $5
                    "#,
                )
                .bind(invoice.customer_id)
                .bind(invoice.amount)
                .bind(invoice.status.as_str())
                .bind(invoice.date)
                .bind(occurrence)
            })
            .collect();

        insert_all(conn, table, inserts).await
    }

    /// Seeds monthly revenue keyed by month code.
    pub async fn seed_revenue(
        &self,
        conn: &mut PgConnection,
        revenue: &[RevenuePoint],
    ) -> Result<TableReport, SeedError> {
        let table = Table::Revenue;
        transition(table, TableState::NotStarted);
        ensure_table(conn, table, &[schema::CREATE_REVENUE]).await?;

        let inserts = revenue
            .iter()
            .map(|point| {
                sqlx::query(
                    r#"
                    INSERT INTO revenue (month, revenue)
                    VALUES ($1, $2)
                    ON CONFLICT (month) DO NOTHING
                    "#,
                )
                .bind(&point.month)
                .bind(point.revenue)
            })
            .collect();

        insert_all(conn, table, inserts).await
    }
}

/// For each invoice, how many identical invoices appear up to and including
/// it, starting at 1.
fn occurrences(invoices: &[Invoice]) -> Vec<i64> {
    let mut seen: HashMap<&Invoice, i64> = HashMap::new();
    invoices
        .iter()
        .map(|invoice| {
            let count = seen.entry(invoice).or_insert(0);
            *count += 1;
            *count
        })
        .collect()
}

async fn ensure_table(
    conn: &mut PgConnection,
    table: Table,
    statements: &[&str],
) -> Result<(), SeedError> {
    for statement in statements {
        sqlx::query(statement)
            .execute(&mut *conn)
            .await
            .map_err(|source| SeedError::Schema { table, source })?;
    }

    info!("{} table created", table);
    transition(table, TableState::TableEnsured);
    Ok(())
}

/// Hashes every user's password on the blocking pool. The result is in
/// the same order as `users`.
async fn hash_passwords(users: &[User]) -> Result<Vec<String>, SeedError> {
    let mut tasks = JoinSet::new();
    for (index, user) in users.iter().enumerate() {
        let password = user.password.clone();
        tasks.spawn_blocking(move || hash_password(&password).map(|hash| (index, hash)));
    }

    let mut hashes = vec![String::new(); users.len()];
    while let Some(joined) = tasks.join_next().await {
        let (index, hash) = joined??;
        hashes[index] = hash;
    }

    Ok(hashes)
}

/// Runs `inserts` in one transaction, committing only if all succeed.
///
/// A Postgres transaction cannot interleave statements, so the inserts run one
/// after another. Their order does not matter.
async fn insert_all(
    conn: &mut PgConnection,
    table: Table,
    inserts: Vec<InsertQuery<'_>>,
) -> Result<TableReport, SeedError> {
    let mut report = TableReport::new(table, inserts.len());

    let mut tx = conn.begin().await?;
    transition(table, TableState::TransactionOpen);

    for insert in inserts {
        match insert.execute(&mut *tx).await {
            Ok(result) => report.record(InsertOutcome::from_rows_affected(result.rows_affected())),
            Err(err) => {
                warn!(table = %table, error = %err, "insert failed, rolling back");
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(table = %table, error = %rollback_err, "rollback failed");
                }
                transition(table, TableState::RolledBack);
                return Err(SeedError::from_insert(table, err));
            }
        }
    }

    // Deferred constraints are checked here; a failed commit rolls back
    if let Err(err) = tx.commit().await {
        warn!(table = %table, error = %err, "commit failed");
        transition(table, TableState::RolledBack);
        return Err(SeedError::from_insert(table, err));
    }
    transition(table, TableState::Committed);

    info!(
        "Seeded {}: {} inserted, {} already present",
        table, report.inserted, report.skipped
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_order() {
        let names: Vec<_> = Table::SEED_ORDER.iter().map(Table::as_str).collect();
        assert_eq!(names, ["users", "customers", "invoices", "revenue"]);
    }

    #[test]
    fn test_conflict_is_a_skip() {
        assert_eq!(InsertOutcome::from_rows_affected(0), InsertOutcome::Skipped);
        assert_eq!(InsertOutcome::from_rows_affected(1), InsertOutcome::Inserted);
    }

    #[test]
    fn test_occurrences_number_identical_invoices() {
        let invoice = Invoice {
            customer_id: uuid::Uuid::new_v4(),
            amount: 500,
            status: dashboard::models::InvoiceStatus::Paid,
            date: time::macros::date!(2023 - 08 - 19),
        };
        let other = Invoice {
            amount: 1000,
            ..invoice.clone()
        };

        let counts = occurrences(&[invoice.clone(), other, invoice.clone(), invoice]);
        assert_eq!(counts, [1, 1, 2, 3]);
    }

    #[test]
    fn test_table_report_counts() {
        let mut report = TableReport::new(Table::Revenue, 3);
        report.record(InsertOutcome::Inserted);
        report.record(InsertOutcome::Skipped);
        report.record(InsertOutcome::Inserted);

        assert_eq!(report.attempted, 3);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn test_seed_report_lookup() {
        let report = SeedReport {
            tables: vec![
                TableReport {
                    table: Table::Users,
                    attempted: 1,
                    inserted: 1,
                    skipped: 0,
                },
                TableReport {
                    table: Table::Revenue,
                    attempted: 12,
                    inserted: 4,
                    skipped: 8,
                },
            ],
        };

        assert_eq!(report.table(Table::Revenue).map(|r| r.skipped), Some(8));
        assert!(report.table(Table::Invoices).is_none());
        assert_eq!(report.total_inserted(), 5);
    }

    #[test]
    fn test_non_database_insert_error_is_connection_error() {
        let err = SeedError::from_insert(Table::Customers, sqlx::Error::PoolTimedOut);
        assert!(matches!(err, SeedError::Connection(_)));
        assert_eq!(err.table(), None);
    }

    #[tokio::test]
    async fn test_hash_passwords_keeps_order() {
        let users: Vec<User> = ["first", "second", "third"]
            .iter()
            .map(|password| User {
                id: uuid::Uuid::new_v4(),
                name: password.to_string(),
                email: format!("{password}@nextmail.com"),
                password: password.to_string(),
            })
            .collect();

        let hashes = hash_passwords(&users).await.unwrap();

        assert_eq!(hashes.len(), 3);
        for (user, hash) in users.iter().zip(&hashes) {
            assert_ne!(&user.password, hash);
            assert!(dashboard::auth::verify_password(&user.password, hash).unwrap());
        }
    }

    #[tokio::test]
    async fn test_hash_passwords_empty() {
        assert!(hash_passwords(&[]).await.unwrap().is_empty());
    }
}
