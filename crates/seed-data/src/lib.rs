//! Database seeding for the invoicing dashboard.
//!
//! Creates the `users`, `customers`, `invoices` and `revenue` tables if they are
//! absent and inserts seed records without duplicating ones already present.
//! Running it again is a no-op.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use seed_data::prelude::*;
//!
//! let config = DbConfig::from_env()?;
//! let pool = PgPoolOptions::new()
//!     .max_connections(1)
//!     .connect_with(config.connect_options()?)
//!     .await?;
//!
//! let report = Seeder::new(pool)
//!     .seed(&SeedDataset::placeholder()?)
//!     .await?;
//! ```

pub mod config;
pub mod dataset;
pub mod db;

// Re-export the seeded record types from the dashboard crate
pub use dashboard::models::{Customer, Invoice, InvoiceStatus, RevenuePoint, User};

pub mod prelude {
    //! Convenient re-exports for common usage.

    pub use crate::config::{ConfigError, DbConfig};
    pub use crate::dataset::{DatasetError, SeedDataset};
    pub use crate::db::{SeedError, SeedReport, Seeder, Table, TableReport};
    pub use crate::{Customer, Invoice, InvoiceStatus, RevenuePoint, User};
}
