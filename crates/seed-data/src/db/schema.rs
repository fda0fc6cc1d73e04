//! DDL for the dashboard tables. Every statement is safe to re-run.

pub const CREATE_USERS: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id UUID PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    email TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL
)
"#;

pub const CREATE_CUSTOMERS: &str = r#"
CREATE TABLE IF NOT EXISTS customers (
    id UUID PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    email VARCHAR(255) NOT NULL,
    image_url VARCHAR(255) NOT NULL
)
"#;

pub const CREATE_INVOICES: &str = r#"
CREATE TABLE IF NOT EXISTS invoices (
    id UUID PRIMARY KEY,
    customer_id UUID NOT NULL,
    amount INT NOT NULL,
    status VARCHAR(255) NOT NULL,
    date DATE NOT NULL
)
"#;

pub const CREATE_REVENUE: &str = r#"
CREATE TABLE IF NOT EXISTS revenue (
    month VARCHAR(4) NOT NULL UNIQUE,
    revenue INT NOT NULL
)
"#;

/// Provides `uuid_generate_v4()` for server-generated invoice ids.
pub const CREATE_UUID_EXTENSION: &str = r#"CREATE EXTENSION IF NOT EXISTS "uuid-ossp""#;

pub const INVOICE_ID_DEFAULT: &str =
    "ALTER TABLE invoices ALTER COLUMN id SET DEFAULT uuid_generate_v4()";
