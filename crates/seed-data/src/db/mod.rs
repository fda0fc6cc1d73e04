//! Database integration for seeding the dashboard.
//!
//! [`Seeder`] creates the dashboard tables when missing and inserts seed
//! records once per key, one transaction per table.

pub mod schema;
mod seeder;

pub use seeder::{InsertOutcome, SeedError, SeedReport, Seeder, Table, TableReport, TableState};
