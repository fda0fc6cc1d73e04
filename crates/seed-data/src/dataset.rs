//! Seed dataset loading.

use std::collections::HashSet;
use std::env::VarError;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use dashboard::models::{Customer, Invoice, RevenuePoint, User};

const PLACEHOLDER_JSON: &str = include_str!("../data/placeholder.json");

/// Names a JSON dataset file that replaces the placeholder data.
pub const DATASET_VAR: &str = "SEED_DATASET";

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Failed to read dataset: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid dataset JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid SEED_DATASET: {0}")]
    Var(#[from] VarError),
}

/// Records to seed, in the order each table receives them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedDataset {
    pub users: Vec<User>,
    pub customers: Vec<Customer>,
    pub invoices: Vec<Invoice>,
    pub revenue: Vec<RevenuePoint>,
}

impl SeedDataset {
    /// The dashboard's built-in placeholder data.
    pub fn placeholder() -> Result<Self, DatasetError> {
        Self::from_json(PLACEHOLDER_JSON)
    }

    /// Loads the file named by `SEED_DATASET`, or the placeholder data when
    /// it is unset.
    pub fn from_env() -> Result<Self, DatasetError> {
        Self::from_var(std::env::var(DATASET_VAR))
    }

    pub fn from_var(value: Result<String, VarError>) -> Result<Self, DatasetError> {
        match value {
            Ok(path) => Self::from_path(path),
            Err(VarError::NotPresent) => Self::placeholder(),
            Err(err) => Err(err.into()),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, DatasetError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Invoices whose `customer_id` names no customer in this dataset.
    ///
    /// The schema has no foreign key, so these would seed without error.
    pub fn dangling_invoices(&self) -> Vec<&Invoice> {
        let customer_ids: HashSet<_> = self.customers.iter().map(|c| c.id).collect();
        self.invoices
            .iter()
            .filter(|invoice| !customer_ids.contains(&invoice.customer_id))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
            && self.customers.is_empty()
            && self.invoices.is_empty()
            && self.revenue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_placeholder_loads() {
        let dataset = SeedDataset::placeholder().unwrap();

        assert_eq!(dataset.users.len(), 1);
        assert_eq!(dataset.customers.len(), 6);
        assert_eq!(dataset.invoices.len(), 13);
        assert_eq!(dataset.revenue.len(), 12);
    }

    #[test]
    fn test_placeholder_is_consistent() {
        let dataset = SeedDataset::placeholder().unwrap();

        assert!(dataset.dangling_invoices().is_empty());

        let months: HashSet<_> = dataset.revenue.iter().map(|r| r.month.as_str()).collect();
        assert_eq!(months.len(), dataset.revenue.len());
        assert!(dataset.revenue.iter().all(|r| (3..=4).contains(&r.month.len())));
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let dataset = SeedDataset::from_json(r#"{"revenue": [{"month": "Jan", "revenue": 10}]}"#)
            .unwrap();

        assert!(dataset.users.is_empty());
        assert!(dataset.customers.is_empty());
        assert!(dataset.invoices.is_empty());
        assert_eq!(dataset.revenue.len(), 1);
        assert!(!dataset.is_empty());
        assert!(SeedDataset::from_json("{}").unwrap().is_empty());
    }

    #[test]
    fn test_dangling_invoices_are_reported() {
        let orphan = Uuid::new_v4();
        let dataset = SeedDataset::from_json(&format!(
            r#"{{
                "customers": [{{
                    "id": "3958dc9e-712f-4377-85e9-fec4b6a6442a",
                    "name": "Delba de Oliveira",
                    "email": "delba@oliveira.com",
                    "image_url": "/customers/delba-de-oliveira.png"
                }}],
                "invoices": [
                    {{"customer_id": "3958dc9e-712f-4377-85e9-fec4b6a6442a", "amount": 500, "status": "paid", "date": "2023-08-19"}},
                    {{"customer_id": "{orphan}", "amount": 666, "status": "pending", "date": "2023-06-27"}}
                ]
            }}"#
        ))
        .unwrap();

        let dangling = dataset.dangling_invoices();
        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].customer_id, orphan);
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        let result = SeedDataset::from_json(r#"{"users": [{"id": "not-a-uuid"}]}"#);
        assert!(matches!(result, Err(DatasetError::Json(_))));
    }

    #[test]
    fn test_unset_var_uses_placeholder() {
        let dataset = SeedDataset::from_var(Err(VarError::NotPresent)).unwrap();
        assert_eq!(dataset.customers.len(), 6);
    }

    #[test]
    fn test_non_unicode_var_is_an_error() {
        let value = Err(VarError::NotUnicode(std::ffi::OsString::from("seed.json")));
        let result = SeedDataset::from_var(value);
        assert!(matches!(result, Err(DatasetError::Var(VarError::NotUnicode(_)))));
    }

    #[test]
    fn test_var_names_missing_file() {
        let result = SeedDataset::from_var(Ok("/nonexistent/seed.json".to_string()));
        assert!(matches!(result, Err(DatasetError::Io(_))));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = SeedDataset::from_path("/nonexistent/seed.json");
        assert!(matches!(result, Err(DatasetError::Io(_))));
    }
}
