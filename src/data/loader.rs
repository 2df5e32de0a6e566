use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tracing::info;

use crate::data::{build_catalog, build_customers, ActionRecord, CustomerRecord};
use crate::error::OptimizeError;
use crate::model::{ActionCatalog, Customer};

const CUSTOMER_REQUIRED: &[&[&str]] = &[&["customer_id"], &["churn_probability", "p"]];
const ACTION_REQUIRED: &[&[&str]] = &[
    &["action_id"],
    &["action_name"],
    &["channel"],
    &["cost"],
    &["uplift"],
    &["eligible_segment"],
];

pub fn load_customers(path: &Path) -> Result<Vec<Customer>> {
    let file = File::open(path)
        .with_context(|| format!("failed opening customer file: {}", path.display()))?;
    let customers = read_customers(file)
        .with_context(|| format!("failed loading customers from {}", path.display()))?;
    info!("loaded {} customers from {}", customers.len(), path.display());
    Ok(customers)
}

pub fn load_actions(path: &Path) -> Result<ActionCatalog> {
    let file = File::open(path)
        .with_context(|| format!("failed opening action file: {}", path.display()))?;
    let catalog = read_actions(file)
        .with_context(|| format!("failed loading actions from {}", path.display()))?;
    info!("loaded {} actions from {}", catalog.len(), path.display());
    Ok(catalog)
}

pub fn read_customers<R: Read>(reader: R) -> Result<Vec<Customer>, OptimizeError> {
    let records: Vec<CustomerRecord> = read_records(reader, "customer", CUSTOMER_REQUIRED)?;
    build_customers(records)
}

pub fn read_actions<R: Read>(reader: R) -> Result<ActionCatalog, OptimizeError> {
    let records: Vec<ActionRecord> = read_records(reader, "action", ACTION_REQUIRED)?;
    build_catalog(records)
}

fn read_records<R: Read, T: DeserializeOwned>(
    reader: R,
    table: &'static str,
    required: &[&[&str]],
) -> Result<Vec<T>, OptimizeError> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = csv_reader
        .headers()
        .map_err(|e| OptimizeError::input(table, format!("unreadable header: {e}")))?
        .clone();
    for alternatives in required {
        if !alternatives.iter().any(|name| headers.iter().any(|h| h == *name)) {
            return Err(OptimizeError::input(
                table,
                format!("missing required column `{}`", alternatives.join("` or `")),
            ));
        }
    }

    let mut out = Vec::new();
    for (idx, row) in csv_reader.deserialize::<T>().enumerate() {
        let record = row.map_err(|e| OptimizeError::input(table, format!("row {}: {e}", idx + 1)))?;
        out.push(record);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EligibilityRule, SubscriptionTier};

    #[test]
    fn reads_customers_with_optional_columns() {
        let data = "customer_id,churn_probability,subscription_type,payment_plan,clv\n\
                    c1,0.72,Premium,Monthly,240\n\
                    c2,0.10,Free,Yearly,\n";
        let customers = read_customers(data.as_bytes()).expect("valid table");
        assert_eq!(customers.len(), 2);
        assert_eq!(customers[0].subscription(), SubscriptionTier::Premium);
        assert!((customers[0].lifetime_value() - 240.0).abs() < 1e-9);
        // Free yearly without engagement: 100 * 1.3 * 1.5 * 2
        assert!((customers[1].lifetime_value() - 390.0).abs() < 1e-9);
    }

    #[test]
    fn accepts_short_column_aliases() {
        let data = "customer_id,p,v\nc1,0.5,100\n";
        let customers = read_customers(data.as_bytes()).expect("valid table");
        assert_eq!(customers[0].subscription(), SubscriptionTier::Unknown);
        assert!((customers[0].at_risk_value() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn missing_required_column_is_reported() {
        let err = read_customers("customer_id,clv\nc1,100\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("churn_probability"));
    }

    #[test]
    fn header_only_table_is_empty_input() {
        let err = read_customers("customer_id,churn_probability\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn reads_action_table() {
        let data = "action_id,action_name,channel,cost,uplift,eligible_segment\n\
                    0,No Action,none,0,0,all\n\
                    1,Win-Back,email,30,0.22,all\n\
                    2,Gold Perk,call,40,0.3,Gold\n";
        let catalog = read_actions(data.as_bytes()).expect("valid catalog");
        assert_eq!(catalog.len(), 3);
        assert_eq!(
            catalog.actions()[2].eligibility,
            EligibilityRule::Unmatched("Gold".to_string())
        );
    }
}
