pub mod catalog;
pub mod clv;
pub mod loader;
pub mod sample;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::data::clv::{estimate_clv, EngagementScale};
use crate::error::OptimizeError;
use crate::model::{
    Action, ActionCatalog, Channel, Customer, EligibilityRule, PaymentPlan, SubscriptionTier,
};

/// One row of the customer table as it arrives from a file or request body.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CustomerRecord {
    pub customer_id: String,
    #[serde(alias = "p")]
    pub churn_probability: f64,
    #[serde(default, alias = "v")]
    pub clv: Option<f64>,
    #[serde(default)]
    pub subscription_type: Option<String>,
    #[serde(default)]
    pub payment_plan: Option<String>,
    #[serde(default)]
    pub weekly_hours: Option<f64>,
    #[serde(default)]
    pub weekly_songs_played: Option<f64>,
}

/// One row of the action table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionRecord {
    pub action_id: u32,
    pub action_name: String,
    pub channel: String,
    pub cost: f64,
    pub uplift: f64,
    pub eligible_segment: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Validate raw customer rows and derive segmentation.
///
/// Rows without a lifetime value get the subscription/engagement proxy from
/// [`estimate_clv`].
pub fn build_customers(records: Vec<CustomerRecord>) -> Result<Vec<Customer>, OptimizeError> {
    if records.is_empty() {
        return Err(OptimizeError::input("customer", "customer table is empty"));
    }

    let scale = EngagementScale::from_records(&records);
    let mut seen = BTreeSet::new();
    let mut customers = Vec::with_capacity(records.len());
    for record in records {
        let id = record.customer_id.trim().to_string();
        if id.is_empty() {
            return Err(OptimizeError::input("customer", "blank customer_id"));
        }
        if !seen.insert(id.clone()) {
            return Err(OptimizeError::input(
                "customer",
                format!("duplicate customer_id {id}"),
            ));
        }
        let p = record.churn_probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(OptimizeError::input(
                "customer",
                format!("customer {id}: churn probability {p} outside [0, 1]"),
            ));
        }
        let subscription = match record.subscription_type.as_deref() {
            Some(raw) => raw.parse::<SubscriptionTier>().map_err(|e| {
                OptimizeError::input("customer", format!("customer {id}: {e}"))
            })?,
            None => SubscriptionTier::Unknown,
        };
        let payment_plan = match record.payment_plan.as_deref() {
            Some(raw) if !raw.trim().is_empty() => Some(raw.parse::<PaymentPlan>().map_err(|e| {
                OptimizeError::input("customer", format!("customer {id}: {e}"))
            })?),
            _ => None,
        };
        let value = match record.clv {
            Some(v) => v,
            None => estimate_clv(
                subscription,
                payment_plan,
                scale.score(record.weekly_hours, record.weekly_songs_played),
            ),
        };
        if !value.is_finite() || value < 0.0 {
            return Err(OptimizeError::input(
                "customer",
                format!("customer {id}: lifetime value {value} is negative"),
            ));
        }
        customers.push(Customer::new(id, p, value, subscription, payment_plan));
    }
    Ok(customers)
}

pub fn build_catalog(records: Vec<ActionRecord>) -> Result<ActionCatalog, OptimizeError> {
    let mut actions = Vec::with_capacity(records.len());
    for record in records {
        let channel = record.channel.parse::<Channel>().map_err(|e| {
            OptimizeError::input("action", format!("action {}: {e}", record.action_id))
        })?;
        actions.push(Action {
            id: record.action_id,
            name: record.action_name,
            channel,
            cost: record.cost,
            uplift: record.uplift,
            eligibility: EligibilityRule::parse(&record.eligible_segment),
            description: record.description.unwrap_or_default(),
        });
    }
    ActionCatalog::new(actions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, p: f64, clv: Option<f64>, tier: &str) -> CustomerRecord {
        CustomerRecord {
            customer_id: id.to_string(),
            churn_probability: p,
            clv,
            subscription_type: Some(tier.to_string()),
            ..CustomerRecord::default()
        }
    }

    #[test]
    fn builds_customers_with_segments() {
        let customers = build_customers(vec![
            record("a", 0.72, Some(240.0), "Premium"),
            record("b", 0.1, Some(500.0), "Free"),
        ])
        .expect("valid customers");
        assert_eq!(customers.len(), 2);
        assert_eq!(customers[0].risk_tier(), crate::model::RiskTier::High);
        assert!(customers[1].is_high_value());
    }

    #[test]
    fn rejects_empty_duplicate_and_out_of_range_rows() {
        assert!(build_customers(vec![]).is_err());
        assert!(build_customers(vec![
            record("a", 0.2, Some(10.0), "Free"),
            record("a", 0.3, Some(10.0), "Free")
        ])
        .is_err());
        assert!(build_customers(vec![record("a", 1.2, Some(10.0), "Free")]).is_err());
        assert!(build_customers(vec![record("a", 0.2, Some(-1.0), "Free")]).is_err());
        assert!(build_customers(vec![record("a", 0.2, Some(1.0), "Platinum")]).is_err());
    }

    #[test]
    fn missing_value_falls_back_to_proxy() {
        let customers =
            build_customers(vec![record("a", 0.4, None, "Premium")]).expect("valid customers");
        // 240 base * 1.0 monthly * (1 + 0.5) * 2 years
        assert!((customers[0].lifetime_value() - 720.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_channel_is_input_error() {
        let err = build_catalog(vec![ActionRecord {
            action_id: 0,
            action_name: "No Action".to_string(),
            channel: "fax".to_string(),
            cost: 0.0,
            uplift: 0.0,
            eligible_segment: "all".to_string(),
            description: None,
        }])
        .unwrap_err();
        assert!(err.to_string().contains("fax"));
    }
}
