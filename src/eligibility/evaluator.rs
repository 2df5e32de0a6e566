use tracing::debug;

use crate::eligibility::{EligibilitySet, EligiblePair};
use crate::model::{Action, ActionCatalog, Customer};

/// Expected net value of giving `action` to `customer`.
pub fn net_value_coefficient(customer: &Customer, action: &Action) -> f64 {
    expected_retained_value(customer, action) - action.cost
}

/// Churn-weighted value the action is expected to save, `p * uplift * v`.
pub fn expected_retained_value(customer: &Customer, action: &Action) -> f64 {
    customer.churn_probability() * action.uplift * customer.lifetime_value()
}

/// Evaluate every action rule against every customer.
///
/// Negative coefficients are kept; the model is free to leave those pairs
/// unselected. An empty customer slice yields an empty set.
pub fn build_eligible_pairs(customers: &[Customer], catalog: &ActionCatalog) -> EligibilitySet {
    let mut pairs = Vec::with_capacity(customers.len() * catalog.len());
    for (ci, customer) in customers.iter().enumerate() {
        for (ai, action) in catalog.actions().iter().enumerate() {
            if !action.eligibility.admits(customer) {
                continue;
            }
            pairs.push(EligiblePair {
                customer: ci,
                action: ai,
                cost: action.cost,
                coefficient: net_value_coefficient(customer, action),
                is_default: action.is_default(),
            });
        }
    }

    for action in catalog.actions() {
        let admitted = customers
            .iter()
            .filter(|c| action.eligibility.admits(c))
            .count();
        if admitted == 0 && !customers.is_empty() {
            debug!(
                "action {} ({}) has no eligible customers under rule `{}`",
                action.id, action.name, action.eligibility
            );
        }
    }

    debug!(
        "built {} eligible pairs for {} customers x {} actions",
        pairs.len(),
        customers.len(),
        catalog.len()
    );
    EligibilitySet {
        pairs,
        customer_count: customers.len(),
    }
}
