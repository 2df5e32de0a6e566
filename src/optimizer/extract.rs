use serde::{Deserialize, Serialize};

use crate::eligibility::evaluator::expected_retained_value;
use crate::model::{ActionCatalog, Channel, Customer, RiskTier, SubscriptionTier, ValueTier};
use crate::optimizer::assembler::AssembledModel;

/// Solver values above this are read as "selected".
pub const SELECTION_THRESHOLD: f64 = 0.5;

/// A customer paired with the treatment the plan chose for them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub customer_id: String,
    pub subscription_type: SubscriptionTier,
    pub risk_tier: RiskTier,
    pub value_tier: ValueTier,
    pub churn_probability: f64,
    pub lifetime_value: f64,
    pub action_id: u32,
    pub action_name: String,
    pub channel: Channel,
    pub cost: f64,
    pub uplift: f64,
    pub expected_retained_value: f64,
    pub net_value: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlanKpis {
    pub customers_treated: usize,
    pub total_cost: f64,
    pub expected_retained_value: f64,
    pub net_value: f64,
    /// Expected number of churners saved, `sum(p * uplift)`.
    pub expected_churn_reduction: f64,
    pub roi_pct: f64,
}

/// Read selected pairs back into assignments, in customer order.
///
/// Only call this with values from a solved model; the no-op action is
/// never emitted.
pub fn extract_assignments(
    model: &AssembledModel,
    values: &[f64],
    customers: &[Customer],
    catalog: &ActionCatalog,
) -> Vec<Assignment> {
    model
        .eligibility
        .pairs
        .iter()
        .zip(values)
        .filter(|(pair, x)| **x > SELECTION_THRESHOLD && !pair.is_default)
        .filter_map(|(pair, _)| {
            let customer = customers.get(pair.customer)?;
            let action = catalog.get(pair.action)?;
            let retained = expected_retained_value(customer, action);
            Some(Assignment {
                customer_id: customer.id().to_string(),
                subscription_type: customer.subscription(),
                risk_tier: customer.risk_tier(),
                value_tier: customer.value_tier(),
                churn_probability: customer.churn_probability(),
                lifetime_value: customer.lifetime_value(),
                action_id: action.id,
                action_name: action.name.clone(),
                channel: action.channel,
                cost: action.cost,
                uplift: action.uplift,
                expected_retained_value: retained,
                net_value: retained - action.cost,
            })
        })
        .collect()
}

pub fn compute_kpis(assignments: &[Assignment]) -> PlanKpis {
    let total_cost: f64 = assignments.iter().map(|a| a.cost).sum();
    let retained: f64 = assignments.iter().map(|a| a.expected_retained_value).sum();
    PlanKpis {
        customers_treated: assignments.len(),
        total_cost,
        expected_retained_value: retained,
        net_value: retained - total_cost,
        expected_churn_reduction: assignments
            .iter()
            .map(|a| a.churn_probability * a.uplift)
            .sum(),
        roi_pct: roi(retained, total_cost),
    }
}

/// `(retained / spend - 1) * 100`, or 0 when nothing was spent.
pub fn roi(retained: f64, spend: f64) -> f64 {
    if spend > 0.0 {
        (retained / spend - 1.0) * 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(id: &str, p: f64, v: f64, cost: f64, uplift: f64) -> Assignment {
        let retained = p * uplift * v;
        Assignment {
            customer_id: id.to_string(),
            subscription_type: SubscriptionTier::Premium,
            risk_tier: RiskTier::classify(p),
            value_tier: ValueTier::classify(v),
            churn_probability: p,
            lifetime_value: v,
            action_id: 2,
            action_name: "20% Discount Offer".to_string(),
            channel: Channel::Email,
            cost,
            uplift,
            expected_retained_value: retained,
            net_value: retained - cost,
        }
    }

    #[test]
    fn kpis_aggregate_assignments() {
        let plan = vec![
            assignment("a", 0.72, 240.0, 20.0, 0.15),
            assignment("b", 0.5, 100.0, 2.0, 0.08),
        ];
        let kpis = compute_kpis(&plan);
        assert_eq!(kpis.customers_treated, 2);
        assert!((kpis.total_cost - 22.0).abs() < 1e-9);
        assert!((kpis.expected_retained_value - 29.92).abs() < 1e-9);
        assert!((kpis.net_value - 7.92).abs() < 1e-9);
        assert!((kpis.expected_churn_reduction - (0.108 + 0.04)).abs() < 1e-9);
        assert!((kpis.roi_pct - (29.92 / 22.0 - 1.0) * 100.0).abs() < 1e-9);
    }

    #[test]
    fn roi_is_zero_without_spend() {
        assert_eq!(roi(0.0, 0.0), 0.0);
        assert_eq!(roi(12.0, 0.0), 0.0);
        assert_eq!(compute_kpis(&[]), PlanKpis::default());
    }
}
