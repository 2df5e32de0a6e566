pub mod schema;

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::OptimizeError;

pub use schema::{
    Action, Channel, Customer, EligibilityRule, PaymentPlan, RiskTier, SubscriptionTier,
    ValueTier,
};

/// Validated action table.
///
/// Construction guarantees unique ids and the presence of a default action
/// (cost 0, uplift 0) that is eligible for every customer.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ActionCatalog {
    actions: Vec<Action>,
}

impl ActionCatalog {
    pub fn new(actions: Vec<Action>) -> Result<Self, OptimizeError> {
        if actions.is_empty() {
            return Err(OptimizeError::input("action", "action table is empty"));
        }
        let mut seen = BTreeSet::new();
        for action in &actions {
            if !seen.insert(action.id) {
                return Err(OptimizeError::input(
                    "action",
                    format!("duplicate action id {}", action.id),
                ));
            }
            if !action.cost.is_finite() || action.cost < 0.0 {
                return Err(OptimizeError::input(
                    "action",
                    format!("action {} has negative or non-finite cost", action.id),
                ));
            }
            if !(0.0..=1.0).contains(&action.uplift) {
                return Err(OptimizeError::input(
                    "action",
                    format!("action {} uplift {} outside [0, 1]", action.id, action.uplift),
                ));
            }
        }
        let has_default = actions
            .iter()
            .any(|a| a.is_default() && a.eligibility == EligibilityRule::All);
        if !has_default {
            return Err(OptimizeError::input(
                "action",
                "catalog needs a 'No Action' entry with cost 0, uplift 0 and eligibility 'all'",
            ));
        }
        Ok(Self { actions })
    }

    /// Wraps a table the crate itself defines; see `data::catalog`.
    pub(crate) fn builtin(actions: Vec<Action>) -> Self {
        Self { actions }
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn get(&self, index: usize) -> Option<&Action> {
        self.actions.get(index)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn cheapest_treatment_cost(&self) -> Option<f64> {
        self.actions
            .iter()
            .filter(|a| !a.is_default())
            .map(|a| a.cost)
            .min_by(f64::total_cmp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(id: u32, cost: f64, uplift: f64, rule: &str) -> Action {
        Action {
            id,
            name: format!("action-{id}"),
            channel: Channel::Email,
            cost,
            uplift,
            eligibility: EligibilityRule::parse(rule),
            description: String::new(),
        }
    }

    #[test]
    fn catalog_requires_default_action() {
        let err = ActionCatalog::new(vec![action(1, 2.0, 0.1, "all")]).unwrap_err();
        assert!(err.to_string().contains("No Action"));
    }

    #[test]
    fn default_action_must_be_open_to_all() {
        let err = ActionCatalog::new(vec![action(0, 0.0, 0.0, "Premium")]).unwrap_err();
        assert!(err.is_caller_error());
    }

    #[test]
    fn rejects_duplicate_ids_and_bad_uplift() {
        assert!(ActionCatalog::new(vec![
            action(0, 0.0, 0.0, "all"),
            action(0, 2.0, 0.1, "all")
        ])
        .is_err());
        assert!(ActionCatalog::new(vec![
            action(0, 0.0, 0.0, "all"),
            action(1, 2.0, 1.5, "all")
        ])
        .is_err());
    }

    #[test]
    fn cheapest_treatment_ignores_default() {
        let catalog = ActionCatalog::new(vec![
            action(0, 0.0, 0.0, "all"),
            action(1, 20.0, 0.15, "all"),
            action(2, 2.0, 0.08, "all"),
        ])
        .expect("valid catalog");
        assert_eq!(catalog.cheapest_treatment_cost(), Some(2.0));
    }
}
