pub mod evaluator;

use serde::{Deserialize, Serialize};

pub use evaluator::{build_eligible_pairs, net_value_coefficient};

/// A permitted (customer, action) combination.
///
/// Indices point into the customer slice and action catalog the pair was
/// built from; `coefficient` is `p * uplift * v - cost`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EligiblePair {
    pub customer: usize,
    pub action: usize,
    pub cost: f64,
    pub coefficient: f64,
    pub is_default: bool,
}

/// Pairs in customer-major, catalog order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EligibilitySet {
    pub pairs: Vec<EligiblePair>,
    pub customer_count: usize,
}

impl EligibilitySet {
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Pairs other than the no-op action, i.e. actual treatments.
    pub fn treatments(&self) -> impl Iterator<Item = (usize, &EligiblePair)> {
        self.pairs.iter().enumerate().filter(|(_, p)| !p.is_default)
    }

    pub fn treatment_count_for(&self, customer: usize) -> usize {
        self.pairs
            .iter()
            .filter(|p| p.customer == customer && !p.is_default)
            .count()
    }
}
