use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::eligibility::EligibilitySet;
use crate::model::{ActionCatalog, Channel, Customer, RiskTier, SubscriptionTier};
use crate::optimizer::constraints::{required_count, ConstraintConfig};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ConstraintKind {
    OneAction { customer_id: String },
    Budget,
    ChannelCapacity { channel: Channel },
    HighRiskCoverage,
    SegmentCoverage { tier: SubscriptionTier },
    ActionSaturation { action_id: u32 },
}

impl ConstraintKind {
    pub fn is_per_customer(&self) -> bool {
        matches!(self, Self::OneAction { .. })
    }
}

impl Display for ConstraintKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OneAction { customer_id } => write!(f, "one_action_{customer_id}"),
            Self::Budget => write!(f, "budget"),
            Self::ChannelCapacity { channel } => write!(f, "{}_capacity", channel.as_slug()),
            Self::HighRiskCoverage => write!(f, "min_high_risk"),
            Self::SegmentCoverage { tier } => write!(f, "min_{}_coverage", tier.as_slug()),
            Self::ActionSaturation { action_id } => write!(f, "max_action_{action_id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RowSense {
    AtMost,
    AtLeast,
}

/// One linear row: `sum(coef * x[idx]) <= rhs` or `>= rhs`, where `idx`
/// indexes [`EligibilitySet::pairs`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelRow {
    pub kind: ConstraintKind,
    pub terms: Vec<(usize, f64)>,
    pub sense: RowSense,
    pub rhs: f64,
}

impl ModelRow {
    pub fn activity(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(idx, coef)| coef * values.get(*idx).copied().unwrap_or(0.0))
            .sum()
    }

    /// Distance from the bound; negative when violated.
    pub fn slack(&self, values: &[f64]) -> f64 {
        let activity = self.activity(values);
        match self.sense {
            RowSense::AtMost => self.rhs - activity,
            RowSense::AtLeast => activity - self.rhs,
        }
    }

    fn trivially_satisfied(&self) -> bool {
        match self.sense {
            RowSense::AtMost => self.rhs >= 0.0,
            RowSense::AtLeast => self.rhs <= 0.0,
        }
    }
}

/// Backend-independent integer program: one binary variable per eligible
/// pair, objective coefficients taken from the pairs, plus linear rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssembledModel {
    pub eligibility: EligibilitySet,
    pub rows: Vec<ModelRow>,
    /// Rows without terms whose bound can never hold, e.g. a coverage floor
    /// over a group with no treatment options.
    pub unsatisfiable: Vec<ConstraintKind>,
    pub fingerprint: String,
}

impl AssembledModel {
    pub fn variable_count(&self) -> usize {
        self.eligibility.len()
    }

    pub fn row(&self, kind: &ConstraintKind) -> Option<&ModelRow> {
        self.rows.iter().find(|r| &r.kind == kind)
    }

    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.eligibility
            .pairs
            .iter()
            .zip(values)
            .map(|(pair, x)| pair.coefficient * x)
            .sum()
    }
}

pub fn assemble_model(
    customers: &[Customer],
    catalog: &ActionCatalog,
    eligibility: EligibilitySet,
    constraints: &ConstraintConfig,
) -> AssembledModel {
    let mut builder = RowBuilder::default();
    let pairs = &eligibility.pairs;

    let mut by_customer: Vec<Vec<usize>> = vec![Vec::new(); customers.len()];
    for (idx, pair) in pairs.iter().enumerate() {
        by_customer[pair.customer].push(idx);
    }
    for (ci, members) in by_customer.iter().enumerate() {
        builder.push(
            ConstraintKind::OneAction {
                customer_id: customers[ci].id().to_string(),
            },
            members.iter().map(|idx| (*idx, 1.0)).collect(),
            RowSense::AtMost,
            1.0,
        );
    }

    builder.push(
        ConstraintKind::Budget,
        pairs
            .iter()
            .enumerate()
            .filter(|(_, p)| p.cost != 0.0)
            .map(|(idx, p)| (idx, p.cost))
            .collect(),
        RowSense::AtMost,
        constraints.weekly_budget,
    );

    for (channel, capacity) in &constraints.channel_capacity {
        let terms = pairs
            .iter()
            .enumerate()
            .filter(|(_, p)| {
                catalog
                    .get(p.action)
                    .map(|a| a.channel == *channel)
                    .unwrap_or(false)
            })
            .map(|(idx, _)| (idx, 1.0))
            .collect();
        builder.push(
            ConstraintKind::ChannelCapacity { channel: *channel },
            terms,
            RowSense::AtMost,
            *capacity,
        );
    }

    if let Some(fraction) = constraints.min_high_risk_pct {
        let members = |c: &Customer| c.risk_tier() == RiskTier::High;
        builder.push_coverage(
            ConstraintKind::HighRiskCoverage,
            customers,
            &eligibility,
            members,
            fraction,
        );
    }

    let mut tier_sizes: BTreeMap<SubscriptionTier, usize> = BTreeMap::new();
    for customer in customers {
        *tier_sizes.entry(customer.subscription()).or_default() += 1;
    }
    for tier in tier_sizes.keys() {
        if let Some(fraction) = constraints.tier_floor(*tier) {
            let tier = *tier;
            builder.push_coverage(
                ConstraintKind::SegmentCoverage { tier },
                customers,
                &eligibility,
                move |c: &Customer| c.subscription() == tier,
                fraction,
            );
        }
    }

    if let Some(fraction) = constraints.max_action_pct {
        let cap = fraction * customers.len() as f64;
        for (ai, action) in catalog.actions().iter().enumerate() {
            if action.is_default() {
                continue;
            }
            let terms = pairs
                .iter()
                .enumerate()
                .filter(|(_, p)| p.action == ai)
                .map(|(idx, _)| (idx, 1.0))
                .collect();
            builder.push(
                ConstraintKind::ActionSaturation {
                    action_id: action.id,
                },
                terms,
                RowSense::AtMost,
                cap,
            );
        }
    }

    let RowBuilder {
        rows,
        unsatisfiable,
    } = builder;
    let fingerprint = fingerprint(&eligibility, &rows);
    info!(
        "assembled model: {} variables, {} rows, fingerprint {}",
        eligibility.len(),
        rows.len(),
        &fingerprint[..12]
    );
    AssembledModel {
        eligibility,
        rows,
        unsatisfiable,
        fingerprint,
    }
}

#[derive(Default)]
struct RowBuilder {
    rows: Vec<ModelRow>,
    unsatisfiable: Vec<ConstraintKind>,
}

impl RowBuilder {
    fn push(&mut self, kind: ConstraintKind, terms: Vec<(usize, f64)>, sense: RowSense, rhs: f64) {
        let row = ModelRow {
            kind,
            terms,
            sense,
            rhs,
        };
        if !row.terms.is_empty() {
            self.rows.push(row);
        } else if !row.trivially_satisfied() {
            debug!("row {} has no terms and cannot hold", row.kind);
            self.unsatisfiable.push(row.kind);
        }
    }

    /// Floor on treated customers within a group; the no-op action never
    /// counts towards coverage.
    fn push_coverage(
        &mut self,
        kind: ConstraintKind,
        customers: &[Customer],
        eligibility: &EligibilitySet,
        member: impl Fn(&Customer) -> bool,
        fraction: f64,
    ) {
        let group_size = customers.iter().filter(|c| member(c)).count();
        if group_size == 0 {
            return;
        }
        let required = required_count(fraction, group_size);
        let terms = eligibility
            .treatments()
            .filter(|(_, p)| member(&customers[p.customer]))
            .map(|(idx, _)| (idx, 1.0))
            .collect();
        self.push(kind, terms, RowSense::AtLeast, required as f64);
    }
}

fn fingerprint(eligibility: &EligibilitySet, rows: &[ModelRow]) -> String {
    let canonical = serde_json::to_string(&(eligibility, rows)).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}
