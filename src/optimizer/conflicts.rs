use std::collections::{BTreeMap, BTreeSet};

use crate::eligibility::EligibilitySet;
use crate::model::{ActionCatalog, Channel, Customer, RiskTier, SubscriptionTier};
use crate::optimizer::assembler::ConstraintKind;
use crate::optimizer::constraints::{required_count, ConstraintConfig};
use crate::optimizer::{ConflictType, ConstraintConflict};

#[derive(Debug)]
struct CoverageGroup {
    kind: ConstraintKind,
    members: Vec<usize>,
    fraction: f64,
}

/// Cheap necessary-condition checks run before the solver.
///
/// A reported contradiction means the model cannot be feasible; absence of
/// one proves nothing. Nothing here changes the model.
pub fn detect_conflicts(
    customers: &[Customer],
    catalog: &ActionCatalog,
    eligibility: &EligibilitySet,
    constraints: &ConstraintConfig,
) -> Vec<ConstraintConflict> {
    let mut treatments_by_customer: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (_, pair) in eligibility.treatments() {
        treatments_by_customer
            .entry(pair.customer)
            .or_default()
            .push(pair.action);
    }

    let mut conflicts = Vec::new();
    for group in coverage_groups(customers, constraints) {
        let required = required_count(group.fraction, group.members.len());
        if required == 0 {
            continue;
        }
        let context = GroupContext {
            group: &group,
            required,
            catalog,
            constraints,
            treatments: &treatments_by_customer,
            population: customers.len(),
        };
        conflicts.extend(context.check());
    }

    if let (Some(max_action), Some(min_segment)) = (
        constraints.max_action_pct,
        constraints.min_segment_coverage_pct,
    ) {
        if max_action < min_segment {
            conflicts.push(ConstraintConflict {
                constraints: vec![
                    "max_action_pct".to_string(),
                    "min_segment_coverage_pct".to_string(),
                ],
                conflict_type: ConflictType::TensionZone,
                message: format!(
                    "Max action share ({:.0}%) is below the segment coverage floor ({:.0}%). Segments may need several different actions to reach coverage.",
                    max_action * 100.0,
                    min_segment * 100.0
                ),
            });
        }
    }

    conflicts
}

fn coverage_groups(customers: &[Customer], constraints: &ConstraintConfig) -> Vec<CoverageGroup> {
    let mut groups = Vec::new();
    if let Some(fraction) = constraints.min_high_risk_pct {
        groups.push(CoverageGroup {
            kind: ConstraintKind::HighRiskCoverage,
            members: indices(customers, |c| c.risk_tier() == RiskTier::High),
            fraction,
        });
    }
    let tiers: BTreeSet<SubscriptionTier> = customers.iter().map(|c| c.subscription()).collect();
    for tier in tiers {
        if let Some(fraction) = constraints.tier_floor(tier) {
            groups.push(CoverageGroup {
                kind: ConstraintKind::SegmentCoverage { tier },
                members: indices(customers, |c| c.subscription() == tier),
                fraction,
            });
        }
    }
    groups
}

fn indices(customers: &[Customer], member: impl Fn(&Customer) -> bool) -> Vec<usize> {
    customers
        .iter()
        .enumerate()
        .filter(|(_, c)| member(c))
        .map(|(i, _)| i)
        .collect()
}

struct GroupContext<'a> {
    group: &'a CoverageGroup,
    required: usize,
    catalog: &'a ActionCatalog,
    constraints: &'a ConstraintConfig,
    treatments: &'a BTreeMap<usize, Vec<usize>>,
    population: usize,
}

impl GroupContext<'_> {
    fn check(&self) -> Vec<ConstraintConflict> {
        let name = self.group.kind.to_string();
        let candidates: Vec<&Vec<usize>> = self
            .group
            .members
            .iter()
            .filter_map(|c| self.treatments.get(c))
            .collect();

        let mut out = Vec::new();
        if candidates.len() < self.required {
            out.push(self.contradiction(
                vec![name.clone()],
                format!(
                    "{name} needs {} treated customers but only {} have an eligible treatment.",
                    self.required,
                    candidates.len()
                ),
            ));
            return out;
        }

        let mut cheapest: Vec<f64> = candidates
            .iter()
            .filter_map(|actions| {
                actions
                    .iter()
                    .filter_map(|a| self.catalog.get(*a))
                    .map(|a| a.cost)
                    .min_by(f64::total_cmp)
            })
            .collect();
        cheapest.sort_by(f64::total_cmp);
        let minimum_spend: f64 = cheapest.iter().take(self.required).sum();
        if minimum_spend > self.constraints.weekly_budget {
            out.push(self.contradiction(
                vec![name.clone(), ConstraintKind::Budget.to_string()],
                format!(
                    "{name} needs at least ${minimum_spend:.2} at the cheapest eligible actions, above the ${:.2} budget.",
                    self.constraints.weekly_budget
                ),
            ));
        }

        if let Some(conflict) = self.check_channels(&name, &candidates) {
            out.push(conflict);
        }
        if let Some(conflict) = self.check_saturation(&name, &candidates) {
            out.push(conflict);
        }
        out
    }

    fn check_channels(&self, name: &str, candidates: &[&Vec<usize>]) -> Option<ConstraintConflict> {
        let caps = &self.constraints.channel_capacity;
        let mut unlimited = 0usize;
        let mut capped: BTreeSet<Channel> = BTreeSet::new();
        for actions in candidates {
            let channels: BTreeSet<Channel> = actions
                .iter()
                .filter_map(|a| self.catalog.get(*a))
                .map(|a| a.channel)
                .collect();
            if channels.iter().any(|c| !caps.contains_key(c)) {
                unlimited += 1;
            } else {
                capped.extend(channels);
            }
        }
        let capacity: f64 = capped.iter().filter_map(|c| caps.get(c)).sum();
        let reachable = unlimited + capacity.floor() as usize;
        if reachable >= self.required {
            return None;
        }

        let mut involved = vec![name.to_string()];
        involved.extend(capped.iter().map(|channel| {
            ConstraintKind::ChannelCapacity { channel: *channel }.to_string()
        }));
        Some(self.contradiction(
            involved,
            format!(
                "{name} needs {} treated customers but the capped channels leave room for at most {reachable}.",
                self.required
            ),
        ))
    }

    fn check_saturation(&self, name: &str, candidates: &[&Vec<usize>]) -> Option<ConstraintConflict> {
        let fraction = self.constraints.max_action_pct?;
        let per_action = (fraction * self.population as f64 + 1e-9).floor() as usize;
        let actions: BTreeSet<usize> = candidates.iter().flat_map(|a| a.iter().copied()).collect();
        let reachable = actions.len() * per_action;
        if reachable >= self.required {
            return None;
        }

        let mut involved = vec![name.to_string()];
        involved.extend(actions.iter().filter_map(|a| self.catalog.get(*a)).map(|a| {
            ConstraintKind::ActionSaturation { action_id: a.id }.to_string()
        }));
        Some(self.contradiction(
            involved,
            format!(
                "{name} needs {} treated customers but {} eligible actions capped at {per_action} each reach only {reachable}.",
                self.required,
                actions.len()
            ),
        ))
    }

    fn contradiction(&self, constraints: Vec<String>, message: String) -> ConstraintConflict {
        ConstraintConflict {
            constraints,
            conflict_type: ConflictType::DirectContradiction,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::catalog::default_catalog;
    use crate::eligibility::build_eligible_pairs;
    use crate::model::{Action, EligibilityRule};

    fn call_only_catalog() -> ActionCatalog {
        let defaults = default_catalog();
        ActionCatalog::new(vec![
            defaults.actions()[0].clone(),
            Action {
                id: 5,
                name: "Retention Specialist Call".to_string(),
                channel: Channel::Call,
                cost: 50.0,
                uplift: 0.3,
                eligibility: EligibilityRule::HighValue,
                description: String::new(),
            },
        ])
        .expect("valid catalog")
    }

    fn high_risk_customers(n: usize) -> Vec<Customer> {
        (0..n)
            .map(|i| {
                Customer::new(
                    &format!("hr-{i}"),
                    0.9,
                    800.0,
                    SubscriptionTier::Premium,
                    None,
                )
            })
            .collect()
    }

    fn detect(
        customers: &[Customer],
        catalog: &ActionCatalog,
        constraints: &ConstraintConfig,
    ) -> Vec<ConstraintConflict> {
        let eligibility = build_eligible_pairs(customers, catalog);
        detect_conflicts(customers, catalog, &eligibility, constraints)
    }

    #[test]
    fn capped_channel_below_coverage_floor() {
        let conflicts = detect(
            &high_risk_customers(3),
            &call_only_catalog(),
            &ConstraintConfig::new(1_000.0)
                .with_channel_capacity(Channel::Call, 0.0)
                .with_min_high_risk_pct(1.0),
        );
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type, ConflictType::DirectContradiction);
        assert_eq!(
            conflicts[0].constraints,
            vec!["min_high_risk".to_string(), "call_capacity".to_string()]
        );
    }

    #[test]
    fn budget_below_cheapest_coverage() {
        let conflicts = detect(
            &high_risk_customers(4),
            &call_only_catalog(),
            &ConstraintConfig::new(120.0).with_min_high_risk_pct(0.75),
        );
        assert_eq!(conflicts.len(), 1);
        assert!(conflicts[0].constraints.contains(&"budget".to_string()));
    }

    #[test]
    fn uncapped_alternative_clears_channel_check() {
        let conflicts = detect(
            &high_risk_customers(3),
            &default_catalog(),
            &ConstraintConfig::new(1_000.0)
                .with_channel_capacity(Channel::Call, 0.0)
                .with_min_high_risk_pct(1.0),
        );
        assert!(conflicts.is_empty());
    }

    #[test]
    fn saturation_cap_below_floor() {
        let conflicts = detect(
            &high_risk_customers(10),
            &call_only_catalog(),
            &ConstraintConfig::new(10_000.0)
                .with_min_high_risk_pct(0.8)
                .with_max_action_pct(0.5),
        );
        assert_eq!(conflicts.len(), 1);
        assert_eq!(
            conflicts[0].constraints,
            vec!["min_high_risk".to_string(), "max_action_5".to_string()]
        );
    }

    #[test]
    fn saturation_below_segment_floor_is_a_tension() {
        let conflicts = detect(
            &crate::data::sample::sample_customers(12).expect("sample"),
            &default_catalog(),
            &ConstraintConfig::new(10_000.0)
                .with_min_segment_coverage_pct(0.2)
                .with_max_action_pct(0.1),
        );
        assert!(conflicts
            .iter()
            .any(|c| c.conflict_type == ConflictType::TensionZone));
    }
}
