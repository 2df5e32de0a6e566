use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::Channel;
use crate::optimizer::constraints::ConstraintConfig;
use crate::optimizer::extract::Assignment;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GroupSummary {
    pub label: String,
    pub customers: usize,
    pub cost: f64,
    pub retained_value: f64,
    pub net_value: f64,
}

impl GroupSummary {
    fn add(&mut self, assignment: &Assignment) {
        self.customers += 1;
        self.cost += assignment.cost;
        self.retained_value += assignment.expected_retained_value;
        self.net_value += assignment.net_value;
    }
}

/// How much of a capped resource the plan consumes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceUsage {
    pub resource: String,
    pub used: f64,
    pub limit: f64,
    pub utilization_pct: f64,
}

pub fn by_action(assignments: &[Assignment]) -> Vec<GroupSummary> {
    let mut groups: BTreeMap<u32, GroupSummary> = BTreeMap::new();
    for a in assignments {
        groups
            .entry(a.action_id)
            .or_insert_with(|| GroupSummary {
                label: a.action_name.clone(),
                ..GroupSummary::default()
            })
            .add(a);
    }
    sorted_by_customers(groups.into_values().collect())
}

pub fn by_channel(assignments: &[Assignment]) -> Vec<GroupSummary> {
    group_by(assignments, |a| a.channel.to_string())
}

/// Risk x value segments, e.g. `high_risk/high_value`.
pub fn by_segment(assignments: &[Assignment]) -> Vec<GroupSummary> {
    group_by(assignments, |a| format!("{}/{}", a.risk_tier, a.value_tier))
}

pub fn top_assignments(assignments: &[Assignment], n: usize) -> Vec<Assignment> {
    let mut sorted = assignments.to_vec();
    sorted.sort_by(|a, b| {
        b.net_value
            .total_cmp(&a.net_value)
            .then_with(|| a.customer_id.cmp(&b.customer_id))
    });
    sorted.truncate(n);
    sorted
}

pub fn resource_usage(
    assignments: &[Assignment],
    constraints: &ConstraintConfig,
) -> Vec<ResourceUsage> {
    let spend: f64 = assignments.iter().map(|a| a.cost).sum();
    let mut out = vec![usage("budget".to_string(), spend, constraints.weekly_budget)];
    for (channel, limit) in &constraints.channel_capacity {
        let used = assignments
            .iter()
            .filter(|a| a.channel == *channel)
            .count() as f64;
        out.push(usage(capacity_label(*channel), used, *limit));
    }
    out
}

fn capacity_label(channel: Channel) -> String {
    format!("{}_capacity", channel.as_slug())
}

fn usage(resource: String, used: f64, limit: f64) -> ResourceUsage {
    let utilization_pct = if limit > 0.0 {
        used / limit * 100.0
    } else {
        0.0
    };
    ResourceUsage {
        resource,
        used,
        limit,
        utilization_pct,
    }
}

fn group_by(assignments: &[Assignment], key: impl Fn(&Assignment) -> String) -> Vec<GroupSummary> {
    let mut groups: BTreeMap<String, GroupSummary> = BTreeMap::new();
    for a in assignments {
        let label = key(a);
        groups
            .entry(label.clone())
            .or_insert_with(|| GroupSummary {
                label,
                ..GroupSummary::default()
            })
            .add(a);
    }
    sorted_by_customers(groups.into_values().collect())
}

fn sorted_by_customers(mut groups: Vec<GroupSummary>) -> Vec<GroupSummary> {
    groups.sort_by(|a, b| b.customers.cmp(&a.customers).then_with(|| a.label.cmp(&b.label)));
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RiskTier, SubscriptionTier, ValueTier};

    fn assignment(id: &str, action_id: u32, channel: Channel, cost: f64, net: f64) -> Assignment {
        Assignment {
            customer_id: id.to_string(),
            subscription_type: SubscriptionTier::Free,
            risk_tier: RiskTier::High,
            value_tier: ValueTier::Low,
            churn_probability: 0.8,
            lifetime_value: 100.0,
            action_id,
            action_name: format!("action-{action_id}"),
            channel,
            cost,
            uplift: 0.1,
            expected_retained_value: net + cost,
            net_value: net,
        }
    }

    fn plan() -> Vec<Assignment> {
        vec![
            assignment("a", 1, Channel::Email, 2.0, 4.0),
            assignment("b", 1, Channel::Email, 2.0, 1.0),
            assignment("c", 5, Channel::Call, 50.0, 9.0),
        ]
    }

    #[test]
    fn groups_by_action_and_channel() {
        let actions = by_action(&plan());
        assert_eq!(actions[0].label, "action-1");
        assert_eq!(actions[0].customers, 2);
        assert_eq!(actions[0].cost, 4.0);
        assert_eq!(actions[0].net_value, 5.0);

        let channels = by_channel(&plan());
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].label, "email");

        let segments = by_segment(&plan());
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].label, "high_risk/low_value");
    }

    #[test]
    fn top_assignments_by_net_value() {
        let top = top_assignments(&plan(), 2);
        assert_eq!(
            top.iter().map(|a| a.customer_id.as_str()).collect::<Vec<_>>(),
            vec!["c", "a"]
        );
    }

    #[test]
    fn usage_against_limits() {
        let constraints = ConstraintConfig::new(100.0).with_channel_capacity(Channel::Call, 4.0);
        let usage = resource_usage(&plan(), &constraints);
        assert_eq!(usage[0].resource, "budget");
        assert!((usage[0].utilization_pct - 54.0).abs() < 1e-9);
        assert_eq!(usage[1].resource, "call_capacity");
        assert_eq!(usage[1].used, 1.0);
        assert!((usage[1].utilization_pct - 25.0).abs() < 1e-9);
    }
}
