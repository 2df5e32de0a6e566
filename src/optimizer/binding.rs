use crate::optimizer::assembler::{AssembledModel, ConstraintKind};
use crate::optimizer::BindingConstraint;

/// Rows at their limit in a solved plan. Per-customer rows are left out;
/// they bind for every treated customer and say nothing useful.
pub fn binding_constraints(
    model: &AssembledModel,
    values: &[f64],
    tolerance: f64,
) -> Vec<BindingConstraint> {
    model
        .rows
        .iter()
        .filter(|row| !row.kind.is_per_customer())
        .filter_map(|row| {
            let slack = row.slack(values);
            if slack.abs() >= tolerance {
                return None;
            }
            Some(BindingConstraint {
                name: row.kind.to_string(),
                kind: row.kind.clone(),
                activity: row.activity(values),
                limit: row.rhs,
                slack,
                explanation: explain(&row.kind),
            })
        })
        .collect()
}

pub fn explain(kind: &ConstraintKind) -> String {
    match kind {
        ConstraintKind::OneAction { customer_id } => {
            format!("Customer {customer_id} already receives an action.")
        }
        ConstraintKind::Budget => {
            "Budget fully utilized. Increasing the budget would allow treating more customers."
                .to_string()
        }
        ConstraintKind::ChannelCapacity { channel } => format!(
            "{channel} capacity reached. More {channel} slots would allow more treatments through this channel."
        ),
        ConstraintKind::HighRiskCoverage => {
            "High-risk coverage floor is active. The plan treats exactly the minimum share of high-risk customers."
                .to_string()
        }
        ConstraintKind::SegmentCoverage { tier } => format!(
            "{tier} coverage floor is active. Budget is being steered to meet the minimum share of {tier} customers."
        ),
        ConstraintKind::ActionSaturation { action_id } => format!(
            "Action {action_id} hit its saturation cap. Customers beyond the cap receive their next-best action."
        ),
    }
}
