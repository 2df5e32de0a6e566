use anyhow::Result;
use serde::Serialize;

use crate::optimizer::summary::{
    by_action, by_channel, by_segment, resource_usage, GroupSummary, ResourceUsage,
};
use crate::optimizer::RetentionPlan;

pub fn render_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// A plan together with its derived breakdowns, as emitted by
/// `optimize --output json` and `POST /v1/optimize`.
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport<'a> {
    #[serde(flatten)]
    pub plan: &'a RetentionPlan,
    pub by_action: Vec<GroupSummary>,
    pub by_channel: Vec<GroupSummary>,
    pub by_segment: Vec<GroupSummary>,
    pub resource_usage: Vec<ResourceUsage>,
}

impl<'a> PlanReport<'a> {
    pub fn new(plan: &'a RetentionPlan) -> Self {
        Self {
            plan,
            by_action: by_action(&plan.assignments),
            by_channel: by_channel(&plan.assignments),
            by_segment: by_segment(&plan.assignments),
            resource_usage: resource_usage(&plan.assignments, &plan.constraints),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::catalog::default_catalog;
    use crate::data::sample::sample_customers;
    use crate::optimizer::constraints::ConstraintConfig;
    use crate::optimizer::session::SolverEnvironment;
    use crate::optimizer::{optimize, SolveOptions};

    #[test]
    fn plan_report_flattens_the_plan() {
        let plan = optimize(
            &SolverEnvironment::new(1),
            &sample_customers(12).expect("sample"),
            &default_catalog(),
            &ConstraintConfig::new(150.0),
            &SolveOptions::default(),
        )
        .expect("solves");
        let value: serde_json::Value =
            serde_json::from_str(&render_json(&PlanReport::new(&plan)).expect("json"))
                .expect("valid json");
        assert!(value.get("kpis").is_some());
        assert!(value.get("assignments").is_some());
        assert_eq!(value["resource_usage"][0]["resource"], "budget");
    }
}
