use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::OptimizeError;
use crate::optimizer::extract::Assignment;
use crate::optimizer::{PlanStatus, RetentionPlan};

pub const DEFAULT_HOLDOUT_FRACTION: f64 = 0.10;
pub const DEFAULT_HOLDOUT_SEED: u64 = 42;

/// Assignment as handed to campaign execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TreatmentRow {
    #[serde(flatten)]
    pub assignment: Assignment,
    pub holdout: bool,
    pub execute_treatment: bool,
}

/// Reserve a control group from a finished plan.
///
/// One uniform draw per row from a generator seeded with `seed`; a row is
/// held out when its draw falls below `fraction`. The same plan and seed
/// always reproduce the same split.
pub fn assign_holdout(
    assignments: &[Assignment],
    fraction: f64,
    seed: u64,
) -> Result<Vec<TreatmentRow>, OptimizeError> {
    if !(0.0..=1.0).contains(&fraction) {
        return Err(OptimizeError::parameter(
            "holdout.fraction",
            format!("fraction must be within [0, 1], got {fraction}"),
        ));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    Ok(assignments
        .iter()
        .map(|a| {
            let holdout = rng.gen::<f64>() < fraction;
            TreatmentRow {
                assignment: a.clone(),
                holdout,
                execute_treatment: !holdout,
            }
        })
        .collect())
}

/// Treatment rows for a solved plan.
///
/// A plan cut off by the time limit was never solved, so it is refused
/// rather than exported as an empty campaign.
pub fn plan_treatments(
    plan: &RetentionPlan,
    fraction: f64,
    seed: u64,
) -> Result<Vec<TreatmentRow>, OptimizeError> {
    if plan.status == PlanStatus::TimedOut {
        return Err(OptimizeError::Solver {
            stage: "time_limit",
            message: "no plan was found before the time limit".to_string(),
        });
    }
    assign_holdout(&plan.assignments, fraction, seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Channel, RiskTier, SubscriptionTier, ValueTier};

    fn assignments(n: usize) -> Vec<Assignment> {
        (0..n)
            .map(|i| Assignment {
                customer_id: format!("CUST-{i:05}"),
                subscription_type: SubscriptionTier::Student,
                risk_tier: RiskTier::Medium,
                value_tier: ValueTier::Medium,
                churn_probability: 0.5,
                lifetime_value: 200.0,
                action_id: 1,
                action_name: "Personalized Email".to_string(),
                channel: Channel::Email,
                cost: 2.0,
                uplift: 0.08,
                expected_retained_value: 8.0,
                net_value: 6.0,
            })
            .collect()
    }

    #[test]
    fn split_is_deterministic_and_near_fraction() {
        let plan = assignments(2_000);
        let a = assign_holdout(&plan, 0.1, 42).expect("valid fraction");
        let b = assign_holdout(&plan, 0.1, 42).expect("valid fraction");
        assert_eq!(a, b);

        let held = a.iter().filter(|r| r.holdout).count();
        assert!((120..=280).contains(&held), "held out {held}");
        let other_seed = assign_holdout(&plan, 0.1, 7).expect("valid fraction");
        assert_ne!(a, other_seed);
        assert!(a.iter().all(|r| r.holdout != r.execute_treatment));
    }

    #[test]
    fn timed_out_plan_is_not_exported() {
        use crate::data::catalog::default_catalog;
        use crate::model::{ActionCatalog, Customer};
        use crate::optimizer::constraints::ConstraintConfig;
        use crate::optimizer::session::SolverEnvironment;
        use crate::optimizer::{optimize, SolveOptions};

        let catalog = ActionCatalog::new(vec![default_catalog().actions()[0].clone()])
            .expect("valid catalog");
        let customers = vec![Customer::new("c1", 0.8, 400.0, SubscriptionTier::Family, None)];
        let mut plan = optimize(
            &SolverEnvironment::new(1),
            &customers,
            &catalog,
            &ConstraintConfig::new(100.0),
            &SolveOptions::default(),
        )
        .expect("solves");
        assert_eq!(plan.status, PlanStatus::OptimalEmpty);
        assert!(plan_treatments(&plan, 0.1, 42).expect("empty is fine").is_empty());

        plan.status = PlanStatus::TimedOut;
        let err = plan_treatments(&plan, 0.1, 42).expect_err("refused");
        assert!(!err.is_caller_error());
        assert!(err.to_string().contains("time limit"));
    }

    #[test]
    fn extremes_and_bad_fraction() {
        let plan = assignments(50);
        assert!(assign_holdout(&plan, 0.0, 7)
            .expect("valid")
            .iter()
            .all(|r| r.execute_treatment));
        assert!(assign_holdout(&plan, 1.0, 7)
            .expect("valid")
            .iter()
            .all(|r| r.holdout));
        assert!(assign_holdout(&plan, 1.5, 7).is_err());
    }
}
