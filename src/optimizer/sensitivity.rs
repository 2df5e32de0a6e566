use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::OptimizeError;
use crate::model::{ActionCatalog, Customer};
use crate::optimizer::constraints::{ConstraintConfig, WEEKLY_BUDGET};
use crate::optimizer::extract::PlanKpis;
use crate::optimizer::session::SolverEnvironment;
use crate::optimizer::{optimize, RunStatus, SolveOptions};

const MAX_POINTS: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BudgetScenario {
    pub budget: f64,
    pub status: RunStatus,
    pub kpis: Option<PlanKpis>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensitivityReport {
    pub scenarios: Vec<BudgetScenario>,
    /// Smallest budget reaching the highest net value among solved runs.
    pub best_net_value_budget: Option<f64>,
}

/// Budgets from `min` to `max` inclusive in steps of `step`.
pub fn budget_points(min: f64, max: f64, step: f64) -> Result<Vec<f64>, OptimizeError> {
    if !(min.is_finite() && max.is_finite() && step.is_finite()) || min < 0.0 {
        return Err(OptimizeError::parameter(
            WEEKLY_BUDGET,
            "sweep bounds must be finite and non-negative",
        ));
    }
    if step <= 0.0 || max < min {
        return Err(OptimizeError::parameter(
            WEEKLY_BUDGET,
            format!("empty sweep {min}..={max} step {step}"),
        ));
    }
    let count = ((max - min) / step + 1e-9).floor() as usize + 1;
    if count > MAX_POINTS {
        return Err(OptimizeError::parameter(
            WEEKLY_BUDGET,
            format!("sweep has {count} points, limit is {MAX_POINTS}"),
        ));
    }
    Ok((0..count).map(|i| min + step * i as f64).collect())
}

/// Re-run the full pipeline per budget. Each run takes its own session and
/// a failed run is recorded in its scenario.
pub fn run_budget_sensitivity(
    env: &SolverEnvironment,
    customers: &[Customer],
    catalog: &ActionCatalog,
    base: &ConstraintConfig,
    budgets: &[f64],
    options: &SolveOptions,
) -> SensitivityReport {
    let mut scenarios = Vec::with_capacity(budgets.len());
    for budget in budgets {
        let mut constraints = base.clone();
        constraints.weekly_budget = *budget;
        let result = optimize(env, customers, catalog, &constraints, options);
        let status = RunStatus::of(&result);
        let scenario = match result {
            Ok(plan) => BudgetScenario {
                budget: *budget,
                status,
                kpis: Some(plan.kpis),
                error: None,
            },
            Err(err) => {
                warn!("budget ${budget:.2} failed: {err}");
                BudgetScenario {
                    budget: *budget,
                    status,
                    kpis: None,
                    error: Some(err.to_string()),
                }
            }
        };
        scenarios.push(scenario);
    }

    let best_net_value_budget = scenarios
        .iter()
        .filter_map(|s| s.kpis.as_ref().map(|k| (s.budget, k.net_value)))
        .fold(None, |best: Option<(f64, f64)>, (budget, net)| match best {
            Some((_, best_net)) if net <= best_net + 1e-9 => best,
            _ => Some((budget, net)),
        })
        .map(|(budget, _)| budget);

    info!(
        "budget sweep finished: {} scenarios, best net value at {:?}",
        scenarios.len(),
        best_net_value_budget
    );
    SensitivityReport {
        scenarios,
        best_net_value_budget,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::catalog::default_catalog;
    use crate::model::{Channel, Customer, SubscriptionTier};

    #[test]
    fn points_include_both_ends() {
        assert_eq!(
            budget_points(100.0, 300.0, 100.0).expect("valid"),
            vec![100.0, 200.0, 300.0]
        );
        assert_eq!(budget_points(50.0, 50.0, 10.0).expect("valid"), vec![50.0]);
        assert_eq!(budget_points(0.0, 1.0, 0.1).expect("valid").len(), 11);
    }

    #[test]
    fn rejects_bad_ranges() {
        assert!(budget_points(10.0, 5.0, 1.0).is_err());
        assert!(budget_points(0.0, 10.0, 0.0).is_err());
        assert!(budget_points(0.0, 1e9, 1.0).is_err());
    }

    #[test]
    fn sweep_records_failures_and_keeps_going() {
        let env = SolverEnvironment::new(1);
        let customers: Vec<Customer> = (0..12)
            .map(|i| {
                let (p, v, tier) = if i % 2 == 0 {
                    (0.9, 800.0, SubscriptionTier::Premium)
                } else {
                    (0.2, 120.0, SubscriptionTier::Free)
                };
                Customer::new(format!("c{i}"), p, v, tier, None)
            })
            .collect();
        let base = ConstraintConfig::new(0.0)
            .with_channel_capacity(Channel::Call, 2.0)
            .with_min_high_risk_pct(0.5);
        let report = run_budget_sensitivity(
            &env,
            &customers,
            &default_catalog(),
            &base,
            &[0.0, 200.0, 400.0],
            &SolveOptions::default(),
        );

        assert_eq!(report.scenarios.len(), 3);
        assert_eq!(report.scenarios[0].status, RunStatus::Infeasible);
        assert!(report.scenarios[0].error.is_some());
        assert!(report.scenarios[1].kpis.is_some());
        let net = |i: usize| report.scenarios[i].kpis.as_ref().map(|k| k.net_value);
        let (net_200, net_400) = (net(1).expect("solved"), net(2).expect("solved"));
        assert!(net_400 >= net_200 - 1e-6);
        assert!(report.best_net_value_budget.is_some());
        assert_eq!(env.active_sessions(), 0);
    }
}
