pub mod assembler;
pub mod binding;
pub mod conflicts;
pub mod constraints;
pub mod extract;
pub mod holdout;
pub mod sensitivity;
pub mod session;
pub mod summary;

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::eligibility::build_eligible_pairs;
use crate::error::OptimizeError;
use crate::model::{ActionCatalog, Customer};

use assembler::{assemble_model, ConstraintKind};
use constraints::ConstraintConfig;
use extract::{compute_kpis, extract_assignments, Assignment, PlanKpis};
use session::{SolveOutcome, SolverEnvironment};

pub const DEFAULT_BINDING_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Optimal,
    /// Solved, and no customer was worth treating.
    OptimalEmpty,
    /// The wall-clock limit expired; the plan carries no assignments.
    TimedOut,
}

/// Outcome of one run including failures, as reported by the sensitivity
/// sweep and the HTTP API.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Optimal,
    OptimalEmpty,
    TimedOut,
    Infeasible,
    InvalidRequest,
    SolverError,
}

impl RunStatus {
    pub fn of(result: &Result<RetentionPlan, OptimizeError>) -> Self {
        match result {
            Ok(plan) => match plan.status {
                PlanStatus::Optimal => Self::Optimal,
                PlanStatus::OptimalEmpty => Self::OptimalEmpty,
                PlanStatus::TimedOut => Self::TimedOut,
            },
            Err(OptimizeError::Infeasible { .. }) => Self::Infeasible,
            Err(err) if err.is_caller_error() => Self::InvalidRequest,
            Err(_) => Self::SolverError,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BindingConstraint {
    pub name: String,
    pub kind: ConstraintKind,
    pub activity: f64,
    pub limit: f64,
    pub slack: f64,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConstraintConflict {
    pub constraints: Vec<String>,
    pub conflict_type: ConflictType,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    DirectContradiction,
    TensionZone,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelSummary {
    pub customers: usize,
    pub actions: usize,
    pub eligible_pairs: usize,
    pub rows: usize,
    pub fingerprint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionPlan {
    pub status: PlanStatus,
    pub assignments: Vec<Assignment>,
    pub kpis: PlanKpis,
    pub objective_value: f64,
    pub binding: Vec<BindingConstraint>,
    pub diagnostics: Vec<ConstraintConflict>,
    pub model: ModelSummary,
    pub constraints: ConstraintConfig,
    pub solved_at: DateTime<Utc>,
    pub solve_millis: u64,
}

impl RetentionPlan {
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveOptions {
    pub time_limit: Option<Duration>,
    pub binding_tolerance: f64,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            time_limit: None,
            binding_tolerance: DEFAULT_BINDING_TOLERANCE,
        }
    }
}

/// Run eligibility, assembly, one solve and extraction.
///
/// The session is held only around the solve and is released on every
/// path out of this function.
pub fn optimize(
    env: &SolverEnvironment,
    customers: &[Customer],
    catalog: &ActionCatalog,
    constraints: &ConstraintConfig,
    options: &SolveOptions,
) -> Result<RetentionPlan, OptimizeError> {
    constraints.validate()?;
    let started = Instant::now();

    let eligibility = build_eligible_pairs(customers, catalog);
    let diagnostics = conflicts::detect_conflicts(customers, catalog, &eligibility, constraints);
    for conflict in &diagnostics {
        warn!(
            "pre-flight {:?} [{}]: {}",
            conflict.conflict_type,
            conflict.constraints.join(", "),
            conflict.message
        );
    }

    let model = assemble_model(customers, catalog, eligibility, constraints);
    let summary = ModelSummary {
        customers: customers.len(),
        actions: catalog.len(),
        eligible_pairs: model.variable_count(),
        rows: model.rows.len(),
        fingerprint: model.fingerprint.clone(),
    };

    let empty_plan = |status: PlanStatus, diagnostics: Vec<ConstraintConflict>| RetentionPlan {
        status,
        assignments: Vec::new(),
        kpis: PlanKpis::default(),
        objective_value: 0.0,
        binding: Vec::new(),
        diagnostics,
        model: summary.clone(),
        constraints: constraints.clone(),
        solved_at: Utc::now(),
        solve_millis: started.elapsed().as_millis() as u64,
    };

    if !model.unsatisfiable.is_empty() {
        let mut suspects: Vec<String> =
            model.unsatisfiable.iter().map(|k| k.to_string()).collect();
        merge_suspects(&mut suspects, &diagnostics);
        warn!("model is infeasible before solving: {}", suspects.join("; "));
        return Err(OptimizeError::Infeasible { suspects });
    }
    if model.eligibility.is_empty() {
        info!("no eligible pairs; returning an empty plan");
        return Ok(empty_plan(PlanStatus::OptimalEmpty, diagnostics));
    }

    let outcome = {
        let session = env.acquire()?.with_time_limit(options.time_limit);
        session.solve(&model)
    };
    let outcome = outcome.map_err(|err| match err {
        OptimizeError::Infeasible { mut suspects } => {
            merge_suspects(&mut suspects, &diagnostics);
            OptimizeError::Infeasible { suspects }
        }
        other => other,
    })?;

    let values = match outcome {
        SolveOutcome::Solved { values, .. } => values,
        SolveOutcome::TimedOut { .. } => {
            return Ok(empty_plan(PlanStatus::TimedOut, diagnostics));
        }
    };

    let assignments = extract_assignments(&model, &values, customers, catalog);
    let kpis = compute_kpis(&assignments);
    let binding = binding::binding_constraints(&model, &values, options.binding_tolerance);
    let status = if assignments.is_empty() {
        PlanStatus::OptimalEmpty
    } else {
        PlanStatus::Optimal
    };
    info!(
        "plan {:?}: {} customers treated, spend ${:.2}, net value ${:.2}",
        status, kpis.customers_treated, kpis.total_cost, kpis.net_value
    );

    Ok(RetentionPlan {
        status,
        objective_value: model.objective_value(&values),
        assignments,
        kpis,
        binding,
        diagnostics,
        model: summary,
        constraints: constraints.clone(),
        solved_at: Utc::now(),
        solve_millis: started.elapsed().as_millis() as u64,
    })
}

fn merge_suspects(suspects: &mut Vec<String>, diagnostics: &[ConstraintConflict]) {
    for conflict in diagnostics
        .iter()
        .filter(|c| c.conflict_type == ConflictType::DirectContradiction)
    {
        for name in &conflict.constraints {
            if !suspects.contains(name) {
                suspects.push(name.clone());
            }
        }
    }
}
