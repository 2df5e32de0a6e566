use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use good_lp::solvers::microlp::microlp;
use good_lp::{
    constraint, variable, Expression, ProblemVariables, ResolutionError, Solution, SolverModel,
    Variable,
};
use tracing::{debug, info, warn};

use crate::error::OptimizeError;
use crate::optimizer::assembler::{AssembledModel, RowSense};

/// Shared pool of solver seats.
///
/// Cloning is cheap and every clone draws from the same pool, so one
/// environment can back any number of concurrent requests.
#[derive(Debug, Clone)]
pub struct SolverEnvironment {
    in_use: Arc<AtomicUsize>,
    next_id: Arc<AtomicU64>,
    capacity: usize,
}

impl SolverEnvironment {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            in_use: Arc::new(AtomicUsize::new(0)),
            next_id: Arc::new(AtomicU64::new(1)),
            capacity: max_sessions.max(1),
        }
    }

    /// Take a seat for exactly one solve. The seat is returned once the
    /// session is dropped and any backend work it started has finished.
    pub fn acquire(&self) -> Result<SolverSession, OptimizeError> {
        let capacity = self.capacity;
        self.in_use
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < capacity).then_some(n + 1)
            })
            .map_err(|in_use| OptimizeError::SessionUnavailable { in_use, capacity })?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        debug!("solver session {id} acquired");
        Ok(SolverSession {
            id,
            acquired_at: Utc::now(),
            time_limit: None,
            seat: Arc::new(Seat {
                id,
                in_use: Arc::clone(&self.in_use),
            }),
        })
    }

    pub fn active_sessions(&self) -> usize {
        self.in_use.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for SolverEnvironment {
    fn default() -> Self {
        Self::new(4)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SolveOutcome {
    Solved { values: Vec<f64>, elapsed: Duration },
    /// The wall-clock limit expired before the backend returned.
    TimedOut { elapsed: Duration },
}

/// One occupied unit of environment capacity, freed when its last holder
/// goes away.
#[derive(Debug)]
struct Seat {
    id: u64,
    in_use: Arc<AtomicUsize>,
}

impl Drop for Seat {
    fn drop(&mut self) {
        self.in_use.fetch_sub(1, Ordering::SeqCst);
        debug!("solver session {} released", self.id);
    }
}

#[derive(Debug)]
pub struct SolverSession {
    id: u64,
    acquired_at: DateTime<Utc>,
    time_limit: Option<Duration>,
    seat: Arc<Seat>,
}

impl SolverSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    pub fn with_time_limit(mut self, limit: Option<Duration>) -> Self {
        self.time_limit = limit;
        self
    }

    pub fn solve(&self, model: &AssembledModel) -> Result<SolveOutcome, OptimizeError> {
        if !model.unsatisfiable.is_empty() {
            return Err(OptimizeError::Infeasible {
                suspects: model.unsatisfiable.iter().map(|k| k.to_string()).collect(),
            });
        }
        let started = Instant::now();
        if model.eligibility.is_empty() {
            return Ok(SolveOutcome::Solved {
                values: Vec::new(),
                elapsed: started.elapsed(),
            });
        }

        let outcome = match self.time_limit {
            None => SolveOutcome::Solved {
                values: solve_with_backend(model)?,
                elapsed: started.elapsed(),
            },
            Some(limit) => {
                let owned = model.clone();
                match run_with_limit(&self.seat, limit, move || solve_with_backend(&owned))? {
                    Some(result) => SolveOutcome::Solved {
                        values: result?,
                        elapsed: started.elapsed(),
                    },
                    None => {
                        warn!(
                            "session {} hit the {:.1}s time limit without a solution",
                            self.id,
                            limit.as_secs_f64()
                        );
                        SolveOutcome::TimedOut {
                            elapsed: started.elapsed(),
                        }
                    }
                }
            }
        };

        if let SolveOutcome::Solved { elapsed, .. } = &outcome {
            info!(
                "session {} solved {} variables in {} ms",
                self.id,
                model.variable_count(),
                elapsed.as_millis()
            );
        }
        Ok(outcome)
    }
}

/// Run `job` on a worker thread and wait at most `limit` for it.
///
/// The worker holds its own handle on `seat`, so an abandoned job keeps the
/// seat occupied until the backend actually returns. `Ok(None)` means the
/// limit expired first.
fn run_with_limit<T, F>(
    seat: &Arc<Seat>,
    limit: Duration,
    job: F,
) -> Result<Option<T>, OptimizeError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let held = Arc::clone(seat);
    std::thread::Builder::new()
        .name(format!("solver-{}", seat.id))
        .spawn(move || {
            let result = job();
            drop(held);
            let _ = tx.send(result);
        })
        .map_err(|e| OptimizeError::Solver {
            stage: "spawn",
            message: e.to_string(),
        })?;
    match rx.recv_timeout(limit) {
        Ok(result) => Ok(Some(result)),
        Err(mpsc::RecvTimeoutError::Timeout) => Ok(None),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(OptimizeError::Solver {
            stage: "solve",
            message: "solver worker exited without a result".to_string(),
        }),
    }
}

fn solve_with_backend(model: &AssembledModel) -> Result<Vec<f64>, OptimizeError> {
    let mut vars = ProblemVariables::new();
    let xs: Vec<Variable> = model
        .eligibility
        .pairs
        .iter()
        .map(|_| vars.add(variable().binary()))
        .collect();

    let mut objective = Expression::default();
    for (x, pair) in xs.iter().zip(&model.eligibility.pairs) {
        objective += *x * pair.coefficient;
    }

    let mut problem = vars.maximise(objective).using(microlp);
    for row in &model.rows {
        let mut lhs = Expression::default();
        for (idx, coef) in &row.terms {
            lhs += xs[*idx] * *coef;
        }
        problem = problem.with(match row.sense {
            RowSense::AtMost => constraint::leq(lhs, row.rhs),
            RowSense::AtLeast => constraint::geq(lhs, row.rhs),
        });
    }

    let solution = problem.solve().map_err(|err| match err {
        ResolutionError::Infeasible => OptimizeError::Infeasible {
            suspects: Vec::new(),
        },
        ResolutionError::Unbounded => OptimizeError::Unbounded,
        other => OptimizeError::Solver {
            stage: "solve",
            message: other.to_string(),
        },
    })?;

    Ok(xs.iter().map(|x| solution.value(*x)).collect())
}
