use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::data::catalog::default_catalog;
use crate::data::loader::{load_actions, load_customers};
use crate::data::sample::sample_customers;
use crate::data::{build_catalog, build_customers, ActionRecord, CustomerRecord};
use crate::error::OptimizeError;
use crate::model::{ActionCatalog, Customer};
use crate::optimizer::constraints::ConstraintConfig;
use crate::optimizer::extract::Assignment;
use crate::optimizer::holdout::{assign_holdout, TreatmentRow};
use crate::optimizer::sensitivity::{budget_points, run_budget_sensitivity, SensitivityReport};
use crate::optimizer::session::SolverEnvironment;
use crate::optimizer::summary::top_assignments;
use crate::optimizer::{optimize, RunStatus, SolveOptions};
use crate::output::json::PlanReport;

#[derive(Debug, Clone)]
struct ApiState {
    config: Arc<Config>,
    env: SolverEnvironment,
    options: SolveOptions,
    customers: Arc<Vec<Customer>>,
    catalog: Arc<ActionCatalog>,
}

impl ApiState {
    fn from_config(config: Config) -> Result<Self> {
        let customers = match config.resolved_customers_path() {
            Some(path) => load_customers(&path)?,
            None => sample_customers(config.data.sample_size)?,
        };
        let catalog = match config.resolved_actions_path() {
            Some(path) => load_actions(&path)?,
            None => default_catalog(),
        };
        Ok(Self {
            env: SolverEnvironment::new(config.solver.max_sessions),
            options: config.solve_options()?,
            config: Arc::new(config),
            customers: Arc::new(customers),
            catalog: Arc::new(catalog),
        })
    }
}

#[derive(Debug, Serialize)]
struct ApiResponse<T: Serialize> {
    ok: bool,
    data: T,
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    ok: bool,
    error: String,
    status: RunStatus,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    run_status: RunStatus,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            run_status: RunStatus::InvalidRequest,
            message: message.into(),
        }
    }

    fn internal(error: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            run_status: RunStatus::SolverError,
            message: error.to_string(),
        }
    }
}

impl From<OptimizeError> for ApiError {
    fn from(err: OptimizeError) -> Self {
        let status = match &err {
            OptimizeError::InvalidInput { .. } | OptimizeError::InvalidParameter { .. } => {
                StatusCode::BAD_REQUEST
            }
            OptimizeError::Infeasible { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            OptimizeError::SessionUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            OptimizeError::Unbounded | OptimizeError::Solver { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = err.to_string();
        Self {
            status,
            run_status: RunStatus::of(&Err(err)),
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ApiErrorBody {
            ok: false,
            error: self.message,
            status: self.run_status,
        });
        (self.status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<ApiResponse<T>>, ApiError>;

/// Inline tables and constraint overrides; anything absent falls back to
/// the tables and `[constraints]` the server was started with.
#[derive(Debug, Clone, Default, Deserialize)]
struct DataRequest {
    customers: Option<Vec<CustomerRecord>>,
    actions: Option<Vec<ActionRecord>>,
    #[serde(default)]
    constraints: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct OptimizeRequest {
    #[serde(flatten)]
    data: DataRequest,
    top: Option<usize>,
    #[serde(default)]
    holdout: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct SensitivityRequest {
    #[serde(flatten)]
    data: DataRequest,
    min_budget: f64,
    max_budget: f64,
    step: f64,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    active_sessions: usize,
    max_sessions: usize,
}

#[derive(Debug, Serialize)]
struct OptimizeResponse {
    #[serde(flatten)]
    report: serde_json::Value,
    top_assignments: Vec<Assignment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    treatments: Option<Vec<TreatmentRow>>,
}

pub async fn run_server(config: Config, bind: SocketAddr) -> Result<()> {
    let state = ApiState::from_config(config)?;
    info!(
        "serving {} customers x {} actions, {} solver sessions",
        state.customers.len(),
        state.catalog.len(),
        state.env.capacity()
    );

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("REST API listening on http://{bind}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/v1/config", get(show_config))
        .route("/v1/catalog", get(show_catalog))
        .route("/v1/optimize", post(run_optimize))
        .route("/v1/sensitivity", post(run_sensitivity))
        .layer(cors)
        .with_state(state)
}

async fn health(State(state): State<ApiState>) -> Json<ApiResponse<HealthResponse>> {
    ok(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        active_sessions: state.env.active_sessions(),
        max_sessions: state.env.capacity(),
    })
}

async fn show_config(State(state): State<ApiState>) -> Json<ApiResponse<Config>> {
    ok(state.config.as_ref().clone())
}

async fn show_catalog(State(state): State<ApiState>) -> Json<ApiResponse<ActionCatalog>> {
    ok(state.catalog.as_ref().clone())
}

async fn run_optimize(
    State(state): State<ApiState>,
    Json(request): Json<OptimizeRequest>,
) -> ApiResult<OptimizeResponse> {
    let (customers, catalog, constraints) = resolve_inputs(&state, request.data)?;
    let env = state.env.clone();
    let options = state.options.clone();

    let plan = tokio::task::spawn_blocking(move || {
        optimize(&env, &customers, &catalog, &constraints, &options)
    })
    .await
    .map_err(ApiError::internal)?
    .map_err(|err| {
        warn!("optimize request failed: {err}");
        ApiError::from(err)
    })?;

    let top = request.top.unwrap_or(state.config.report.top_customers);
    let treatments = if request.holdout {
        Some(
            assign_holdout(
                &plan.assignments,
                state.config.holdout.fraction,
                state.config.holdout.seed,
            )?,
        )
    } else {
        None
    };
    let report = serde_json::to_value(PlanReport::new(&plan)).map_err(ApiError::internal)?;

    Ok(ok(OptimizeResponse {
        report,
        top_assignments: top_assignments(&plan.assignments, top),
        treatments,
    }))
}

async fn run_sensitivity(
    State(state): State<ApiState>,
    Json(request): Json<SensitivityRequest>,
) -> ApiResult<SensitivityReport> {
    let budgets = budget_points(request.min_budget, request.max_budget, request.step)?;
    let (customers, catalog, constraints) = resolve_inputs(&state, request.data)?;
    let env = state.env.clone();
    let options = state.options.clone();

    let report = tokio::task::spawn_blocking(move || {
        run_budget_sensitivity(&env, &customers, &catalog, &constraints, &budgets, &options)
    })
    .await
    .map_err(ApiError::internal)?;
    Ok(ok(report))
}

fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { ok: true, data })
}

type Inputs = (Arc<Vec<Customer>>, Arc<ActionCatalog>, ConstraintConfig);

fn resolve_inputs(state: &ApiState, data: DataRequest) -> std::result::Result<Inputs, ApiError> {
    let customers = match data.customers {
        Some(records) => Arc::new(build_customers(records)?),
        None => Arc::clone(&state.customers),
    };
    let catalog = match data.actions {
        Some(records) => Arc::new(build_catalog(records)?),
        None => Arc::clone(&state.catalog),
    };

    let mut params = state.config.constraints.params.clone();
    params.extend(data.constraints);
    let constraints = ConstraintConfig::from_params(&params)
        .map_err(|err| ApiError::bad_request(err.to_string()))?;
    Ok((customers, catalog, constraints))
}
