use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Json, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{post, put},
};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    CommitOutcome, EngineError, Expense, FirstMonthPolicy, Fund, FundRepository,
    InMemoryStore, Installment, PurchaseProposal, SimulationPolicy, SimulationResult,
    schedule_installments, simulate_for_user, simulate_snapshot,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliFirstMonthPolicy {
    BalanceOnly,
    ContributeWhenDue,
}

impl From<CliFirstMonthPolicy> for FirstMonthPolicy {
    fn from(value: CliFirstMonthPolicy) -> Self {
        match value {
            CliFirstMonthPolicy::BalanceOnly => FirstMonthPolicy::BalanceOnly,
            CliFirstMonthPolicy::ContributeWhenDue => FirstMonthPolicy::ContributeWhenDue,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "cardfund",
    about = "Credit-card installment affordability simulator for a monthly savings fund"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the JSON API
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
        #[command(flatten)]
        policy: PolicyArgs,
    },
    /// Evaluate one purchase described by a JSON file and print the result
    Simulate {
        #[arg(long, help = "Path to a simulate payload (same shape as POST /api/simulate)")]
        input: PathBuf,
        #[command(flatten)]
        policy: PolicyArgs,
    },
}

#[derive(Args, Debug, Clone)]
struct PolicyArgs {
    #[arg(
        long,
        value_enum,
        default_value_t = CliFirstMonthPolicy::BalanceOnly,
        help = "Whether the first month also receives the contribution when installments are already due in it"
    )]
    first_month_policy: CliFirstMonthPolicy,
    #[arg(long, default_value_t = 12, help = "Shortest projection horizon in months")]
    min_horizon_months: u32,
    #[arg(
        long,
        default_value_t = 3,
        help = "Months projected after the last proposed installment"
    )]
    horizon_padding_months: u32,
    #[arg(
        long,
        default_value_t = 150.0,
        help = "Ceiling for suggested contributions in percent of the current contribution or installment"
    )]
    contribution_ceiling: f64,
    #[arg(
        long,
        default_value_t = 30.0,
        help = "Share of the current contribution assumed available for catching up, in percent"
    )]
    remediation_share: f64,
    #[arg(long, default_value_t = 6, help = "Longest catch-up window in months")]
    max_remediation_months: u32,
    #[arg(
        long,
        default_value_t = 100.0,
        help = "Suggested extra contributions are rounded up to this step"
    )]
    rounding_step: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulatePayload {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    fund: Option<Fund>,
    #[serde(default)]
    expenses: Vec<Expense>,
    amount: f64,
    total_installments: u32,
    #[serde(default)]
    purchase_date: Option<NaiveDate>,
    #[serde(default)]
    as_of: Option<NaiveDate>,
    #[serde(default)]
    first_month_policy: Option<FirstMonthPolicy>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchedulePayload {
    amount: f64,
    total_installments: u32,
    start_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitPayload {
    user_id: String,
    #[serde(default)]
    description: String,
    amount: f64,
    total_installments: u32,
    #[serde(default)]
    purchase_date: Option<NaiveDate>,
    #[serde(default)]
    as_of: Option<NaiveDate>,
    #[serde(default)]
    first_month_policy: Option<FirstMonthPolicy>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleResponse {
    installment_amount: f64,
    installments: Vec<Installment>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Clone, Debug)]
struct AppState {
    policy: SimulationPolicy,
    store: Arc<InMemoryStore>,
}

impl AppState {
    fn new(policy: SimulationPolicy) -> Self {
        Self {
            policy,
            store: Arc::new(InMemoryStore::new()),
        }
    }

    fn policy_for(&self, first_month: Option<FirstMonthPolicy>) -> SimulationPolicy {
        SimulationPolicy {
            first_month: first_month.unwrap_or(self.policy.first_month),
            ..self.policy
        }
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn build_policy(args: &PolicyArgs) -> Result<SimulationPolicy, String> {
    if args.min_horizon_months == 0 {
        return Err("--min-horizon-months must be > 0".to_string());
    }

    if !args.contribution_ceiling.is_finite() || args.contribution_ceiling < 100.0 {
        return Err("--contribution-ceiling must be >= 100".to_string());
    }

    if !(args.remediation_share > 0.0 && args.remediation_share <= 100.0) {
        return Err("--remediation-share must be between 0 (exclusive) and 100".to_string());
    }

    if args.max_remediation_months == 0 {
        return Err("--max-remediation-months must be > 0".to_string());
    }

    if !args.rounding_step.is_finite() || args.rounding_step <= 0.0 {
        return Err("--rounding-step must be > 0".to_string());
    }

    let policy = SimulationPolicy {
        first_month: args.first_month_policy.into(),
        min_horizon_months: args.min_horizon_months,
        horizon_padding_months: args.horizon_padding_months,
        contribution_ceiling_factor: args.contribution_ceiling / 100.0,
        remediation_share: args.remediation_share / 100.0,
        max_remediation_months: args.max_remediation_months,
        contribution_rounding_step: args.rounding_step,
    };
    policy.validate().map_err(|e| e.to_string())?;
    Ok(policy)
}

pub async fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Command::Serve { port, policy } => {
            let policy = build_policy(&policy)?;
            run_http_server(port, policy)
                .await
                .map_err(|e| format!("Server error: {e}"))
        }
        Command::Simulate { input, policy } => {
            let policy = build_policy(&policy)?;
            let raw = fs::read_to_string(&input)
                .map_err(|e| format!("Cannot read {}: {e}", input.display()))?;
            let payload = payload_from_json(&raw)?;
            let state = AppState::new(policy);
            let result = run_simulation(&state, payload).map_err(|e| e.to_string())?;
            let json = serde_json::to_string_pretty(&result)
                .map_err(|e| format!("Cannot encode result: {e}"))?;
            println!("{json}");
            Ok(())
        }
    }
}

pub async fn run_http_server(port: u16, policy: SimulationPolicy) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/api/simulate", post(simulate_handler))
        .route("/api/schedule", post(schedule_handler))
        .route("/api/funds", put(fund_handler))
        .route("/api/purchases", post(commit_handler))
        .fallback(not_found_handler)
        .with_state(AppState::new(policy));

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, first_month = ?policy.first_month, "cardfund API listening");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_handler(
    State(state): State<AppState>,
    Json(payload): Json<SimulatePayload>,
) -> Response {
    simulate_response(&state, payload)
}

async fn schedule_handler(Json(payload): Json<SchedulePayload>) -> Response {
    schedule_response(payload)
}

async fn fund_handler(State(state): State<AppState>, Json(fund): Json<Fund>) -> Response {
    fund_response(&state, fund)
}

async fn commit_handler(
    State(state): State<AppState>,
    Json(payload): Json<CommitPayload>,
) -> Response {
    commit_response(&state, payload)
}

fn simulate_response(state: &AppState, payload: SimulatePayload) -> Response {
    match run_simulation(state, payload) {
        Ok(result) => json_response(StatusCode::OK, result),
        Err(err) => {
            warn!(error = %err, "rejected simulation request");
            error_response(status_for(&err), &err.to_string())
        }
    }
}

fn schedule_response(payload: SchedulePayload) -> Response {
    match schedule_installments(payload.amount, payload.total_installments, payload.start_date) {
        Ok(installments) => json_response(
            StatusCode::OK,
            ScheduleResponse {
                installment_amount: payload.amount / payload.total_installments as f64,
                installments,
            },
        ),
        Err(err) => {
            warn!(error = %err, "rejected schedule request");
            error_response(status_for(&err), &err.to_string())
        }
    }
}

fn fund_response(state: &AppState, fund: Fund) -> Response {
    match state.store.update_fund(fund.clone()) {
        Ok(()) => json_response(StatusCode::OK, fund),
        Err(err) => {
            warn!(error = %err, "rejected fund update");
            error_response(status_for(&err), &err.to_string())
        }
    }
}

fn commit_response(state: &AppState, payload: CommitPayload) -> Response {
    match run_commit(state, payload) {
        Ok(outcome) => {
            let status = if outcome.expense.is_some() {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            json_response(status, outcome)
        }
        Err(err) => {
            warn!(error = %err, "rejected purchase commit");
            error_response(status_for(&err), &err.to_string())
        }
    }
}

fn status_for(err: &EngineError) -> StatusCode {
    match err {
        EngineError::FundNotConfigured { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        e if e.is_input_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn payload_from_json(json: &str) -> Result<SimulatePayload, String> {
    serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid simulate JSON payload: {e}"))
}

/// A payload carrying its own fund is evaluated as a snapshot; otherwise the
/// user's stored fund and committed expenses are used.
fn run_simulation(
    state: &AppState,
    payload: SimulatePayload,
) -> Result<SimulationResult, EngineError> {
    let policy = state.policy_for(payload.first_month_policy);
    let as_of = payload.as_of.unwrap_or_else(today);
    let user_id = payload.user_id.unwrap_or_default();
    let proposal = PurchaseProposal {
        amount: payload.amount,
        total_installments: payload.total_installments,
        purchase_date: payload.purchase_date,
    };

    match payload.fund {
        Some(fund) => simulate_snapshot(
            &user_id,
            Some(fund),
            &payload.expenses,
            &proposal,
            as_of,
            &policy,
        ),
        None if !user_id.is_empty() => {
            simulate_for_user(state.store.as_ref(), &user_id, &proposal, as_of, &policy)
        }
        None => Err(EngineError::FundNotConfigured { user_id }),
    }
}

fn run_commit(state: &AppState, payload: CommitPayload) -> Result<CommitOutcome, EngineError> {
    let policy = state.policy_for(payload.first_month_policy);
    let proposal = PurchaseProposal {
        amount: payload.amount,
        total_installments: payload.total_installments,
        purchase_date: payload.purchase_date,
    };
    state.store.commit_if_affordable(
        &payload.user_id,
        &proposal,
        &payload.description,
        payload.as_of.unwrap_or_else(today),
        &policy,
    )
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}
