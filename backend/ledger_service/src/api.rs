//! Axum REST API handlers.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use contract_ledger::money::MAX_AMOUNT;
use contract_ledger::{
    AllocationSummary, Contract, ContractLedger, ContractTerms, ExpenseCategory, ExpensePayment,
    LedgerEntry, LedgerPolicy, LedgerRow, LedgerState, LedgerTotals, MovementInput, Period,
    RawAmount,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db;
use crate::errors::{Result, ServiceError};
use crate::ledgers;
use crate::overhead::{self, ProjectWeeks};

#[derive(Clone)]
pub struct ApiState {
    pub pool: SqlitePool,
    pub policy: LedgerPolicy,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/contracts", post(create_contract))
        .route("/contracts/:id", get(get_contract))
        .route("/contracts/:id/ledger", get(get_ledger))
        .route("/contracts/:id/movements", post(submit_movement))
        .route("/contracts/:id/movements/:seq", delete(truncate_movements))
        .route("/contracts/:id/movements/:seq/paid", put(set_paid_amount))
        .route("/projects/:id/expenses", post(record_expense))
        .route("/projects/:id/weeks/:period", get(get_project_weeks))
        .route("/periods/:period/indirect-cost", put(set_indirect_cost))
        .route(
            "/periods/:period/allocation",
            post(compute_allocation).get(get_allocation),
        )
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Deserialize)]
pub struct CreateContractRequest {
    pub id: String,
    pub original_amount: Decimal,
    pub advance_percentage: Decimal,
    pub guarantee_fund_percentage: Decimal,
}

#[derive(Serialize)]
pub struct ContractResponse {
    pub id: String,
    pub original_amount: Decimal,
    pub advance_percentage: Decimal,
    pub guarantee_fund_percentage: Decimal,
    pub advance_total: Decimal,
    pub guarantee_fund_cap: Decimal,
}

impl ContractResponse {
    fn new(id: String, contract: &Contract) -> Self {
        ContractResponse {
            id,
            original_amount: contract.original_amount(),
            advance_percentage: contract.advance_percentage(),
            guarantee_fund_percentage: contract.guarantee_fund_percentage(),
            advance_total: contract.advance_total(),
            guarantee_fund_cap: contract.guarantee_fund_cap(),
        }
    }
}

#[derive(Serialize)]
pub struct LedgerResponse {
    pub contract_id: String,
    pub count: usize,
    pub rows: Vec<LedgerRow>,
    pub totals: LedgerTotals,
    pub progress: Decimal,
    pub current_state: LedgerState,
}

impl LedgerResponse {
    fn new(contract_id: String, ledger: &ContractLedger) -> Self {
        LedgerResponse {
            contract_id,
            count: ledger.len(),
            rows: ledger.rows(),
            totals: ledger.totals(),
            progress: ledger.progress(),
            current_state: ledger.current_state().clone(),
        }
    }
}

#[derive(Deserialize)]
pub struct PaidAmountRequest {
    pub paid_amount: RawAmount,
}

#[derive(Deserialize)]
pub struct ExpenseRequest {
    pub date: NaiveDate,
    pub amount: RawAmount,
    pub category: ExpenseCategory,
}

#[derive(Serialize)]
pub struct ExpenseResponse {
    pub id: i64,
    #[serde(flatten)]
    pub payment: ExpensePayment,
}

#[derive(Deserialize)]
pub struct IndirectCostRequest {
    pub amount: RawAmount,
}

#[derive(Serialize)]
pub struct IndirectCostResponse {
    pub period: Period,
    pub amount: Decimal,
}

fn parse_period(raw: &str) -> Result<Period> {
    Ok(Period::from_str(raw)?)
}

/// A caller-supplied amount that must be in `0..=MAX_AMOUNT`.
fn non_negative(name: &str, raw: &RawAmount) -> Result<Decimal> {
    let value = raw.to_decimal()?;
    if (value.is_sign_negative() && !value.is_zero()) || value > MAX_AMOUNT {
        return Err(contract_ledger::Error::InvalidAmount(format!(
            "{name} must be between 0 and {MAX_AMOUNT}, got {value}"
        ))
        .into());
    }
    Ok(value)
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /contracts`
pub async fn create_contract(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<CreateContractRequest>,
) -> Result<(StatusCode, Json<ContractResponse>)> {
    let id = req.id.trim().to_string();
    if id.is_empty() {
        return Err(contract_ledger::Error::InvalidContractTerms("contract id is empty".into()).into());
    }
    let contract = Contract::new(ContractTerms {
        original_amount: req.original_amount,
        advance_percentage: req.advance_percentage,
        guarantee_fund_percentage: req.guarantee_fund_percentage,
    })?;
    db::insert_contract(&state.pool, &id, &contract).await?;
    Ok((StatusCode::CREATED, Json(ContractResponse::new(id, &contract))))
}

/// `GET /contracts/:id`
pub async fn get_contract(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<ContractResponse>> {
    let contract = db::get_contract(&state.pool, &id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("contract `{id}`")))?
        .to_contract()?;
    Ok(Json(ContractResponse::new(id, &contract)))
}

/// `GET /contracts/:id/ledger`
///
/// Report rows with paid annotations merged, plus totals.
pub async fn get_ledger(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<LedgerResponse>> {
    let ledger = ledgers::load_ledger(&state.pool, &id, state.policy).await?;
    Ok(Json(LedgerResponse::new(id, &ledger)))
}

/// `POST /contracts/:id/movements`
pub async fn submit_movement(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Json(input): Json<MovementInput>,
) -> Result<(StatusCode, Json<LedgerEntry>)> {
    let entry = ledgers::submit_movement(&state.pool, &id, state.policy, &input).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// `DELETE /contracts/:id/movements/:seq`
///
/// Removes the movement and every later one so they can be resubmitted.
pub async fn truncate_movements(
    State(state): State<Arc<ApiState>>,
    Path((id, seq)): Path<(String, u32)>,
) -> Result<Json<LedgerResponse>> {
    let ledger = ledgers::truncate_movements(&state.pool, &id, state.policy, seq).await?;
    Ok(Json(LedgerResponse::new(id, &ledger)))
}

/// `PUT /contracts/:id/movements/:seq/paid`
pub async fn set_paid_amount(
    State(state): State<Arc<ApiState>>,
    Path((id, seq)): Path<(String, u32)>,
    Json(req): Json<PaidAmountRequest>,
) -> Result<Json<LedgerResponse>> {
    let paid = req.paid_amount.to_decimal()?;
    let ledger = ledgers::set_paid_amount(&state.pool, &id, state.policy, seq, paid).await?;
    Ok(Json(LedgerResponse::new(id, &ledger)))
}

/// `POST /projects/:id/expenses`
pub async fn record_expense(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<String>,
    Json(req): Json<ExpenseRequest>,
) -> Result<(StatusCode, Json<ExpenseResponse>)> {
    let payment = ExpensePayment {
        project_id,
        date: req.date,
        amount: non_negative("expense amount", &req.amount)?,
        category: req.category,
    };
    let id = db::insert_expense(&state.pool, &payment).await?;
    Ok((StatusCode::CREATED, Json(ExpenseResponse { id, payment })))
}

/// `GET /projects/:id/weeks/:period`
pub async fn get_project_weeks(
    State(state): State<Arc<ApiState>>,
    Path((project_id, period)): Path<(String, String)>,
) -> Result<Json<ProjectWeeks>> {
    let period = parse_period(&period)?;
    Ok(Json(
        overhead::project_weeks(&state.pool, &project_id, period).await?,
    ))
}

/// `PUT /periods/:period/indirect-cost`
pub async fn set_indirect_cost(
    State(state): State<Arc<ApiState>>,
    Path(period): Path<String>,
    Json(req): Json<IndirectCostRequest>,
) -> Result<Json<IndirectCostResponse>> {
    let period = parse_period(&period)?;
    let amount = non_negative("indirect cost", &req.amount)?;
    db::set_indirect_cost(&state.pool, period, amount).await?;
    Ok(Json(IndirectCostResponse { period, amount }))
}

/// `POST /periods/:period/allocation`
///
/// Recompute from the stored expenses and indirect cost, then save.
pub async fn compute_allocation(
    State(state): State<Arc<ApiState>>,
    Path(period): Path<String>,
) -> Result<Json<AllocationSummary>> {
    let period = parse_period(&period)?;
    Ok(Json(overhead::compute_and_save(&state.pool, period).await?))
}

/// `GET /periods/:period/allocation`
pub async fn get_allocation(
    State(state): State<Arc<ApiState>>,
    Path(period): Path<String>,
) -> Result<Json<AllocationSummary>> {
    let period = parse_period(&period)?;
    Ok(Json(overhead::saved_summary(&state.pool, period).await?))
}
