//! Indirect-cost allocation over stored expenses.

use std::collections::BTreeSet;

use contract_ledger::allocation::{split_across_weeks, summarize};
use contract_ledger::invariants;
use contract_ledger::weekly::group_by_week;
use contract_ledger::{
    AllocationSummary, ExpensePayment, Period, ProjectExpensePeriod, WeeklyAllocation,
};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db;
use crate::errors::{Result, ServiceError};

/// A project's weeks in one period, with its share of the overhead spread
/// over them.
#[derive(Debug, Serialize)]
pub struct ProjectWeeks {
    pub project_id: String,
    pub period: Period,
    pub indirect_cost_assigned: Decimal,
    pub weeks: Vec<WeeklyAllocation>,
}

async fn payments(
    pool: &SqlitePool,
    period: Period,
    project_id: Option<&str>,
) -> Result<Vec<ExpensePayment>> {
    db::get_expenses(pool, period, project_id)
        .await?
        .iter()
        .map(|r| r.to_payment())
        .collect()
}

/// Allocate the recorded indirect cost of `period` across every project
/// with payments in it, and replace the saved allocation.
pub async fn compute_and_save(pool: &SqlitePool, period: Period) -> Result<AllocationSummary> {
    let indirect = db::get_indirect_cost(pool, period)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("indirect cost for {period}")))?;

    let payments = payments(pool, period, None).await?;
    let projects: BTreeSet<&str> = payments.iter().map(|p| p.project_id.as_str()).collect();
    let expenses: Vec<ProjectExpensePeriod> = projects
        .into_iter()
        .map(|id| ProjectExpensePeriod::from_payments(id, period, &payments))
        .collect();

    let summary = summarize(period, &expenses, indirect)?;
    if let Err(violation) = invariants::check_allocation(&summary.results, indirect) {
        warn!("Allocation for {period} violates an invariant: {violation}");
    }
    db::save_allocation(pool, period, &summary.results).await?;
    info!(
        "Saved allocation for {period}: {} project(s), indirect {indirect}",
        summary.results.len()
    );
    Ok(summary)
}

/// The allocation last saved for `period`.
pub async fn saved_summary(pool: &SqlitePool, period: Period) -> Result<AllocationSummary> {
    let indirect_cost_total = db::get_indirect_cost(pool, period)
        .await?
        .unwrap_or(Decimal::ZERO);
    let results = db::get_allocation(pool, period)
        .await?
        .iter()
        .map(|r| r.to_result())
        .collect::<Result<Vec<_>>>()?;
    Ok(AllocationSummary {
        period,
        indirect_cost_total,
        direct_expense_total: results.iter().map(|r| r.direct_expense_total).sum(),
        results,
    })
}

/// Weekly buckets of one project, carrying its saved overhead share
/// (zero when no allocation has been saved for it).
pub async fn project_weeks(
    pool: &SqlitePool,
    project_id: &str,
    period: Period,
) -> Result<ProjectWeeks> {
    let payments = payments(pool, period, Some(project_id)).await?;
    let weeks = group_by_week(&payments);

    let indirect_cost_assigned = match db::get_allocation(pool, period)
        .await?
        .iter()
        .find(|r| r.project_id == project_id)
    {
        Some(record) => record.to_result()?.indirect_cost_assigned,
        None => Decimal::ZERO,
    };

    Ok(ProjectWeeks {
        project_id: project_id.to_string(),
        period,
        indirect_cost_assigned,
        weeks: split_across_weeks(indirect_cost_assigned, &weeks),
    })
}
