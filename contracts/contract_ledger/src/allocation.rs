//! # Indirect-Cost Allocation
//!
//! Shared overhead for a period is split across the projects active in it,
//! in proportion to each project's direct spend:
//!
//! ```text
//! proportion  = direct / total_direct          (0 when total_direct = 0)
//! assigned    = proportion * indirect_total
//! total       = direct + assigned
//! ```
//!
//! Within one project the same rule spreads its assigned overhead over its
//! weekly buckets. Rounded shares are reconciled to the cent, so assignments
//! always sum to the amount being split when there is any direct spend.

use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::money::{apportion, MAX_AMOUNT};
use crate::period::Period;
use crate::weekly::{ExpensePayment, WeeklyExpense};
use crate::{Error, Result};

/// A project's direct spend for one period.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectExpensePeriod {
    pub project_id: String,
    pub period: Period,
    pub direct_expense_total: Decimal,
}

impl ProjectExpensePeriod {
    /// Sum the payments of `project_id` dated inside `period`.
    pub fn from_payments<'a, I>(project_id: &str, period: Period, payments: I) -> Self
    where
        I: IntoIterator<Item = &'a ExpensePayment>,
    {
        let direct_expense_total = payments
            .into_iter()
            .filter(|p| p.project_id == project_id && period.contains(p.date))
            .map(|p| p.amount)
            .sum();
        ProjectExpensePeriod {
            project_id: project_id.to_string(),
            period,
            direct_expense_total,
        }
    }
}

/// One project's share of the period's overhead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub project_id: String,
    pub period: Period,
    pub direct_expense_total: Decimal,
    /// Fraction of total direct spend, 0–1.
    pub proportion: Decimal,
    pub indirect_cost_assigned: Decimal,
    pub total_with_indirect: Decimal,
}

/// Allocation results for a period together with its totals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationSummary {
    pub period: Period,
    pub indirect_cost_total: Decimal,
    pub direct_expense_total: Decimal,
    pub results: Vec<AllocationResult>,
}

/// One week's share of a project's assigned overhead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyAllocation {
    pub week: WeeklyExpense,
    pub direct_total: Decimal,
    pub proportion: Decimal,
    pub indirect_cost: Decimal,
    pub total: Decimal,
}

/// Split `indirect_cost_total` across `project_expenses` for `period`.
///
/// Results keep the input order.
pub fn allocate(
    period: Period,
    project_expenses: &[ProjectExpensePeriod],
    indirect_cost_total: Decimal,
) -> Result<Vec<AllocationResult>> {
    check_non_negative("indirect cost total", indirect_cost_total)?;

    let mut seen = HashSet::new();
    for expense in project_expenses {
        if expense.period != period {
            return Err(Error::PeriodMismatch {
                expected: period,
                got: expense.period,
            });
        }
        if !seen.insert(expense.project_id.as_str()) {
            return Err(Error::DuplicateProject(expense.project_id.clone()));
        }
        check_non_negative(
            &format!("direct expenses of `{}`", expense.project_id),
            expense.direct_expense_total,
        )?;
    }

    let weights: Vec<Decimal> = project_expenses
        .iter()
        .map(|e| e.direct_expense_total)
        .collect();
    let shares = apportion(indirect_cost_total, &weights);

    let results: Vec<AllocationResult> = project_expenses
        .iter()
        .zip(shares)
        .map(|(expense, (proportion, assigned))| AllocationResult {
            project_id: expense.project_id.clone(),
            period,
            direct_expense_total: expense.direct_expense_total,
            proportion,
            indirect_cost_assigned: assigned,
            total_with_indirect: expense.direct_expense_total + assigned,
        })
        .collect();

    debug!(
        "Allocated {indirect_cost_total} of indirect cost for {period} across {} project(s)",
        results.len()
    );
    Ok(results)
}

/// [`allocate`], wrapped with the period's totals.
pub fn summarize(
    period: Period,
    project_expenses: &[ProjectExpensePeriod],
    indirect_cost_total: Decimal,
) -> Result<AllocationSummary> {
    let results = allocate(period, project_expenses, indirect_cost_total)?;
    Ok(AllocationSummary {
        period,
        indirect_cost_total,
        direct_expense_total: results.iter().map(|r| r.direct_expense_total).sum(),
        results,
    })
}

/// Spread a project's assigned overhead over its weeks by direct spend.
pub fn split_across_weeks(indirect_assigned: Decimal, weeks: &[WeeklyExpense]) -> Vec<WeeklyAllocation> {
    let weights: Vec<Decimal> = weeks.iter().map(WeeklyExpense::direct_total).collect();
    weeks
        .iter()
        .zip(apportion(indirect_assigned, &weights))
        .map(|(week, (proportion, indirect_cost))| {
            let direct_total = week.direct_total();
            WeeklyAllocation {
                week: week.clone(),
                direct_total,
                proportion,
                indirect_cost,
                total: direct_total + indirect_cost,
            }
        })
        .collect()
}

fn check_non_negative(name: &str, value: Decimal) -> Result<()> {
    if value < Decimal::ZERO {
        return Err(Error::InvalidAmount(format!(
            "{name} must not be negative, got {value}"
        )));
    }
    if value > MAX_AMOUNT {
        return Err(Error::InvalidAmount(format!("{name} {value} exceeds {MAX_AMOUNT}")));
    }
    Ok(())
}
