//! Database layer: migrations and queries.

use std::str::FromStr;

use contract_ledger::{AllocationResult, Contract, ExpensePayment, LedgerEntry, LedgerState, Period};
use rust_decimal::Decimal;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use tracing::info;

use crate::errors::{Result, ServiceError};
use crate::records::{self, AllocationRecord, ContractRecord, ExpenseRecord, MovementRecord};

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    connect(database_url, 5).await
}

/// Like [`init_pool`] with an explicit pool size. An in-memory database
/// must use a single connection or every connection sees its own copy.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };
    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

fn conflict_on_duplicate(err: sqlx::Error, what: String) -> ServiceError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => ServiceError::Conflict(what),
        _ => ServiceError::Database(err),
    }
}

// ─────────────────────────────────────────────────────────
// Contracts
// ─────────────────────────────────────────────────────────

pub async fn insert_contract(pool: &SqlitePool, id: &str, contract: &Contract) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO contracts (id, original_amount, advance_percentage, guarantee_fund_percentage)
        VALUES (?1, ?2, ?3, ?4)
        "#,
    )
    .bind(id)
    .bind(contract.original_amount().to_string())
    .bind(contract.advance_percentage().to_string())
    .bind(contract.guarantee_fund_percentage().to_string())
    .execute(pool)
    .await
    .map_err(|e| conflict_on_duplicate(e, format!("contract `{id}` already exists")))?;
    Ok(())
}

pub async fn get_contract(pool: &SqlitePool, id: &str) -> Result<Option<ContractRecord>> {
    let row = sqlx::query_as::<_, ContractRecord>(
        r#"
        SELECT id, original_amount, advance_percentage, guarantee_fund_percentage, created_at
        FROM   contracts
        WHERE  id = ?1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

// ─────────────────────────────────────────────────────────
// Movements
// ─────────────────────────────────────────────────────────

/// All movements of a contract in sequence order.
pub async fn get_movements(pool: &SqlitePool, contract_id: &str) -> Result<Vec<MovementRecord>> {
    let rows = sqlx::query_as::<_, MovementRecord>(
        r#"
        SELECT contract_id, sequence_number, kind, date, description, amount,
               submitted_paid_amount, paid_amount, advance_amortization,
               guarantee_fund_retained, net_payable, advance_balance,
               contract_pending_balance, contract_current_base,
               guarantee_fund_accumulated, created_at
        FROM   movements
        WHERE  contract_id = ?1
        ORDER  BY sequence_number ASC
        "#,
    )
    .bind(contract_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Persist an applied movement with the state it produced.
///
/// The row is written only while the stored log still ends in `prior`: the
/// previous movement must exist with the balances the new state was folded
/// from. A log truncated or rewritten since `prior` was loaded, or a second
/// writer racing for the same sequence number, gets [`ServiceError::Conflict`].
pub async fn insert_entry(
    pool: &SqlitePool,
    contract_id: &str,
    prior: &LedgerState,
    entry: &LedgerEntry,
) -> Result<()> {
    let movement = &entry.movement;
    let state = &entry.state;
    let conflict = || {
        format!(
            "movement {} of contract `{contract_id}` was based on a stale ledger",
            movement.sequence_number
        )
    };
    let inserted = sqlx::query(
        r#"
        INSERT INTO movements
            (contract_id, sequence_number, kind, date, description, amount,
             submitted_paid_amount, paid_amount, advance_amortization,
             guarantee_fund_retained, net_payable, advance_balance,
             contract_pending_balance, contract_current_base, guarantee_fund_accumulated)
        SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14
        WHERE  (SELECT COUNT(*) FROM movements WHERE contract_id = ?1) = ?15
          AND  (?15 = 0 OR EXISTS (
                   SELECT 1
                   FROM   movements
                   WHERE  contract_id = ?1
                     AND  sequence_number = ?15
                     AND  advance_balance = ?16
                     AND  contract_pending_balance = ?17
                     AND  contract_current_base = ?18
                     AND  guarantee_fund_accumulated = ?19))
        "#,
    )
    .bind(contract_id)
    .bind(i64::from(movement.sequence_number))
    .bind(movement.kind.as_str())
    .bind(movement.date.to_string())
    .bind(&movement.description)
    .bind(movement.amount.to_string())
    .bind(movement.paid_amount.to_string())
    .bind(state.advance_amortization.to_string())
    .bind(state.guarantee_fund_retained.to_string())
    .bind(state.net_payable.to_string())
    .bind(state.advance_balance.to_string())
    .bind(state.contract_pending_balance.to_string())
    .bind(state.contract_current_base.to_string())
    .bind(state.guarantee_fund_accumulated.to_string())
    .bind(i64::from(prior.sequence_number))
    .bind(prior.advance_balance.to_string())
    .bind(prior.contract_pending_balance.to_string())
    .bind(prior.contract_current_base.to_string())
    .bind(prior.guarantee_fund_accumulated.to_string())
    .execute(pool)
    .await
    .map_err(|e| conflict_on_duplicate(e, conflict()))?
    .rows_affected();
    if inserted == 0 {
        return Err(ServiceError::Conflict(conflict()));
    }
    Ok(())
}

/// Returns `false` when no such movement exists.
pub async fn update_paid_amount(
    pool: &SqlitePool,
    contract_id: &str,
    sequence_number: u32,
    paid_amount: Decimal,
) -> Result<bool> {
    let affected = sqlx::query(
        "UPDATE movements SET paid_amount = ?1 WHERE contract_id = ?2 AND sequence_number = ?3",
    )
    .bind(paid_amount.to_string())
    .bind(contract_id)
    .bind(i64::from(sequence_number))
    .execute(pool)
    .await?
    .rows_affected();
    Ok(affected > 0)
}

/// Delete movement `sequence_number` and every later one, provided the
/// stored log still ends in `current`. Otherwise [`ServiceError::Conflict`].
pub async fn delete_movements_from(
    pool: &SqlitePool,
    contract_id: &str,
    sequence_number: u32,
    current: &LedgerState,
) -> Result<u64> {
    let affected = sqlx::query(
        r#"
        DELETE FROM movements
        WHERE  contract_id = ?1
          AND  sequence_number >= ?2
          AND  (SELECT COUNT(*) FROM movements WHERE contract_id = ?1) = ?3
          AND  EXISTS (
                   SELECT 1
                   FROM   movements
                   WHERE  contract_id = ?1
                     AND  sequence_number = ?3
                     AND  advance_balance = ?4
                     AND  contract_pending_balance = ?5
                     AND  contract_current_base = ?6
                     AND  guarantee_fund_accumulated = ?7)
        "#,
    )
    .bind(contract_id)
    .bind(i64::from(sequence_number))
    .bind(i64::from(current.sequence_number))
    .bind(current.advance_balance.to_string())
    .bind(current.contract_pending_balance.to_string())
    .bind(current.contract_current_base.to_string())
    .bind(current.guarantee_fund_accumulated.to_string())
    .execute(pool)
    .await?
    .rows_affected();
    if affected == 0 {
        return Err(ServiceError::Conflict(format!(
            "movements of contract `{contract_id}` changed since they were loaded"
        )));
    }
    Ok(affected)
}

// ─────────────────────────────────────────────────────────
// Expenses
// ─────────────────────────────────────────────────────────

pub async fn insert_expense(pool: &SqlitePool, payment: &ExpensePayment) -> Result<i64> {
    let id = sqlx::query(
        "INSERT INTO expense_payments (project_id, date, amount, category) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(&payment.project_id)
    .bind(payment.date.to_string())
    .bind(payment.amount.to_string())
    .bind(payment.category.as_str())
    .execute(pool)
    .await?
    .last_insert_rowid();
    Ok(id)
}

/// Every payment dated inside `period`, optionally for one project only.
pub async fn get_expenses(
    pool: &SqlitePool,
    period: Period,
    project_id: Option<&str>,
) -> Result<Vec<ExpenseRecord>> {
    let rows = sqlx::query_as::<_, ExpenseRecord>(
        r#"
        SELECT id, project_id, date, amount, category, created_at
        FROM   expense_payments
        WHERE  date >= ?1 AND date < ?2
          AND  (?3 IS NULL OR project_id = ?3)
        ORDER  BY date ASC, id ASC
        "#,
    )
    .bind(period.first_day().to_string())
    .bind(period.next().first_day().to_string())
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ─────────────────────────────────────────────────────────
// Indirect costs and allocations
// ─────────────────────────────────────────────────────────

pub async fn set_indirect_cost(pool: &SqlitePool, period: Period, amount: Decimal) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO indirect_costs (period, amount) VALUES (?1, ?2)
        ON CONFLICT (period) DO UPDATE
            SET amount = excluded.amount, updated_at = strftime('%s', 'now')
        "#,
    )
    .bind(period.to_string())
    .bind(amount.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_indirect_cost(pool: &SqlitePool, period: Period) -> Result<Option<Decimal>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT amount FROM indirect_costs WHERE period = ?1")
        .bind(period.to_string())
        .fetch_optional(pool)
        .await?;
    row.map(|(raw,)| records::decimal(&raw, "indirect_costs.amount"))
        .transpose()
}

/// Replace the saved allocation of `period` with `results`.
pub async fn save_allocation(
    pool: &SqlitePool,
    period: Period,
    results: &[AllocationResult],
) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM allocations WHERE period = ?1")
        .bind(period.to_string())
        .execute(&mut *tx)
        .await?;
    for result in results {
        sqlx::query(
            r#"
            INSERT INTO allocations
                (period, project_id, direct_expense_total, proportion,
                 indirect_cost_assigned, total_with_indirect)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(period.to_string())
        .bind(&result.project_id)
        .bind(result.direct_expense_total.to_string())
        .bind(result.proportion.to_string())
        .bind(result.indirect_cost_assigned.to_string())
        .bind(result.total_with_indirect.to_string())
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn get_allocation(pool: &SqlitePool, period: Period) -> Result<Vec<AllocationRecord>> {
    let rows = sqlx::query_as::<_, AllocationRecord>(
        r#"
        SELECT period, project_id, direct_expense_total, proportion,
               indirect_cost_assigned, total_with_indirect, computed_at
        FROM   allocations
        WHERE  period = ?1
        ORDER  BY project_id ASC
        "#,
    )
    .bind(period.to_string())
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use contract_ledger::{ContractTerms, ExpenseCategory};
    use rust_decimal_macros::dec;

    async fn memory_pool() -> SqlitePool {
        connect("sqlite::memory:", 1).await.unwrap()
    }

    fn contract() -> Contract {
        Contract::new(ContractTerms {
            original_amount: dec!(1000000),
            advance_percentage: dec!(10),
            guarantee_fund_percentage: dec!(3),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn duplicate_contract_is_a_conflict() {
        let pool = memory_pool().await;
        insert_contract(&pool, "C-1", &contract()).await.unwrap();
        let err = insert_contract(&pool, "C-1", &contract()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let stored = get_contract(&pool, "C-1").await.unwrap().unwrap();
        assert_eq!(stored.to_contract().unwrap(), contract());
        assert!(get_contract(&pool, "C-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expenses_are_filtered_by_period_and_project() {
        let pool = memory_pool().await;
        let payment = |project: &str, day: u32, month: u32| ExpensePayment {
            project_id: project.into(),
            date: NaiveDate::from_ymd_opt(2025, month, day).unwrap(),
            amount: dec!(100),
            category: ExpenseCategory::Payroll,
        };
        for p in [
            payment("A", 1, 10),
            payment("A", 31, 10),
            payment("A", 1, 11),
            payment("B", 15, 10),
        ] {
            insert_expense(&pool, &p).await.unwrap();
        }

        let october: Period = "2025-10".parse().unwrap();
        assert_eq!(get_expenses(&pool, october, None).await.unwrap().len(), 3);
        assert_eq!(get_expenses(&pool, october, Some("A")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn indirect_cost_upserts() {
        let pool = memory_pool().await;
        let period: Period = "2025-10".parse().unwrap();
        assert_eq!(get_indirect_cost(&pool, period).await.unwrap(), None);
        set_indirect_cost(&pool, period, dec!(100)).await.unwrap();
        set_indirect_cost(&pool, period, dec!(250.50)).await.unwrap();
        assert_eq!(get_indirect_cost(&pool, period).await.unwrap(), Some(dec!(250.50)));
    }
}
