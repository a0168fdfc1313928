//! Ledger orchestration: rebuild a contract's ledger from the database,
//! apply a change through the engine, persist the outcome.
//!
//! The database only ever receives values the engine produced.

use contract_ledger::{invariants, ContractLedger, LedgerEntry, LedgerPolicy, MovementInput};
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db;
use crate::errors::{Result, ServiceError};

/// Replay the stored movements of `contract_id`, then restore paid
/// annotations.
pub async fn load_ledger(
    pool: &SqlitePool,
    contract_id: &str,
    policy: LedgerPolicy,
) -> Result<ContractLedger> {
    let contract = db::get_contract(pool, contract_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("contract `{contract_id}`")))?
        .to_contract()?;

    let records = db::get_movements(pool, contract_id).await?;
    let movements = records
        .iter()
        .map(|r| r.to_movement())
        .collect::<Result<Vec<_>>>()?;
    let mut ledger = ContractLedger::replay(contract, policy, movements).map_err(|e| {
        ServiceError::Corrupt(format!("stored movements of `{contract_id}` do not replay: {e}"))
    })?;
    for (record, entry) in records.iter().zip(ledger.history().to_vec()) {
        if !record.matches_state(&entry.state)? {
            warn!(
                "Stored state of movement {} of `{contract_id}` differs from its replay",
                entry.movement.sequence_number
            );
        }
        ledger.set_paid_amount(entry.movement.sequence_number, record.paid()?)?;
    }

    if let Err(violation) = invariants::check_ledger(&ledger) {
        warn!("Ledger `{contract_id}` violates an invariant: {violation}");
    }
    Ok(ledger)
}

/// Validate and apply one raw movement, then persist it.
pub async fn submit_movement(
    pool: &SqlitePool,
    contract_id: &str,
    policy: LedgerPolicy,
    input: &MovementInput,
) -> Result<LedgerEntry> {
    let mut ledger = load_ledger(pool, contract_id, policy).await?;
    let prior = ledger.current_state().clone();
    ledger.apply_input(input)?;
    let entry = ledger
        .history()
        .last()
        .cloned()
        .ok_or_else(|| ServiceError::Corrupt("applied movement missing from history".into()))?;

    db::insert_entry(pool, contract_id, &prior, &entry).await?;
    info!(
        "Recorded {} {} for contract `{contract_id}`",
        entry.movement.kind.label(),
        entry.movement.sequence_number
    );
    Ok(entry)
}

/// Drop movement `sequence_number` and everything after it so the tail can
/// be resubmitted.
pub async fn truncate_movements(
    pool: &SqlitePool,
    contract_id: &str,
    policy: LedgerPolicy,
    sequence_number: u32,
) -> Result<ContractLedger> {
    let mut ledger = load_ledger(pool, contract_id, policy).await?;
    let current = ledger.current_state().clone();
    let removed = ledger.truncate_from(sequence_number)?;
    db::delete_movements_from(pool, contract_id, sequence_number, &current).await?;
    info!(
        "Truncated {} movement(s) of contract `{contract_id}` from {sequence_number}",
        removed.len()
    );
    Ok(ledger)
}

pub async fn set_paid_amount(
    pool: &SqlitePool,
    contract_id: &str,
    policy: LedgerPolicy,
    sequence_number: u32,
    paid_amount: Decimal,
) -> Result<ContractLedger> {
    let mut ledger = load_ledger(pool, contract_id, policy).await?;
    ledger.set_paid_amount(sequence_number, paid_amount)?;
    if !db::update_paid_amount(pool, contract_id, sequence_number, paid_amount).await? {
        return Err(contract_ledger::Error::MovementNotFound(sequence_number).into());
    }
    Ok(ledger)
}
