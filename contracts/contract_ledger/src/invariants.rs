//! Checkers for the properties every ledger and allocation must satisfy.
//!
//! They return a [`InvariantViolation`] instead of panicking so a service
//! can log a broken ledger rebuilt from storage; tests unwrap them.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::allocation::AllocationResult;
use crate::ledger::ContractLedger;
use crate::types::MovementKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("advance balance is negative ({balance}) after movement {sequence}")]
    NegativeAdvanceBalance { sequence: u32, balance: Decimal },

    #[error("advance balance grew from {before} to {after} at movement {sequence}")]
    AdvanceBalanceIncreased {
        sequence: u32,
        before: Decimal,
        after: Decimal,
    },

    #[error("guarantee fund {accumulated} exceeds cap {cap} after movement {sequence}")]
    GuaranteeCapExceeded {
        sequence: u32,
        accumulated: Decimal,
        cap: Decimal,
    },

    #[error("pending balance {pending} != base {base} - certified {certified} after movement {sequence}")]
    PendingNotConserved {
        sequence: u32,
        pending: Decimal,
        base: Decimal,
        certified: Decimal,
    },

    #[error("assigned indirect cost {assigned} != total {expected}")]
    AllocationNotConserved { assigned: Decimal, expected: Decimal },

    #[error("project `{0}` got indirect cost although total direct spend is zero")]
    AllocationWithoutDirectSpend(String),
}

pub type Checked = Result<(), InvariantViolation>;

/// Advance balance never negative and never growing.
pub fn check_advance_depletion(ledger: &ContractLedger) -> Checked {
    let mut before = ledger.opening_state().advance_balance;
    for entry in ledger.history() {
        let state = &entry.state;
        if state.advance_balance < Decimal::ZERO {
            return Err(InvariantViolation::NegativeAdvanceBalance {
                sequence: state.sequence_number,
                balance: state.advance_balance,
            });
        }
        if state.advance_balance > before {
            return Err(InvariantViolation::AdvanceBalanceIncreased {
                sequence: state.sequence_number,
                before,
                after: state.advance_balance,
            });
        }
        before = state.advance_balance;
    }
    Ok(())
}

/// Accumulated retention never above the contract's cap.
pub fn check_guarantee_cap(ledger: &ContractLedger) -> Checked {
    let cap = ledger.contract().guarantee_fund_cap();
    for entry in ledger.history() {
        let accumulated = entry.state.guarantee_fund_accumulated;
        if accumulated > cap {
            return Err(InvariantViolation::GuaranteeCapExceeded {
                sequence: entry.state.sequence_number,
                accumulated,
                cap,
            });
        }
    }
    Ok(())
}

/// Pending balance equals current base minus everything certified so far.
pub fn check_pending_conservation(ledger: &ContractLedger) -> Checked {
    let mut certified = Decimal::ZERO;
    for entry in ledger.history() {
        if entry.movement.kind == MovementKind::Estimate {
            certified += entry.movement.amount;
        }
        let state = &entry.state;
        if state.contract_pending_balance != state.contract_current_base - certified {
            return Err(InvariantViolation::PendingNotConserved {
                sequence: state.sequence_number,
                pending: state.contract_pending_balance,
                base: state.contract_current_base,
                certified,
            });
        }
    }
    Ok(())
}

/// Run every ledger check.
pub fn check_ledger(ledger: &ContractLedger) -> Checked {
    check_advance_depletion(ledger)?;
    check_guarantee_cap(ledger)?;
    check_pending_conservation(ledger)
}

/// Assignments sum to the indirect total, or are all zero without direct spend.
pub fn check_allocation(results: &[AllocationResult], indirect_cost_total: Decimal) -> Checked {
    let total_direct: Decimal = results.iter().map(|r| r.direct_expense_total).sum();
    if total_direct.is_zero() {
        if let Some(r) = results.iter().find(|r| !r.indirect_cost_assigned.is_zero()) {
            return Err(InvariantViolation::AllocationWithoutDirectSpend(
                r.project_id.clone(),
            ));
        }
        return Ok(());
    }
    let assigned: Decimal = results.iter().map(|r| r.indirect_cost_assigned).sum();
    if assigned != indirect_cost_total {
        return Err(InvariantViolation::AllocationNotConserved {
            assigned,
            expected: indirect_cost_total,
        });
    }
    Ok(())
}
