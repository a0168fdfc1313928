//! # Contract Ledger Engine
//!
//! Running financial state for construction contracts, plus the proportional
//! split of shared overhead across active projects.
//!
//! | Concern            | Entry Point(s)                                         |
//! |--------------------|--------------------------------------------------------|
//! | Contract terms     | [`Contract::new`]                                      |
//! | Validation         | [`validation::validate`], [`validation::validate_input`] |
//! | Per-movement math  | [`amortization::compute_movement_effect`]             |
//! | Ledger             | [`ContractLedger::apply_movement`], `history`, `totals` |
//! | Corrections        | [`ContractLedger::truncate_from`], [`ContractLedger::amend`] |
//! | Overhead           | [`allocation::allocate`], [`allocation::split_across_weeks`] |
//! | Weekly buckets     | [`weekly::group_by_week`]                              |
//!
//! ## Architecture
//!
//! Everything here is a pure function of its inputs. A [`ContractLedger`]
//! owns the append-only movement log and folds each accepted movement into a
//! new immutable [`LedgerState`]; nothing edits a past state in place.
//! Persistence, transport and presentation belong to the caller.
//!
//! All money is [`rust_decimal::Decimal`]; derived amounts are rounded to
//! cents (see [`money`]).

use rust_decimal::Decimal;
use thiserror::Error;

pub mod allocation;
pub mod amortization;
pub mod invariants;
pub mod ledger;
pub mod money;
pub mod period;
pub mod types;
pub mod validation;
pub mod weekly;

#[cfg(test)]
mod test_allocation;
#[cfg(test)]
mod test_ledger;

pub use allocation::{AllocationResult, AllocationSummary, ProjectExpensePeriod, WeeklyAllocation};
pub use ledger::ContractLedger;
pub use period::Period;
pub use types::{
    Contract, ContractMovement, ContractTerms, LedgerEntry, LedgerPolicy, LedgerRow, LedgerState,
    LedgerTotals, MovementEffect, MovementInput, MovementKind, OverrunPolicy, RawAmount,
};
pub use weekly::{ExpenseCategory, ExpensePayment, WeeklyExpense};

/// Every way the engine can refuse an input.
///
/// Errors are detected before any state is touched: a failed call leaves the
/// ledger exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("movement {got} is out of sequence, expected {expected}")]
    OutOfSequence { expected: u32, got: u32 },

    #[error("unknown movement kind `{0}`")]
    UnknownKind(String),

    #[error("reduction of {amount} exceeds pending contract balance {pending}")]
    ReductionExceedsPending { amount: Decimal, pending: Decimal },

    #[error("estimate of {amount} exceeds pending contract balance {pending}")]
    EstimateExceedsPending { amount: Decimal, pending: Decimal },

    #[error("invalid contract terms: {0}")]
    InvalidContractTerms(String),

    #[error("current contract base is {0}; cannot amortize against it")]
    DegenerateContractBase(Decimal),

    #[error("movement {0} not found")]
    MovementNotFound(u32),

    #[error("invalid period `{0}`, expected YYYY-MM")]
    InvalidPeriod(String),

    #[error("expense period {got} does not match allocation period {expected}")]
    PeriodMismatch { expected: Period, got: Period },

    #[error("project `{0}` appears more than once")]
    DuplicateProject(String),
}

impl Error {
    /// Stable numeric code, safe to expose to API clients.
    pub fn code(&self) -> u32 {
        match self {
            Error::InvalidAmount(_) => 1,
            Error::OutOfSequence { .. } => 2,
            Error::UnknownKind(_) => 3,
            Error::ReductionExceedsPending { .. } => 4,
            Error::EstimateExceedsPending { .. } => 5,
            Error::InvalidContractTerms(_) => 6,
            Error::DegenerateContractBase(_) => 7,
            Error::MovementNotFound(_) => 8,
            Error::InvalidPeriod(_) => 9,
            Error::PeriodMismatch { .. } => 10,
            Error::DuplicateProject(_) => 11,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
