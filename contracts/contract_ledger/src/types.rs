//! # Types
//!
//! Records that cross the ledger boundary.
//!
//! ## Terms / State split
//!
//! A contract is described by two kinds of record:
//!
//! - [`Contract`]: written once at signing; never mutated. Its advance total
//!   and guarantee-fund cap are fixed from the *original* amount, whatever
//!   additions or reductions come later.
//! - [`LedgerState`]: one snapshot per applied movement, produced only by
//!   folding movements in order.
//!
//! ## Movement lifecycle
//!
//! ```text
//! MovementInput ──validate──► ContractMovement ──compute──► MovementEffect
//!                                                                │
//!                               LedgerState(N) ◄──apply_to───────┘
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::{percent_of, round_money};
use crate::{Error, Result};

// ─────────────────────────────────────────────────────────
// Contract
// ─────────────────────────────────────────────────────────

/// Contract definition as submitted by a caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractTerms {
    /// Base value at signing.
    pub original_amount: Decimal,
    /// Share of `original_amount` advanced up front, 0–100.
    pub advance_percentage: Decimal,
    /// Retention rate per estimate, 0–100.
    pub guarantee_fund_percentage: Decimal,
}

/// Validated, immutable contract parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ContractTerms", into = "ContractTerms")]
pub struct Contract {
    terms: ContractTerms,
    advance_total: Decimal,
    guarantee_fund_cap: Decimal,
}

impl Contract {
    pub fn new(terms: ContractTerms) -> Result<Self> {
        if terms.original_amount <= Decimal::ZERO {
            return Err(Error::InvalidContractTerms(format!(
                "original amount must be positive, got {}",
                terms.original_amount
            )));
        }
        if terms.original_amount > crate::money::MAX_AMOUNT {
            return Err(Error::InvalidContractTerms(format!(
                "original amount {} exceeds {}",
                terms.original_amount,
                crate::money::MAX_AMOUNT
            )));
        }
        check_percentage("advance percentage", terms.advance_percentage)?;
        check_percentage("guarantee fund percentage", terms.guarantee_fund_percentage)?;

        let advance_total = round_money(percent_of(terms.original_amount, terms.advance_percentage));
        let guarantee_fund_cap = round_money(percent_of(
            terms.original_amount,
            terms.guarantee_fund_percentage,
        ));
        Ok(Contract {
            terms,
            advance_total,
            guarantee_fund_cap,
        })
    }

    pub fn terms(&self) -> &ContractTerms {
        &self.terms
    }

    pub fn original_amount(&self) -> Decimal {
        self.terms.original_amount
    }

    pub fn advance_percentage(&self) -> Decimal {
        self.terms.advance_percentage
    }

    pub fn guarantee_fund_percentage(&self) -> Decimal {
        self.terms.guarantee_fund_percentage
    }

    /// Advance paid to the contractor at signing.
    pub fn advance_total(&self) -> Decimal {
        self.advance_total
    }

    /// Lifetime ceiling on guarantee-fund retention.
    pub fn guarantee_fund_cap(&self) -> Decimal {
        self.guarantee_fund_cap
    }
}

fn check_percentage(name: &str, value: Decimal) -> Result<()> {
    if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
        return Err(Error::InvalidContractTerms(format!(
            "{name} must be within 0..=100, got {value}"
        )));
    }
    Ok(())
}

impl TryFrom<ContractTerms> for Contract {
    type Error = Error;

    fn try_from(terms: ContractTerms) -> Result<Self> {
        Contract::new(terms)
    }
}

impl From<Contract> for ContractTerms {
    fn from(contract: Contract) -> Self {
        contract.terms
    }
}

// ─────────────────────────────────────────────────────────
// Movements
// ─────────────────────────────────────────────────────────

/// The three movement kinds a contract ledger accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Periodic certification of completed work; billable.
    Estimate,
    /// Increase of the contract's total value.
    Addition,
    /// Decrease of the contract's total value.
    Reduction,
}

impl MovementKind {
    /// Short identifier suitable for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Estimate => "estimate",
            Self::Addition => "addition",
            Self::Reduction => "reduction",
        }
    }

    /// Display label used in movement titles.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Estimate => "Estimate",
            Self::Addition => "Addition",
            Self::Reduction => "Reduction",
        }
    }

    /// Only estimates generate something to pay.
    pub fn is_billable(&self) -> bool {
        matches!(self, Self::Estimate)
    }
}

impl FromStr for MovementKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "estimate" | "estimacion" | "estimación" => Ok(Self::Estimate),
            "addition" | "aditiva" => Ok(Self::Addition),
            "reduction" | "deductiva" => Ok(Self::Reduction),
            _ => Err(Error::UnknownKind(s.to_string())),
        }
    }
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An amount as it arrives from outside: a JSON number or a decimal string.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawAmount {
    Number(f64),
    Text(String),
}

impl RawAmount {
    /// Convert to a decimal. Non-finite or unparseable values are rejected.
    pub fn to_decimal(&self) -> Result<Decimal> {
        match self {
            RawAmount::Number(n) => Decimal::from_f64(*n)
                .filter(|_| n.is_finite())
                .ok_or_else(|| Error::InvalidAmount(format!("{n} is not a finite amount"))),
            RawAmount::Text(s) => Decimal::from_str(s.trim())
                .map_err(|_| Error::InvalidAmount(format!("`{s}` is not a decimal amount"))),
        }
    }
}

impl From<Decimal> for RawAmount {
    fn from(value: Decimal) -> Self {
        RawAmount::Text(value.to_string())
    }
}

/// A movement as submitted by a form or import job, before validation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MovementInput {
    pub sequence_number: u32,
    pub kind: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub description: String,
    pub amount: RawAmount,
    #[serde(default)]
    pub paid_amount: Option<RawAmount>,
}

/// One validated entry of a contract ledger. Immutable once recorded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractMovement {
    pub sequence_number: u32,
    pub kind: MovementKind,
    pub date: NaiveDate,
    pub description: String,
    /// Certified work for estimates; magnitude of the change otherwise.
    pub amount: Decimal,
    /// Amount already paid when the movement was submitted.
    #[serde(default)]
    pub paid_amount: Decimal,
}

impl ContractMovement {
    /// `"<Label> <n> - <description>"`, without repeating an existing prefix.
    pub fn title(&self) -> String {
        let prefix = format!("{} {} -", self.kind.label(), self.sequence_number);
        if self.description.starts_with(&prefix) {
            self.description.clone()
        } else if self.description.is_empty() {
            prefix.trim_end_matches(" -").to_string()
        } else {
            format!("{prefix} {}", self.description)
        }
    }
}

// ─────────────────────────────────────────────────────────
// Policy
// ─────────────────────────────────────────────────────────

/// What to do when a movement would consume more than the pending balance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrunPolicy {
    #[default]
    Reject,
    Allow,
}

impl FromStr for OverrunPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "allow" => Ok(Self::Allow),
            other => Err(format!("unknown overrun policy `{other}`")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerPolicy {
    pub reduction_overrun: OverrunPolicy,
    pub estimate_overrun: OverrunPolicy,
}

// ─────────────────────────────────────────────────────────
// State
// ─────────────────────────────────────────────────────────

/// Running snapshot after applying movement `sequence_number`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    /// `0` for the opening state.
    pub sequence_number: u32,
    pub advance_balance: Decimal,
    pub contract_pending_balance: Decimal,
    pub contract_current_base: Decimal,
    pub guarantee_fund_accumulated: Decimal,
    pub advance_amortization: Decimal,
    pub guarantee_fund_retained: Decimal,
    pub net_payable: Decimal,
    pub balance_to_pay: Decimal,
}

impl LedgerState {
    /// State of a freshly signed contract, before any movement.
    pub fn opening(contract: &Contract) -> Self {
        LedgerState {
            sequence_number: 0,
            advance_balance: contract.advance_total(),
            contract_pending_balance: contract.original_amount(),
            contract_current_base: contract.original_amount(),
            guarantee_fund_accumulated: Decimal::ZERO,
            advance_amortization: Decimal::ZERO,
            guarantee_fund_retained: Decimal::ZERO,
            net_payable: Decimal::ZERO,
            balance_to_pay: Decimal::ZERO,
        }
    }
}

/// Derived values and state deltas for one movement.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementEffect {
    pub advance_amortization: Decimal,
    pub guarantee_fund_retained: Decimal,
    pub net_payable: Decimal,
    pub balance_to_pay: Decimal,
    pub advance_balance_delta: Decimal,
    pub pending_delta: Decimal,
    pub base_delta: Decimal,
    pub guarantee_fund_delta: Decimal,
}

impl MovementEffect {
    /// Fold this effect into `prior`, producing the state for `sequence_number`.
    pub fn apply_to(&self, prior: &LedgerState, sequence_number: u32) -> LedgerState {
        LedgerState {
            sequence_number,
            advance_balance: prior.advance_balance + self.advance_balance_delta,
            contract_pending_balance: prior.contract_pending_balance + self.pending_delta,
            contract_current_base: prior.contract_current_base + self.base_delta,
            guarantee_fund_accumulated: prior.guarantee_fund_accumulated
                + self.guarantee_fund_delta,
            advance_amortization: self.advance_amortization,
            guarantee_fund_retained: self.guarantee_fund_retained,
            net_payable: self.net_payable,
            balance_to_pay: self.balance_to_pay,
        }
    }
}

/// A recorded movement together with the state it produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub movement: ContractMovement,
    pub state: LedgerState,
}

// ─────────────────────────────────────────────────────────
// Reporting shapes
// ─────────────────────────────────────────────────────────

/// One line of the ledger report, with the paid annotation merged in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub sequence_number: u32,
    pub kind: MovementKind,
    pub date: NaiveDate,
    pub description: String,
    pub title: String,
    pub amount: Decimal,
    pub advance_amortization: Decimal,
    pub guarantee_fund_retained: Decimal,
    pub advance_balance: Decimal,
    pub paid_amount: Decimal,
    pub balance_to_pay: Decimal,
    pub contract_pending_balance: Decimal,
    pub contract_current_base: Decimal,
}

/// Column sums plus the latest point-in-time balances.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTotals {
    pub amount: Decimal,
    pub estimated_amount: Decimal,
    pub advance_amortization: Decimal,
    pub guarantee_fund_retained: Decimal,
    pub paid_amount: Decimal,
    pub balance_to_pay: Decimal,
    pub advance_balance: Decimal,
    pub contract_pending_balance: Decimal,
}
