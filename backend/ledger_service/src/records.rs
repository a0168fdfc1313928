//! Row shapes stored in / read from the database, and their conversion to
//! engine types.
//!
//! Money columns are TEXT; a value that no longer parses is reported as
//! [`ServiceError::Corrupt`] rather than defaulted.

use std::str::FromStr;

use chrono::NaiveDate;
use contract_ledger::{
    AllocationResult, Contract, ContractMovement, ContractTerms, ExpenseCategory, ExpensePayment,
    LedgerState, MovementKind, Period,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, ServiceError};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ContractRecord {
    pub id: String,
    pub original_amount: String,
    pub advance_percentage: String,
    pub guarantee_fund_percentage: String,
    pub created_at: i64,
}

impl ContractRecord {
    pub fn to_contract(&self) -> Result<Contract> {
        let terms = ContractTerms {
            original_amount: decimal(&self.original_amount, "original_amount")?,
            advance_percentage: decimal(&self.advance_percentage, "advance_percentage")?,
            guarantee_fund_percentage: decimal(
                &self.guarantee_fund_percentage,
                "guarantee_fund_percentage",
            )?,
        };
        Contract::new(terms).map_err(|e| ServiceError::Corrupt(format!("contract {}: {e}", self.id)))
    }
}

/// A movement row: the submitted movement, its paid annotation and the
/// state it produced when it was applied.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MovementRecord {
    pub contract_id: String,
    pub sequence_number: i64,
    pub kind: String,
    pub date: String,
    pub description: String,
    pub amount: String,
    pub submitted_paid_amount: String,
    pub paid_amount: String,
    pub advance_amortization: String,
    pub guarantee_fund_retained: String,
    pub net_payable: String,
    pub advance_balance: String,
    pub contract_pending_balance: String,
    pub contract_current_base: String,
    pub guarantee_fund_accumulated: String,
    pub created_at: i64,
}

impl MovementRecord {
    /// The movement exactly as it was submitted.
    pub fn to_movement(&self) -> Result<ContractMovement> {
        let sequence_number = u32::try_from(self.sequence_number).map_err(|_| {
            ServiceError::Corrupt(format!("sequence number {}", self.sequence_number))
        })?;
        let kind = MovementKind::from_str(&self.kind)
            .map_err(|e| ServiceError::Corrupt(format!("movement {sequence_number}: {e}")))?;
        Ok(ContractMovement {
            sequence_number,
            kind,
            date: date(&self.date)?,
            description: self.description.clone(),
            amount: decimal(&self.amount, "amount")?,
            paid_amount: decimal(&self.submitted_paid_amount, "submitted_paid_amount")?,
        })
    }

    pub fn paid(&self) -> Result<Decimal> {
        decimal(&self.paid_amount, "paid_amount")
    }

    /// Whether the persisted derived values equal `state`.
    pub fn matches_state(&self, state: &LedgerState) -> Result<bool> {
        Ok(decimal(&self.advance_amortization, "advance_amortization")? == state.advance_amortization
            && decimal(&self.guarantee_fund_retained, "guarantee_fund_retained")?
                == state.guarantee_fund_retained
            && decimal(&self.net_payable, "net_payable")? == state.net_payable
            && decimal(&self.advance_balance, "advance_balance")? == state.advance_balance
            && decimal(&self.contract_pending_balance, "contract_pending_balance")?
                == state.contract_pending_balance
            && decimal(&self.contract_current_base, "contract_current_base")?
                == state.contract_current_base
            && decimal(&self.guarantee_fund_accumulated, "guarantee_fund_accumulated")?
                == state.guarantee_fund_accumulated)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ExpenseRecord {
    pub id: i64,
    pub project_id: String,
    pub date: String,
    pub amount: String,
    pub category: String,
    pub created_at: i64,
}

impl ExpenseRecord {
    pub fn to_payment(&self) -> Result<ExpensePayment> {
        let category = ExpenseCategory::from_str_opt(&self.category).ok_or_else(|| {
            ServiceError::Corrupt(format!("expense {}: category `{}`", self.id, self.category))
        })?;
        Ok(ExpensePayment {
            project_id: self.project_id.clone(),
            date: date(&self.date)?,
            amount: decimal(&self.amount, "amount")?,
            category,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AllocationRecord {
    pub period: String,
    pub project_id: String,
    pub direct_expense_total: String,
    pub proportion: String,
    pub indirect_cost_assigned: String,
    pub total_with_indirect: String,
    pub computed_at: i64,
}

impl AllocationRecord {
    pub fn to_result(&self) -> Result<AllocationResult> {
        Ok(AllocationResult {
            project_id: self.project_id.clone(),
            period: Period::from_str(&self.period)
                .map_err(|e| ServiceError::Corrupt(e.to_string()))?,
            direct_expense_total: decimal(&self.direct_expense_total, "direct_expense_total")?,
            proportion: decimal(&self.proportion, "proportion")?,
            indirect_cost_assigned: decimal(&self.indirect_cost_assigned, "indirect_cost_assigned")?,
            total_with_indirect: decimal(&self.total_with_indirect, "total_with_indirect")?,
        })
    }
}

pub fn decimal(raw: &str, column: &str) -> Result<Decimal> {
    Decimal::from_str(raw)
        .map_err(|_| ServiceError::Corrupt(format!("{column} is not a decimal: `{raw}`")))
}

pub fn date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ServiceError::Corrupt(format!("date is not YYYY-MM-DD: `{raw}`")))
}
