//! # Contract Ledger
//!
//! Append-only movement log for one contract, with one [`LedgerState`] per
//! applied movement.
//!
//! [`ContractLedger::apply_movement`] is the only way forward: it validates,
//! computes the effect against the current state, and appends. Correcting
//! history means truncating at the first bad movement and replaying from
//! there ([`ContractLedger::amend`]); past states are never edited.
//!
//! Paid amounts are an annotation kept beside the fold. Changing one never
//! changes amortization or retention; it only affects the reported
//! `balance_to_pay`.
//!
//! A ledger is single-writer. Callers serialize submissions per contract;
//! ledgers for different contracts are independent.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::amortization::compute_movement_effect;
use crate::types::{
    Contract, ContractMovement, LedgerEntry, LedgerPolicy, LedgerRow, LedgerState, LedgerTotals,
    MovementInput, MovementKind,
};
use crate::validation::{validate, validate_input};
use crate::{Error, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractLedger {
    contract: Contract,
    policy: LedgerPolicy,
    opening: LedgerState,
    entries: Vec<LedgerEntry>,
    paid: BTreeMap<u32, Decimal>,
}

impl ContractLedger {
    pub fn new(contract: Contract, policy: LedgerPolicy) -> Self {
        let opening = LedgerState::opening(&contract);
        ContractLedger {
            contract,
            policy,
            opening,
            entries: Vec::new(),
            paid: BTreeMap::new(),
        }
    }

    /// Rebuild a ledger by folding `movements` from scratch.
    pub fn replay<I>(contract: Contract, policy: LedgerPolicy, movements: I) -> Result<Self>
    where
        I: IntoIterator<Item = ContractMovement>,
    {
        let mut ledger = ContractLedger::new(contract, policy);
        for movement in movements {
            ledger.apply_movement(movement)?;
        }
        Ok(ledger)
    }

    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    pub fn policy(&self) -> LedgerPolicy {
        self.policy
    }

    pub fn opening_state(&self) -> &LedgerState {
        &self.opening
    }

    /// State after the last applied movement, or the opening state.
    pub fn current_state(&self) -> &LedgerState {
        self.entries
            .last()
            .map(|entry| &entry.state)
            .unwrap_or(&self.opening)
    }

    /// Applied movements with their states, in sequence order.
    pub fn history(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn movements(&self) -> impl Iterator<Item = &ContractMovement> {
        self.entries.iter().map(|entry| &entry.movement)
    }

    /// Validate `movement`, fold it into the current state and append it.
    ///
    /// On error nothing changes.
    pub fn apply_movement(&mut self, movement: ContractMovement) -> Result<LedgerState> {
        let prior = self.current_state();
        let state = validate(&movement, prior)
            .and_then(|_| compute_movement_effect(&movement, prior, &self.contract, self.policy))
            .map(|effect| effect.apply_to(prior, movement.sequence_number))
            .map_err(|e| {
                debug!("Rejected movement #{}: {e}", movement.sequence_number);
                e
            })?;

        debug!(
            "Applied {} #{}: amortization {}, retention {}, advance balance {}, pending {}",
            movement.kind,
            movement.sequence_number,
            state.advance_amortization,
            state.guarantee_fund_retained,
            state.advance_balance,
            state.contract_pending_balance
        );

        self.paid.insert(movement.sequence_number, movement.paid_amount);
        self.entries.push(LedgerEntry {
            movement,
            state: state.clone(),
        });
        Ok(state)
    }

    /// Validate a raw input record against the current state, then apply it.
    pub fn apply_input(&mut self, input: &MovementInput) -> Result<LedgerState> {
        let movement = validate_input(input, self.current_state())?;
        self.apply_movement(movement)
    }

    /// Drop movement `sequence_number` and everything after it.
    ///
    /// Returns the removed movements in order.
    pub fn truncate_from(&mut self, sequence_number: u32) -> Result<Vec<ContractMovement>> {
        let index = self.index_of(sequence_number)?;
        let removed: Vec<ContractMovement> = self
            .entries
            .split_off(index)
            .into_iter()
            .map(|entry| entry.movement)
            .collect();
        self.paid.retain(|seq, _| *seq < sequence_number);
        debug!(
            "Truncated {} movement(s) from #{sequence_number}",
            removed.len()
        );
        Ok(removed)
    }

    /// Replace history from `from_sequence` onward with `movements`.
    ///
    /// All-or-nothing: if any replacement is rejected the ledger is unchanged.
    pub fn amend<I>(&mut self, from_sequence: u32, movements: I) -> Result<LedgerState>
    where
        I: IntoIterator<Item = ContractMovement>,
    {
        let mut draft = self.clone();
        // Amending right after the last movement is a plain append.
        if from_sequence as usize != draft.len() + 1 {
            draft.truncate_from(from_sequence)?;
        }
        for movement in movements {
            draft.apply_movement(movement)?;
        }
        info!(
            "Amended ledger from #{from_sequence}: {} -> {} movement(s)",
            self.entries.len(),
            draft.entries.len()
        );
        *self = draft;
        Ok(self.current_state().clone())
    }

    /// Record the amount paid so far against a movement.
    pub fn set_paid_amount(&mut self, sequence_number: u32, paid_amount: Decimal) -> Result<()> {
        self.index_of(sequence_number)?;
        if paid_amount.is_sign_negative() && !paid_amount.is_zero() {
            return Err(Error::InvalidAmount(format!(
                "paid amount must not be negative, got {paid_amount}"
            )));
        }
        if paid_amount > crate::money::MAX_AMOUNT {
            return Err(Error::InvalidAmount(format!(
                "paid amount {paid_amount} exceeds {}",
                crate::money::MAX_AMOUNT
            )));
        }
        self.paid.insert(sequence_number, paid_amount);
        Ok(())
    }

    pub fn paid_amount(&self, sequence_number: u32) -> Option<Decimal> {
        self.paid.get(&sequence_number).copied()
    }

    /// Report rows with paid annotations merged in.
    pub fn rows(&self) -> Vec<LedgerRow> {
        self.entries.iter().map(|entry| self.row(entry)).collect()
    }

    fn row(&self, entry: &LedgerEntry) -> LedgerRow {
        let movement = &entry.movement;
        let state = &entry.state;
        let paid_amount = self
            .paid_amount(movement.sequence_number)
            .unwrap_or(movement.paid_amount);
        let balance_to_pay = if movement.kind.is_billable() {
            state.net_payable - paid_amount
        } else {
            Decimal::ZERO
        };
        LedgerRow {
            sequence_number: movement.sequence_number,
            kind: movement.kind,
            date: movement.date,
            description: movement.description.clone(),
            title: movement.title(),
            amount: movement.amount,
            advance_amortization: state.advance_amortization,
            guarantee_fund_retained: state.guarantee_fund_retained,
            advance_balance: state.advance_balance,
            paid_amount,
            balance_to_pay,
            contract_pending_balance: state.contract_pending_balance,
            contract_current_base: state.contract_current_base,
        }
    }

    /// Column sums across all movements plus the latest balances.
    pub fn totals(&self) -> LedgerTotals {
        let current = self.current_state();
        let mut totals = LedgerTotals {
            advance_balance: current.advance_balance,
            contract_pending_balance: current.contract_pending_balance,
            ..LedgerTotals::default()
        };
        for row in self.rows() {
            totals.amount += row.amount;
            if row.kind == MovementKind::Estimate {
                totals.estimated_amount += row.amount;
            }
            totals.advance_amortization += row.advance_amortization;
            totals.guarantee_fund_retained += row.guarantee_fund_retained;
            totals.paid_amount += row.paid_amount;
            totals.balance_to_pay += row.balance_to_pay;
        }
        totals
    }

    /// Share of the current contract value certified so far.
    pub fn progress(&self) -> Decimal {
        let base = self.current_state().contract_current_base;
        if base <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        self.totals().estimated_amount / base
    }

    fn index_of(&self, sequence_number: u32) -> Result<usize> {
        // Sequence numbers are gapless from 1.
        let index = (sequence_number as usize)
            .checked_sub(1)
            .filter(|i| *i < self.entries.len())
            .ok_or(Error::MovementNotFound(sequence_number))?;
        Ok(index)
    }
}
