//! Advance amortization and guarantee-fund retention for one movement.
//!
//! For an estimate of `amount` against state `prior`:
//!
//! ```text
//! amortization = min(round(amount / current_base * advance_total), advance_balance)
//! retention    = clamp(round(amount * guarantee% / 100), 0, cap - accumulated)
//! net_payable  = amount - amortization - retention
//! ```
//!
//! The amortization rate is re-based on the *current* contract value, so an
//! addition lowers the share of the advance each later estimate recovers.
//! Additions and reductions only move the contract base and pending balance.

use rust_decimal::Decimal;

use crate::money::{percent_of, round_money};
use crate::types::{
    Contract, ContractMovement, LedgerPolicy, LedgerState, MovementEffect, MovementKind,
    OverrunPolicy,
};
use crate::{Error, Result};

/// Compute the derived values and state deltas for `movement`.
pub fn compute_movement_effect(
    movement: &ContractMovement,
    prior: &LedgerState,
    contract: &Contract,
    policy: LedgerPolicy,
) -> Result<MovementEffect> {
    match movement.kind {
        MovementKind::Estimate => estimate_effect(movement, prior, contract, policy),
        MovementKind::Addition => Ok(MovementEffect {
            pending_delta: movement.amount,
            base_delta: movement.amount,
            ..MovementEffect::default()
        }),
        MovementKind::Reduction => {
            if policy.reduction_overrun == OverrunPolicy::Reject
                && movement.amount > prior.contract_pending_balance
            {
                return Err(Error::ReductionExceedsPending {
                    amount: movement.amount,
                    pending: prior.contract_pending_balance,
                });
            }
            Ok(MovementEffect {
                pending_delta: -movement.amount,
                base_delta: -movement.amount,
                ..MovementEffect::default()
            })
        }
    }
}

fn estimate_effect(
    movement: &ContractMovement,
    prior: &LedgerState,
    contract: &Contract,
    policy: LedgerPolicy,
) -> Result<MovementEffect> {
    let amount = movement.amount;
    if policy.estimate_overrun == OverrunPolicy::Reject && amount > prior.contract_pending_balance {
        return Err(Error::EstimateExceedsPending {
            amount,
            pending: prior.contract_pending_balance,
        });
    }

    let advance_amortization = if amount.is_zero() {
        Decimal::ZERO
    } else {
        if prior.contract_current_base <= Decimal::ZERO {
            return Err(Error::DegenerateContractBase(prior.contract_current_base));
        }
        // A base shrunk to dust by reductions can push the ratio past Decimal range.
        let raw = amount
            .checked_div(prior.contract_current_base)
            .and_then(|ratio| ratio.checked_mul(contract.advance_total()))
            .ok_or(Error::DegenerateContractBase(prior.contract_current_base))?;
        round_money(raw).min(prior.advance_balance).max(Decimal::ZERO)
    };

    let remaining_cap = contract.guarantee_fund_cap() - prior.guarantee_fund_accumulated;
    let guarantee_fund_retained = round_money(percent_of(amount, contract.guarantee_fund_percentage()))
        .min(remaining_cap)
        .max(Decimal::ZERO);

    let net_payable = amount - advance_amortization - guarantee_fund_retained;

    Ok(MovementEffect {
        advance_amortization,
        guarantee_fund_retained,
        net_payable,
        balance_to_pay: net_payable - movement.paid_amount,
        advance_balance_delta: -advance_amortization,
        pending_delta: -amount,
        base_delta: Decimal::ZERO,
        guarantee_fund_delta: guarantee_fund_retained,
    })
}
