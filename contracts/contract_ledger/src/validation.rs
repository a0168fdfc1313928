//! Movement validation.
//!
//! Pure checks run before a movement touches a ledger. Nothing here reads or
//! writes anything but its arguments.

use rust_decimal::Decimal;

use crate::money::MAX_AMOUNT;
use crate::types::{ContractMovement, LedgerState, MovementInput, MovementKind};
use crate::{Error, Result};

/// Check a typed movement against the state it would be applied to.
pub fn validate(movement: &ContractMovement, prior: &LedgerState) -> Result<()> {
    check_amount("amount", movement.amount)?;
    check_amount("paid amount", movement.paid_amount)?;
    check_sequence(movement.sequence_number, prior)
}

/// Parse and check a raw movement, yielding the typed movement on success.
///
/// Checks run in order: amount, paid amount, sequence, kind.
pub fn validate_input(input: &MovementInput, prior: &LedgerState) -> Result<ContractMovement> {
    let amount = input.amount.to_decimal()?;
    check_amount("amount", amount)?;

    let paid_amount = match &input.paid_amount {
        Some(raw) => raw.to_decimal()?,
        None => Decimal::ZERO,
    };
    check_amount("paid amount", paid_amount)?;

    check_sequence(input.sequence_number, prior)?;
    let kind: MovementKind = input.kind.parse()?;

    Ok(ContractMovement {
        sequence_number: input.sequence_number,
        kind,
        date: input.date,
        description: input.description.trim().to_string(),
        amount,
        paid_amount,
    })
}

/// The only sequence number `prior` will accept next.
pub fn expected_sequence(prior: &LedgerState) -> u32 {
    prior.sequence_number + 1
}

fn check_sequence(got: u32, prior: &LedgerState) -> Result<()> {
    let expected = expected_sequence(prior);
    if got != expected {
        return Err(Error::OutOfSequence { expected, got });
    }
    Ok(())
}

fn check_amount(name: &str, value: Decimal) -> Result<()> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(Error::InvalidAmount(format!(
            "{name} must not be negative, got {value}"
        )));
    }
    if value > MAX_AMOUNT {
        return Err(Error::InvalidAmount(format!(
            "{name} {value} exceeds {MAX_AMOUNT}"
        )));
    }
    Ok(())
}
