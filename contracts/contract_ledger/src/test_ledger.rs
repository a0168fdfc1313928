use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::invariants::check_ledger;
use crate::{
    Contract, ContractLedger, ContractMovement, ContractTerms, Error, LedgerPolicy, MovementInput,
    MovementKind, OverrunPolicy, RawAmount,
};

/// The reference contract: 1,000,000 with a 10% advance and 3% retention.
fn setup() -> ContractLedger {
    let contract = Contract::new(ContractTerms {
        original_amount: dec!(1_000_000),
        advance_percentage: dec!(10),
        guarantee_fund_percentage: dec!(3),
    })
    .unwrap();
    ContractLedger::new(contract, LedgerPolicy::default())
}

fn movement(seq: u32, kind: MovementKind, amount: Decimal) -> ContractMovement {
    ContractMovement {
        sequence_number: seq,
        kind,
        date: NaiveDate::from_ymd_opt(2025, 9, 15).unwrap() + chrono::Duration::days(30 * seq as i64),
        description: format!("movement {seq}"),
        amount,
        paid_amount: Decimal::ZERO,
    }
}

/// Seven movements exercising re-basing, the advance clamp and the cap clamp.
fn reference_movements() -> Vec<ContractMovement> {
    vec![
        movement(1, MovementKind::Estimate, dec!(150_000)),
        movement(2, MovementKind::Estimate, dec!(200_000)),
        movement(3, MovementKind::Estimate, dec!(180_000)),
        movement(4, MovementKind::Addition, dec!(150_000)),
        movement(5, MovementKind::Estimate, dec!(220_000)),
        movement(6, MovementKind::Estimate, dec!(300_000)),
        movement(7, MovementKind::Estimate, dec!(100_000)),
    ]
}

fn reference_ledger() -> ContractLedger {
    let mut ledger = setup();
    for m in reference_movements() {
        ledger.apply_movement(m).unwrap();
    }
    ledger
}

#[test]
fn test_opening_state() {
    let ledger = setup();
    let state = ledger.current_state();
    assert_eq!(state.sequence_number, 0);
    assert_eq!(state.advance_balance, dec!(100_000));
    assert_eq!(state.contract_pending_balance, dec!(1_000_000));
    assert_eq!(state.contract_current_base, dec!(1_000_000));
    assert_eq!(state.guarantee_fund_accumulated, Decimal::ZERO);
    assert!(ledger.history().is_empty());
}

#[test]
fn test_first_estimate() {
    let mut ledger = setup();
    let state = ledger
        .apply_movement(movement(1, MovementKind::Estimate, dec!(150_000)))
        .unwrap();
    assert_eq!(state.advance_amortization, dec!(15_000));
    assert_eq!(state.guarantee_fund_retained, dec!(4_500));
    assert_eq!(state.advance_balance, dec!(85_000));
    assert_eq!(state.contract_pending_balance, dec!(850_000));
    assert_eq!(state.net_payable, dec!(130_500));
}

#[test]
fn test_reference_scenario() {
    let ledger = reference_ledger();
    let states: Vec<_> = ledger.history().iter().map(|e| e.state.clone()).collect();

    // Addition #4 moves the base and pending balance only.
    assert_eq!(states[3].contract_current_base, dec!(1_150_000));
    assert_eq!(states[3].contract_pending_balance, states[2].contract_pending_balance + dec!(150_000));
    assert_eq!(states[3].advance_amortization, Decimal::ZERO);
    assert_eq!(states[3].advance_balance, states[2].advance_balance);
    assert_eq!(states[3].advance_balance, dec!(47_000));

    // Estimate #5 amortizes against the new base.
    assert_eq!(states[4].advance_amortization, dec!(19_130.43));
    assert_eq!(states[4].guarantee_fund_retained, dec!(6_600));
    assert_eq!(states[4].advance_balance, dec!(27_869.57));

    // Estimate #6 only has 7,500 of retention room left.
    assert_eq!(states[5].advance_amortization, dec!(26_086.96));
    assert_eq!(states[5].guarantee_fund_retained, dec!(7_500));
    assert_eq!(states[5].guarantee_fund_accumulated, dec!(30_000));

    // Estimate #7: advance nearly gone, cap exhausted.
    assert_eq!(states[6].advance_amortization, dec!(1_782.61));
    assert_eq!(states[6].guarantee_fund_retained, Decimal::ZERO);
    assert_eq!(states[6].advance_balance, Decimal::ZERO);
    assert_eq!(states[6].contract_pending_balance, Decimal::ZERO);
    assert_eq!(states[6].net_payable, dec!(98_217.39));

    check_ledger(&ledger).unwrap();
}

#[test]
fn test_estimate_beyond_pending_is_rejected() {
    let mut ledger = reference_ledger();
    let before = ledger.clone();
    assert_eq!(
        ledger.apply_movement(movement(8, MovementKind::Estimate, dec!(0.01))),
        Err(Error::EstimateExceedsPending {
            amount: dec!(0.01),
            pending: Decimal::ZERO
        })
    );
    assert_eq!(ledger, before);
}

#[test]
fn test_reduction_beyond_pending_is_rejected() {
    let mut ledger = setup();
    ledger
        .apply_movement(movement(1, MovementKind::Estimate, dec!(900_000)))
        .unwrap();
    let err = ledger
        .apply_movement(movement(2, MovementKind::Reduction, dec!(100_000.01)))
        .unwrap_err();
    assert_eq!(err.code(), 4);
    assert_eq!(ledger.len(), 1);

    let state = ledger
        .apply_movement(movement(2, MovementKind::Reduction, dec!(100_000)))
        .unwrap();
    assert_eq!(state.contract_pending_balance, Decimal::ZERO);
    assert_eq!(state.contract_current_base, dec!(900_000));
}

#[test]
fn test_lenient_policy_accepts_overruns() {
    let contract = setup().contract().clone();
    let mut ledger = ContractLedger::new(
        contract,
        LedgerPolicy {
            reduction_overrun: OverrunPolicy::Allow,
            estimate_overrun: OverrunPolicy::Allow,
        },
    );
    let state = ledger
        .apply_movement(movement(1, MovementKind::Estimate, dec!(1_200_000)))
        .unwrap();
    assert_eq!(state.contract_pending_balance, dec!(-200_000));
    assert_eq!(state.advance_amortization, dec!(100_000));
    assert_eq!(state.guarantee_fund_retained, dec!(30_000));
    check_ledger(&ledger).unwrap();
}

#[test]
fn test_out_of_sequence_leaves_state_unchanged() {
    let mut ledger = setup();
    ledger
        .apply_movement(movement(1, MovementKind::Estimate, dec!(10_000)))
        .unwrap();
    let before = ledger.clone();
    assert_eq!(
        ledger.apply_movement(movement(3, MovementKind::Estimate, dec!(10_000))),
        Err(Error::OutOfSequence {
            expected: 2,
            got: 3
        })
    );
    assert_eq!(
        ledger.apply_movement(movement(1, MovementKind::Estimate, dec!(10_000))),
        Err(Error::OutOfSequence {
            expected: 2,
            got: 1
        })
    );
    assert_eq!(ledger, before);
}

#[test]
fn test_apply_input_validates_raw_records() {
    let mut ledger = setup();
    let input = MovementInput {
        sequence_number: 1,
        kind: "estimacion".into(),
        date: NaiveDate::from_ymd_opt(2025, 10, 15).unwrap(),
        description: "Preliminary works".into(),
        amount: RawAmount::Text("150000.00".into()),
        paid_amount: Some(RawAmount::Number(100_000.0)),
    };
    let state = ledger.apply_input(&input).unwrap();
    assert_eq!(state.balance_to_pay, dec!(30_500));
    assert_eq!(ledger.rows()[0].title, "Estimate 1 - Preliminary works");

    let bad = MovementInput {
        sequence_number: 2,
        kind: "retention".into(),
        ..input
    };
    assert_eq!(
        ledger.apply_input(&bad),
        Err(Error::UnknownKind("retention".into()))
    );
    assert_eq!(ledger.len(), 1);
}

#[test]
fn test_dust_base_rejects_estimate_without_panicking() {
    let contract = Contract::new(ContractTerms {
        original_amount: dec!(1),
        advance_percentage: dec!(10),
        guarantee_fund_percentage: dec!(3),
    })
    .unwrap();
    let policy = LedgerPolicy {
        reduction_overrun: OverrunPolicy::Reject,
        estimate_overrun: OverrunPolicy::Allow,
    };
    let mut ledger = ContractLedger::new(contract, policy);
    let state = ledger
        .apply_movement(movement(1, MovementKind::Reduction, dec!(0.999999999999999999999999999)))
        .unwrap();
    assert_eq!(state.contract_current_base, Decimal::new(1, 27));

    let before = ledger.clone();
    let input = MovementInput {
        sequence_number: 2,
        kind: "estimate".into(),
        date: NaiveDate::from_ymd_opt(2025, 10, 15).unwrap(),
        description: String::new(),
        amount: RawAmount::Text("1000000000000000".into()),
        paid_amount: None,
    };
    assert_eq!(
        ledger.apply_input(&input),
        Err(Error::DegenerateContractBase(Decimal::new(1, 27)))
    );
    assert_eq!(ledger, before);
}

#[test]
fn test_replay_is_idempotent() {
    let ledger = reference_ledger();
    let replayed = ContractLedger::replay(
        ledger.contract().clone(),
        ledger.policy(),
        ledger.movements().cloned(),
    )
    .unwrap();
    assert_eq!(replayed.current_state(), ledger.current_state());
    assert_eq!(replayed.history(), ledger.history());
}

#[test]
fn test_truncate_and_amend() {
    let mut ledger = reference_ledger();
    ledger.set_paid_amount(6, dec!(1_000)).unwrap();

    let removed = ledger.truncate_from(5).unwrap();
    assert_eq!(removed.len(), 3);
    assert_eq!(removed[0].sequence_number, 5);
    assert_eq!(ledger.current_state().sequence_number, 4);
    assert_eq!(ledger.paid_amount(6), None);

    // Re-certify #5 with a corrected amount.
    let state = ledger
        .amend(5, vec![movement(5, MovementKind::Estimate, dec!(115_000))])
        .unwrap();
    assert_eq!(state.sequence_number, 5);
    assert_eq!(state.advance_amortization, dec!(10_000));

    assert_eq!(ledger.truncate_from(9), Err(Error::MovementNotFound(9)));
    assert_eq!(ledger.truncate_from(0), Err(Error::MovementNotFound(0)));
}

#[test]
fn test_amend_is_all_or_nothing() {
    let mut ledger = reference_ledger();
    let before = ledger.clone();
    let result = ledger.amend(
        6,
        vec![
            movement(6, MovementKind::Estimate, dec!(100_000)),
            movement(8, MovementKind::Estimate, dec!(100_000)),
        ],
    );
    assert_eq!(
        result,
        Err(Error::OutOfSequence {
            expected: 7,
            got: 8
        })
    );
    assert_eq!(ledger, before);
}

#[test]
fn test_paid_annotation_does_not_touch_amortization() {
    let mut ledger = reference_ledger();
    let state_before = ledger.current_state().clone();

    ledger.set_paid_amount(1, dec!(130_500)).unwrap();
    ledger.set_paid_amount(4, dec!(10)).unwrap();

    let rows = ledger.rows();
    assert_eq!(rows[0].paid_amount, dec!(130_500));
    assert_eq!(rows[0].balance_to_pay, Decimal::ZERO);
    assert_eq!(rows[0].advance_amortization, dec!(15_000));
    // Additions never carry a balance to pay.
    assert_eq!(rows[3].balance_to_pay, Decimal::ZERO);
    assert_eq!(ledger.current_state(), &state_before);

    assert!(matches!(
        ledger.set_paid_amount(1, dec!(-1)),
        Err(Error::InvalidAmount(_))
    ));
    assert_eq!(
        ledger.set_paid_amount(42, dec!(1)),
        Err(Error::MovementNotFound(42))
    );
}

#[test]
fn test_totals() {
    let mut ledger = reference_ledger();
    ledger.set_paid_amount(1, dec!(130_500)).unwrap();
    let totals = ledger.totals();

    assert_eq!(totals.amount, dec!(1_300_000));
    assert_eq!(totals.estimated_amount, dec!(1_150_000));
    assert_eq!(totals.advance_amortization, dec!(100_000));
    assert_eq!(totals.guarantee_fund_retained, dec!(30_000));
    assert_eq!(totals.paid_amount, dec!(130_500));
    assert_eq!(totals.balance_to_pay, dec!(1_020_000) - dec!(130_500));
    // Point-in-time, not summed.
    assert_eq!(totals.advance_balance, Decimal::ZERO);
    assert_eq!(totals.contract_pending_balance, Decimal::ZERO);
    assert_eq!(ledger.progress(), Decimal::ONE);
}
