use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::allocation::{allocate, split_across_weeks, summarize};
use crate::invariants::check_allocation;
use crate::weekly::group_by_week;
use crate::{Error, ExpenseCategory, ExpensePayment, Period, ProjectExpensePeriod};

fn period() -> Period {
    "2025-10".parse().unwrap()
}

fn project(id: &str, direct: Decimal) -> ProjectExpensePeriod {
    ProjectExpensePeriod {
        project_id: id.to_string(),
        period: period(),
        direct_expense_total: direct,
    }
}

#[test]
fn test_proportional_split() {
    let expenses = vec![
        project("OBRA-01", dec!(600_000)),
        project("OBRA-02", dec!(300_000)),
        project("OBRA-03", dec!(100_000)),
    ];
    let results = allocate(period(), &expenses, dec!(150_000)).unwrap();

    assert_eq!(results[0].proportion, dec!(0.6));
    assert_eq!(results[0].indirect_cost_assigned, dec!(90_000));
    assert_eq!(results[0].total_with_indirect, dec!(690_000));
    assert_eq!(results[1].indirect_cost_assigned, dec!(45_000));
    assert_eq!(results[2].indirect_cost_assigned, dec!(15_000));
    assert_eq!(results[2].total_with_indirect, dec!(115_000));
    check_allocation(&results, dec!(150_000)).unwrap();
}

#[test]
fn test_rounding_residual_is_reconciled() {
    let expenses = vec![
        project("A", dec!(1)),
        project("B", dec!(1)),
        project("C", dec!(1)),
    ];
    let results = allocate(period(), &expenses, dec!(1_000)).unwrap();
    let assigned: Decimal = results.iter().map(|r| r.indirect_cost_assigned).sum();
    assert_eq!(assigned, dec!(1_000));
    assert_eq!(results[0].indirect_cost_assigned, dec!(333.34));
    assert_eq!(results[1].indirect_cost_assigned, dec!(333.33));
}

#[test]
fn test_zero_direct_spend_assigns_nothing() {
    let expenses = vec![project("A", Decimal::ZERO), project("B", Decimal::ZERO)];
    let results = allocate(period(), &expenses, dec!(50_000)).unwrap();
    for r in &results {
        assert_eq!(r.proportion, Decimal::ZERO);
        assert_eq!(r.indirect_cost_assigned, Decimal::ZERO);
        assert_eq!(r.total_with_indirect, Decimal::ZERO);
    }
    check_allocation(&results, dec!(50_000)).unwrap();

    assert!(allocate(period(), &[], dec!(50_000)).unwrap().is_empty());
}

#[test]
fn test_rejects_bad_inputs() {
    assert!(matches!(
        allocate(period(), &[project("A", dec!(-1))], dec!(10)),
        Err(Error::InvalidAmount(_))
    ));
    assert!(matches!(
        allocate(period(), &[project("A", dec!(1))], dec!(-10)),
        Err(Error::InvalidAmount(_))
    ));
    assert_eq!(
        allocate(period(), &[project("A", dec!(1)), project("A", dec!(2))], dec!(10)),
        Err(Error::DuplicateProject("A".into()))
    );

    let mut other = project("B", dec!(1));
    other.period = "2025-11".parse().unwrap();
    assert_eq!(
        allocate(period(), &[other], dec!(10)),
        Err(Error::PeriodMismatch {
            expected: period(),
            got: "2025-11".parse().unwrap()
        })
    );
}

#[test]
fn test_summary_totals() {
    let expenses = vec![project("A", dec!(250_000)), project("B", dec!(750_000))];
    let summary = summarize(period(), &expenses, dec!(80_000)).unwrap();
    assert_eq!(summary.direct_expense_total, dec!(1_000_000));
    assert_eq!(summary.indirect_cost_total, dec!(80_000));
    assert_eq!(summary.results[1].indirect_cost_assigned, dec!(60_000));
}

#[test]
fn test_project_totals_from_payments() {
    let day = |d| NaiveDate::from_ymd_opt(2025, 10, d).unwrap();
    let payments = vec![
        ExpensePayment {
            project_id: "A".into(),
            date: day(6),
            amount: dec!(125_000),
            category: ExpenseCategory::PurchaseOrder,
        },
        ExpensePayment {
            project_id: "A".into(),
            date: day(10),
            amount: dec!(85_000),
            category: ExpenseCategory::Payroll,
        },
        ExpensePayment {
            project_id: "B".into(),
            date: day(10),
            amount: dec!(1),
            category: ExpenseCategory::Payroll,
        },
        ExpensePayment {
            project_id: "A".into(),
            date: NaiveDate::from_ymd_opt(2025, 11, 3).unwrap(),
            amount: dec!(999),
            category: ExpenseCategory::Payroll,
        },
    ];
    let totals = ProjectExpensePeriod::from_payments("A", period(), &payments);
    assert_eq!(totals.direct_expense_total, dec!(210_000));
    assert_eq!(totals.period, period());
}

#[test]
fn test_weekly_split_follows_project_share() {
    let day = |d| NaiveDate::from_ymd_opt(2025, 10, d).unwrap();
    let payment = |d, amount, category| ExpensePayment {
        project_id: "A".into(),
        date: day(d),
        amount,
        category,
    };
    let payments = vec![
        payment(6, dec!(125_000), ExpenseCategory::PurchaseOrder),
        payment(7, dec!(85_000), ExpenseCategory::Payroll),
        payment(13, dec!(180_000), ExpenseCategory::PurchaseOrder),
        payment(14, dec!(85_000), ExpenseCategory::Payroll),
        payment(20, dec!(95_000), ExpenseCategory::PurchaseOrder),
        payment(21, dec!(85_000), ExpenseCategory::Payroll),
    ];
    let weeks = group_by_week(&payments);
    assert_eq!(weeks.len(), 3);

    let split = split_across_weeks(dec!(6_550), &weeks);
    // Direct totals 210k / 265k / 180k out of 655k.
    assert_eq!(split[0].indirect_cost, dec!(2_100));
    assert_eq!(split[1].indirect_cost, dec!(2_650));
    assert_eq!(split[2].indirect_cost, dec!(1_800));
    assert_eq!(split[1].total, dec!(267_650));
    assert_eq!(
        split.iter().map(|w| w.indirect_cost).sum::<Decimal>(),
        dec!(6_550)
    );

    let empty = split_across_weeks(dec!(100), &[]);
    assert!(empty.is_empty());
}
