//! Weekly buckets of a project's direct expenses.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Where a direct expense came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseCategory {
    PurchaseOrder,
    Payroll,
}

impl ExpenseCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PurchaseOrder => "purchase_order",
            Self::Payroll => "payroll",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "purchase_order" => Some(Self::PurchaseOrder),
            "payroll" => Some(Self::Payroll),
            _ => None,
        }
    }
}

/// A single direct-expense payment made for a project.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpensePayment {
    pub project_id: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub category: ExpenseCategory,
}

/// Direct expenses of one week, starting Monday.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyExpense {
    pub week_start: NaiveDate,
    pub purchase_orders: Decimal,
    pub payroll: Decimal,
}

impl WeeklyExpense {
    pub fn direct_total(&self) -> Decimal {
        self.purchase_orders + self.payroll
    }

    pub fn label(&self) -> String {
        format!("Week of {}", self.week_start.format("%Y-%m-%d"))
    }
}

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Group payments into Monday-start weeks, oldest first.
pub fn group_by_week<'a, I>(payments: I) -> Vec<WeeklyExpense>
where
    I: IntoIterator<Item = &'a ExpensePayment>,
{
    let mut weeks: BTreeMap<NaiveDate, WeeklyExpense> = BTreeMap::new();
    for payment in payments {
        let start = week_start(payment.date);
        let week = weeks.entry(start).or_insert_with(|| WeeklyExpense {
            week_start: start,
            purchase_orders: Decimal::ZERO,
            payroll: Decimal::ZERO,
        });
        match payment.category {
            ExpenseCategory::PurchaseOrder => week.purchase_orders += payment.amount,
            ExpenseCategory::Payroll => week.payroll += payment.amount,
        }
    }
    weeks.into_values().collect()
}
