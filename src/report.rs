//! Table rows for the CLI. Formatting only; nothing here feeds back into the
//! calculations.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use tabled::Tabled;

use crate::models::{Card, Expense};
use crate::money::{format_sgd, percentage_of, remaining};
use crate::spending::{CardSpendingSummary, CategoryCapProgress, CategoryCapStatus};

#[derive(Debug, Clone, Tabled)]
pub struct CardRow {
    pub id: i64,
    pub card: String,
    pub bank: String,
    pub network: String,
    pub cycle: String,
    #[tabled(rename = "min spend")]
    pub min: String,
    #[tabled(rename = "max spend")]
    pub max: String,
    pub caps: usize,
}

impl From<&Card> for CardRow {
    fn from(card: &Card) -> Self {
        Self {
            id: card.id,
            card: card.display_name(),
            bank: card.bank.to_string(),
            network: card.network.to_string(),
            cycle: card.cycle.label(),
            min: optional_amount(card.min_spending_threshold),
            max: optional_amount(card.max_spending_threshold),
            caps: card.category_caps.len(),
        }
    }
}

#[derive(Debug, Clone, Tabled)]
pub struct ExpenseRow {
    pub id: i64,
    #[tabled(rename = "card")]
    pub card_id: i64,
    pub date: String,
    pub amount: String,
    pub label: String,
    pub category: String,
    pub bonus: String,
}

impl From<&Expense> for ExpenseRow {
    fn from(expense: &Expense) -> Self {
        Self {
            id: expense.id,
            card_id: expense.card_id,
            date: expense.date.format("%Y-%m-%d %H:%M").to_string(),
            amount: format_sgd(expense.amount),
            label: expense.label.clone().unwrap_or_default(),
            category: expense.category.map(|c| c.to_string()).unwrap_or_default(),
            bonus: expense.bonus_bucket().to_string(),
        }
    }
}

#[derive(Debug, Clone, Tabled)]
pub struct SummaryRow {
    pub card: String,
    pub cycle: String,
    pub resets: String,
    pub spent: String,
    pub status: String,
    #[tabled(rename = "to min")]
    pub min_progress: String,
    #[tabled(rename = "left to min")]
    pub left_to_min: String,
    #[tabled(rename = "to max")]
    pub max_progress: String,
}

impl SummaryRow {
    pub fn new(summary: &CardSpendingSummary<'_>, now: NaiveDateTime) -> Self {
        let progress = &summary.threshold_progress;
        Self {
            card: summary.card.display_name(),
            cycle: summary.date_range.label(),
            resets: summary.date_range.reset_label(now),
            spent: format_sgd(summary.total_spending),
            status: summary.threshold_status.label().to_string(),
            min_progress: threshold_percent(summary.total_spending, progress.min_threshold),
            left_to_min: progress
                .min_threshold
                .map(|_| format_sgd(remaining(summary.total_spending, progress.min_threshold)))
                .unwrap_or_else(|| "-".into()),
            max_progress: threshold_percent(summary.total_spending, progress.max_threshold),
        }
    }
}

#[derive(Debug, Clone, Tabled)]
pub struct CapRow {
    pub card: String,
    pub category: String,
    pub spent: String,
    pub status: String,
    pub progress: String,
    pub rate: String,
}

impl CapRow {
    pub fn new(card: &Card, cap: &CategoryCapProgress) -> Self {
        let status = match cap.status {
            CategoryCapStatus::BelowMinimum { min_required, .. } => {
                format!("Unlock at {}", format_sgd(min_required))
            }
            CategoryCapStatus::InProgress { cap: limit, .. } => {
                format!("Earning, cap {}", format_sgd(limit))
            }
            CategoryCapStatus::MaxedOut { .. } => "Maxed out".to_string(),
        };
        Self {
            card: card.display_name(),
            category: cap.category.to_string(),
            spent: format_sgd(cap.spent),
            status,
            progress: percent(cap.progress),
            rate: format!("{} mpd", cap.bonus_rate),
        }
    }
}

/// Whole percent; values over 100% are shown as-is.
fn percent(ratio: f64) -> String {
    format!("{:.0}%", ratio * 100.0)
}

fn threshold_percent(total: Decimal, threshold: Option<Decimal>) -> String {
    match threshold {
        Some(_) => format!("{}%", percentage_of(total, threshold)),
        None => "-".into(),
    }
}

fn optional_amount(amount: Option<Decimal>) -> String {
    amount.map(format_sgd).unwrap_or_else(|| "-".into())
}
