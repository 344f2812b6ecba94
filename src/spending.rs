//! Per-card spending aggregation for the active billing cycle.
//!
//! `summarize` is the entry point: it resolves the card's current cycle,
//! totals the expenses inside it and classifies the total against the card's
//! thresholds and category caps. Pure and deterministic for a given
//! reference time.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::cycle::{DateRange, calendar_month_range, current_cycle};
use crate::models::{BonusCategory, Card, CategoryCap, Expense};
use crate::money::progress_toward;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdStatus {
    BelowMinimum,
    MinimumMet,
    InRange,
    OverMaximum,
    NoThreshold,
}

impl ThresholdStatus {
    pub fn label(self) -> &'static str {
        match self {
            ThresholdStatus::BelowMinimum => "Below Minimum",
            ThresholdStatus::MinimumMet => "Minimum Met",
            ThresholdStatus::InRange => "In Range",
            ThresholdStatus::OverMaximum => "Over Maximum",
            ThresholdStatus::NoThreshold => "No Threshold",
        }
    }
}

/// Where a category's spend sits relative to its unlock minimum and cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CategoryCapStatus {
    BelowMinimum { spent: Decimal, min_required: Decimal },
    InProgress { spent: Decimal, cap: Decimal },
    MaxedOut { cap: Decimal },
}

impl CategoryCapStatus {
    pub fn is_earning_bonus(&self) -> bool {
        match self {
            CategoryCapStatus::BelowMinimum { .. } => false,
            CategoryCapStatus::InProgress { .. } | CategoryCapStatus::MaxedOut { .. } => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdProgress {
    pub min_progress: f64,
    pub max_progress: f64,
    pub current_spend: Decimal,
    pub min_threshold: Option<Decimal>,
    pub max_threshold: Option<Decimal>,
}

/// `progress` is measured against `min_spend` while the status is
/// `BelowMinimum` and against `cap_amount` otherwise; read it together with
/// `status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCapProgress {
    pub category: BonusCategory,
    pub spent: Decimal,
    pub min_spend: Option<Decimal>,
    pub cap_amount: Decimal,
    pub bonus_rate: f64,
    pub status: CategoryCapStatus,
    pub progress: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardSpendingSummary<'a> {
    pub card: &'a Card,
    pub date_range: DateRange,
    pub total_spending: Decimal,
    pub category_spending: BTreeMap<BonusCategory, Decimal>,
    pub threshold_status: ThresholdStatus,
    pub threshold_progress: ThresholdProgress,
    pub category_cap_progress: Vec<CategoryCapProgress>,
}

impl CardSpendingSummary<'_> {
    pub fn cap_for(&self, category: BonusCategory) -> Option<&CategoryCapProgress> {
        self.category_cap_progress
            .iter()
            .find(|cap| cap.category == category)
    }
}

/// Month-to-date total across every card, on calendar months.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyOverview {
    /// "January 2025"
    pub month: String,
    pub date_range: DateRange,
    pub total_spending: Decimal,
    pub card_count: usize,
}

pub fn total_spending<'e>(expenses: impl IntoIterator<Item = &'e Expense>, range: &DateRange) -> Decimal {
    expenses
        .into_iter()
        .filter(|e| range.contains(e.date))
        .map(|e| e.amount)
        .sum()
}

/// In-range spend keyed by bonus bucket; untagged expenses land in `General`.
pub fn spending_per_category(expenses: &[Expense], range: &DateRange) -> BTreeMap<BonusCategory, Decimal> {
    let mut per_category = BTreeMap::new();
    for expense in expenses.iter().filter(|e| range.contains(e.date)) {
        *per_category.entry(expense.bonus_bucket()).or_insert(Decimal::ZERO) += expense.amount;
    }
    per_category
}

/// Classifies `total`. An exceeded maximum wins over an unmet minimum.
pub fn threshold_status(total: Decimal, min: Option<Decimal>, max: Option<Decimal>) -> ThresholdStatus {
    match (min, max) {
        (None, None) => ThresholdStatus::NoThreshold,
        (_, Some(max)) if total > max => ThresholdStatus::OverMaximum,
        (Some(min), _) if total < min => ThresholdStatus::BelowMinimum,
        (Some(_), Some(_)) => ThresholdStatus::InRange,
        (Some(_), None) => ThresholdStatus::MinimumMet,
        (None, Some(_)) => ThresholdStatus::InRange,
    }
}

pub fn threshold_progress(total: Decimal, min: Option<Decimal>, max: Option<Decimal>) -> ThresholdProgress {
    ThresholdProgress {
        min_progress: progress_toward(total, min),
        max_progress: progress_toward(total, max),
        current_spend: total,
        min_threshold: min,
        max_threshold: max,
    }
}

pub fn category_cap_status(spent: Decimal, min_spend: Option<Decimal>, cap: Decimal) -> CategoryCapStatus {
    match min_spend {
        Some(min_required) if spent < min_required => CategoryCapStatus::BelowMinimum { spent, min_required },
        _ if spent >= cap => CategoryCapStatus::MaxedOut { cap },
        _ => CategoryCapStatus::InProgress { spent, cap },
    }
}

fn cap_progress(cap: &CategoryCap, spent: Decimal) -> CategoryCapProgress {
    let status = category_cap_status(spent, cap.min_spend, cap.cap_amount);
    let progress = match status {
        CategoryCapStatus::BelowMinimum { min_required, .. } => progress_toward(spent, Some(min_required)),
        CategoryCapStatus::InProgress { .. } | CategoryCapStatus::MaxedOut { .. } => {
            progress_toward(spent, Some(cap.cap_amount))
        }
    };

    CategoryCapProgress {
        category: cap.category,
        spent,
        min_spend: cap.min_spend,
        cap_amount: cap.cap_amount,
        bonus_rate: cap.bonus_rate,
        status,
        progress,
    }
}

/// One entry per configured cap, in the card's cap order. Empty when the card
/// has no caps, even if its flag says otherwise.
pub fn category_cap_progress(card: &Card, range: &DateRange) -> Vec<CategoryCapProgress> {
    if !card.has_category_caps || card.category_caps.is_empty() {
        return Vec::new();
    }
    let per_category = spending_per_category(&card.expenses, range);
    card.category_caps
        .iter()
        .map(|cap| {
            let spent = per_category.get(&cap.category).copied().unwrap_or(Decimal::ZERO);
            cap_progress(cap, spent)
        })
        .collect()
}

#[instrument(level = "debug", skip(card), fields(card_id = card.id))]
pub fn summarize(card: &Card, reference: NaiveDateTime) -> CardSpendingSummary<'_> {
    let date_range = current_cycle(card.cycle, reference);
    let total = total_spending(&card.expenses, &date_range);
    let min = card.min_spending_threshold;
    let max = card.max_spending_threshold;
    let status = threshold_status(total, min, max);

    debug!(
        cycle = %date_range.label(),
        %total,
        status = status.label(),
        "card summary computed"
    );

    CardSpendingSummary {
        card,
        date_range,
        total_spending: total,
        category_spending: spending_per_category(&card.expenses, &date_range),
        threshold_status: status,
        threshold_progress: threshold_progress(total, min, max),
        category_cap_progress: category_cap_progress(card, &date_range),
    }
}

pub fn summarize_all(cards: &[Card], reference: NaiveDateTime) -> Vec<CardSpendingSummary<'_>> {
    cards.iter().map(|card| summarize(card, reference)).collect()
}

pub fn monthly_overview(cards: &[Card], reference: NaiveDateTime) -> MonthlyOverview {
    let date_range = calendar_month_range(reference);
    MonthlyOverview {
        month: date_range.start.format("%B %Y").to_string(),
        date_range,
        total_spending: total_spending(cards.iter().flat_map(|c| c.expenses.iter()), &date_range),
        card_count: cards.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycle::CyclePolicy;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-9, "expected {expected}, got {actual}");
    }

    fn cap(category: BonusCategory, min_spend: Option<Decimal>, cap_amount: Decimal) -> CategoryCap {
        CategoryCap {
            id: 0,
            category,
            min_spend,
            cap_amount,
            bonus_rate: 4.0,
        }
    }

    fn capped_card(expenses: Vec<Expense>) -> Card {
        let mut card = Card::new("yuu Visa", CyclePolicy::CalendarMonth);
        card.has_category_caps = true;
        card.category_caps = vec![cap(BonusCategory::Online, Some(dec!(1000)), dec!(1200))];
        card.expenses = expenses;
        card
    }

    #[test]
    fn test_total_ignores_out_of_range_and_order() {
        let range = calendar_month_range(at(2025, 3, 10));
        let inside = vec![
            Expense::new(dec!(10.00), at(2025, 3, 1)),
            Expense::new(dec!(20.50), at(2025, 3, 15)),
            Expense::new(dec!(0.49), at(2025, 3, 31)),
        ];
        let outside = Expense::new(dec!(999.00), at(2025, 4, 1));

        let mut forward = inside.clone();
        forward.push(outside.clone());
        let mut backward = vec![outside];
        backward.extend(inside.into_iter().rev());

        assert_eq!(total_spending(&forward, &range), dec!(30.99));
        assert_eq!(total_spending(&backward, &range), dec!(30.99));
    }

    #[test]
    fn test_total_is_exact_over_many_small_amounts() {
        let range = calendar_month_range(at(2025, 3, 10));
        let expenses: Vec<_> = (0..1000).map(|_| Expense::new(dec!(0.10), at(2025, 3, 5))).collect();
        assert_eq!(total_spending(&expenses, &range), dec!(100.00));
    }

    #[test]
    fn test_total_of_nothing_is_zero() {
        let range = calendar_month_range(at(2025, 3, 10));
        let none: Vec<Expense> = Vec::new();
        assert_eq!(total_spending(&none, &range), Decimal::ZERO);
    }

    #[test]
    fn test_over_maximum_takes_priority() {
        assert_eq!(
            threshold_status(dec!(1200), Some(dec!(500)), Some(dec!(1000))),
            ThresholdStatus::OverMaximum
        );
        // inverted thresholds still resolve deterministically
        assert_eq!(
            threshold_status(dec!(300), Some(dec!(500)), Some(dec!(200))),
            ThresholdStatus::OverMaximum
        );
    }

    #[test]
    fn test_threshold_status_branches() {
        assert_eq!(threshold_status(dec!(100), Some(dec!(500)), None), ThresholdStatus::BelowMinimum);
        assert_eq!(threshold_status(dec!(500), Some(dec!(500)), None), ThresholdStatus::MinimumMet);
        assert_eq!(threshold_status(dec!(700), Some(dec!(500)), Some(dec!(1000))), ThresholdStatus::InRange);
        assert_eq!(threshold_status(dec!(1000), Some(dec!(500)), Some(dec!(1000))), ThresholdStatus::InRange);
        assert_eq!(threshold_status(dec!(100), Some(dec!(500)), Some(dec!(1000))), ThresholdStatus::BelowMinimum);
        assert_eq!(threshold_status(dec!(100), None, Some(dec!(1000))), ThresholdStatus::InRange);
        assert_eq!(threshold_status(dec!(1000.01), None, Some(dec!(1000))), ThresholdStatus::OverMaximum);
    }

    #[test]
    fn test_no_threshold_regardless_of_spend() {
        for total in [dec!(0), dec!(1), dec!(1000000)] {
            assert_eq!(threshold_status(total, None, None), ThresholdStatus::NoThreshold);
        }
    }

    #[test]
    fn test_threshold_progress_is_unclamped() {
        let progress = threshold_progress(dec!(750), Some(dec!(500)), Some(dec!(1000)));
        assert_close(progress.min_progress, 1.5);
        assert_close(progress.max_progress, 0.75);
        assert_eq!(progress.current_spend, dec!(750));

        let none = threshold_progress(dec!(750), None, None);
        assert_eq!(none.min_progress, 0.0);
        assert_eq!(none.max_progress, 0.0);
    }

    #[test]
    fn test_cap_below_minimum_tracks_unlock() {
        let card = capped_card(vec![Expense::new(dec!(600), at(2025, 5, 2)).with_bonus(BonusCategory::Online)]);
        let summary = summarize(&card, at(2025, 5, 20));
        let online = summary.cap_for(BonusCategory::Online).unwrap();

        assert_eq!(
            online.status,
            CategoryCapStatus::BelowMinimum { spent: dec!(600), min_required: dec!(1000) }
        );
        assert_close(online.progress, 0.6);
        assert!(!online.status.is_earning_bonus());
    }

    #[test]
    fn test_cap_in_progress_tracks_cap() {
        let card = capped_card(vec![
            Expense::new(dec!(1000), at(2025, 5, 2)).with_bonus(BonusCategory::Online),
            Expense::new(dec!(150), at(2025, 5, 3)).with_bonus(BonusCategory::Online),
        ]);
        let summary = summarize(&card, at(2025, 5, 20));
        let online = summary.cap_for(BonusCategory::Online).unwrap();

        assert_eq!(online.status, CategoryCapStatus::InProgress { spent: dec!(1150), cap: dec!(1200) });
        assert_close(online.progress, 1150.0 / 1200.0);
        assert!(online.status.is_earning_bonus());
    }

    #[test]
    fn test_cap_maxed_out() {
        let card = capped_card(vec![Expense::new(dec!(1200), at(2025, 5, 2)).with_bonus(BonusCategory::Online)]);
        let summary = summarize(&card, at(2025, 5, 20));
        let online = summary.cap_for(BonusCategory::Online).unwrap();

        assert_eq!(online.status, CategoryCapStatus::MaxedOut { cap: dec!(1200) });
        assert_close(online.progress, 1.0);
    }

    #[test]
    fn test_cap_without_minimum_goes_straight_to_cap_progress() {
        assert_eq!(
            category_cap_status(dec!(0), None, dec!(500)),
            CategoryCapStatus::InProgress { spent: dec!(0), cap: dec!(500) }
        );
        assert_eq!(category_cap_status(dec!(650), None, dec!(500)), CategoryCapStatus::MaxedOut { cap: dec!(500) });
    }

    #[test]
    fn test_untagged_expenses_count_toward_general_cap() {
        let mut card = Card::new("Everyday", CyclePolicy::CalendarMonth);
        card.has_category_caps = true;
        card.category_caps = vec![
            cap(BonusCategory::General, None, dec!(100)),
            cap(BonusCategory::Dining, None, dec!(100)),
        ];
        card.expenses = vec![
            Expense::new(dec!(40), at(2025, 5, 2)),
            Expense::new(dec!(25), at(2025, 5, 3)).with_bonus(BonusCategory::Dining),
            // tagged for a category with no cap: counted in totals only
            Expense::new(dec!(70), at(2025, 5, 4)).with_bonus(BonusCategory::Fuel),
        ];
        let summary = summarize(&card, at(2025, 5, 20));

        assert_eq!(summary.total_spending, dec!(135));
        assert_eq!(summary.cap_for(BonusCategory::General).unwrap().spent, dec!(40));
        assert_eq!(summary.cap_for(BonusCategory::Dining).unwrap().spent, dec!(25));
        assert!(summary.cap_for(BonusCategory::Fuel).is_none());
        assert_eq!(summary.category_spending[&BonusCategory::Fuel], dec!(70));
    }

    #[test]
    fn test_caps_skipped_when_flag_off_or_list_empty() {
        let mut card = capped_card(vec![Expense::new(dec!(50), at(2025, 5, 2))]);
        card.has_category_caps = false;
        assert!(summarize(&card, at(2025, 5, 20)).category_cap_progress.is_empty());

        card.has_category_caps = true;
        card.category_caps.clear();
        assert!(summarize(&card, at(2025, 5, 20)).category_cap_progress.is_empty());
    }

    #[test]
    fn test_summary_uses_statement_cycle() {
        let mut card = Card::new("Altitude", CyclePolicy::StatementMonth { day: 15 });
        card.min_spending_threshold = Some(dec!(500));
        card.max_spending_threshold = Some(dec!(1000));
        card.expenses = vec![
            Expense::new(dec!(300), at(2024, 12, 14)),
            Expense::new(dec!(400), at(2024, 12, 15)),
            Expense::new(dec!(200), at(2025, 1, 14)),
            Expense::new(dec!(900), at(2025, 1, 15)),
        ];
        let summary = summarize(&card, at(2025, 1, 10));

        assert_eq!(summary.date_range.start.date(), NaiveDate::from_ymd_opt(2024, 12, 15).unwrap());
        assert_eq!(summary.total_spending, dec!(600));
        assert_eq!(summary.threshold_status, ThresholdStatus::InRange);
        assert_close(summary.threshold_progress.min_progress, 1.2);
        assert_close(summary.threshold_progress.max_progress, 0.6);
    }

    #[test]
    fn test_summarize_is_idempotent() {
        let mut card = capped_card(vec![
            Expense::new(dec!(10.10), at(2025, 5, 2)).with_bonus(BonusCategory::Online),
            Expense::new(dec!(5.05), at(2025, 5, 9)),
        ]);
        card.min_spending_threshold = Some(dec!(800));
        let reference = at(2025, 5, 20);

        assert_eq!(summarize(&card, reference), summarize(&card, reference));
    }

    #[test]
    fn test_monthly_overview_spans_all_cards_on_calendar_month() {
        let mut a = Card::new("A", CyclePolicy::StatementMonth { day: 20 });
        a.expenses = vec![Expense::new(dec!(10), at(2025, 2, 1)), Expense::new(dec!(99), at(2025, 1, 31))];
        let mut b = Card::new("B", CyclePolicy::CalendarMonth);
        b.expenses = vec![Expense::new(dec!(5.5), at(2025, 2, 28))];

        let overview = monthly_overview(&[a, b], at(2025, 2, 10));
        assert_eq!(overview.total_spending, dec!(15.5));
        assert_eq!(overview.card_count, 2);
        assert_eq!(overview.month, "February 2025");
    }
}
