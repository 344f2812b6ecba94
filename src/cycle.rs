//! Billing-cycle date arithmetic.
//!
//! Every function here is total: statement days outside `1..=28` are clamped
//! and any month arithmetic that cannot be resolved falls back to the
//! calendar month of the reference date.

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Highest statement day honoured as-is; later days would be ambiguous in
/// short months.
pub const MAX_STATEMENT_DAY: u32 = 28;

/// How a card's spending period recurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CyclePolicy {
    /// Resets on the 1st of every month.
    CalendarMonth,
    /// Resets on a fixed day of the month (the statement date).
    StatementMonth { day: u32 },
}

impl CyclePolicy {
    /// Rebuilds a policy from its stored form. A statement cycle without a
    /// stored day starts on the 1st.
    pub fn from_parts(kind: &str, statement_day: Option<i64>) -> Option<Self> {
        match kind {
            "calendar_month" => Some(CyclePolicy::CalendarMonth),
            "statement_month" => {
                let day = u32::try_from(statement_day.unwrap_or(1)).unwrap_or(1);
                Some(CyclePolicy::StatementMonth { day })
            }
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CyclePolicy::CalendarMonth => "calendar_month",
            CyclePolicy::StatementMonth { .. } => "statement_month",
        }
    }

    /// The day as stored, before clamping.
    pub fn statement_day(&self) -> Option<u32> {
        match self {
            CyclePolicy::CalendarMonth => None,
            CyclePolicy::StatementMonth { day } => Some(*day),
        }
    }

    pub fn label(&self) -> String {
        match self {
            CyclePolicy::CalendarMonth => "Calendar month".to_string(),
            CyclePolicy::StatementMonth { day } => {
                format!("Statement day {}", (*day).clamp(1, MAX_STATEMENT_DAY))
            }
        }
    }
}

/// An inclusive span of whole days. `start` sits at 00:00:00 of the first
/// day; `end` is 23:59:59 of the last day for display only. Membership is by
/// calendar day, so the range really ends just before 00:00:00 of the day
/// after `end`, fractional seconds included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DateRange {
    pub fn from_days(first: NaiveDate, last: NaiveDate) -> Self {
        Self {
            start: start_of_day(first),
            end: end_of_day(last),
        }
    }

    /// True when `at` falls on any day between the first and last day,
    /// including instants past `end` but before the next midnight.
    pub fn contains(&self, at: NaiveDateTime) -> bool {
        let day = at.date();
        day >= self.start.date() && day <= self.end.date()
    }

    /// Whole days left before the range closes. Zero or less means the
    /// cycle resets today.
    pub fn days_until_end(&self, now: NaiveDateTime) -> i64 {
        (self.end.date() - now.date()).num_days()
    }

    /// "8 DAYS", "1 DAY", "RESETS TODAY", or the closing date ("FEB 14")
    /// once it is more than two weeks out.
    pub fn reset_label(&self, now: NaiveDateTime) -> String {
        match self.days_until_end(now) {
            n if n <= 0 => "RESETS TODAY".to_string(),
            1 => "1 DAY".to_string(),
            n if n <= 14 => format!("{n} DAYS"),
            _ => self.end.format("%b %-d").to_string().to_uppercase(),
        }
    }

    /// "Jan 15 - Feb 14"
    pub fn label(&self) -> String {
        format!("{} - {}", self.start.format("%b %-d"), self.end.format("%b %-d"))
    }
}

/// The cycle of `policy` that contains `reference`.
pub fn current_cycle(policy: CyclePolicy, reference: NaiveDateTime) -> DateRange {
    match policy {
        CyclePolicy::CalendarMonth => calendar_month_range(reference),
        CyclePolicy::StatementMonth { day } => statement_cycle(day, reference.date())
            .unwrap_or_else(|| {
                warn!(day, %reference, "statement cycle unresolved, using calendar month");
                calendar_month_range(reference)
            }),
    }
}

/// The literal calendar month of `reference`, whatever any card's policy.
pub fn calendar_month_range(reference: NaiveDateTime) -> DateRange {
    let today = reference.date();
    let first = today.with_day(1).unwrap_or(today);
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(today);
    DateRange::from_days(first, last)
}

fn statement_cycle(day: u32, today: NaiveDate) -> Option<DateRange> {
    let day = day.clamp(1, MAX_STATEMENT_DAY);
    if today.day() >= day {
        let first = today.with_day(day)?;
        let last = first.checked_add_months(Months::new(1))?.pred_opt()?;
        Some(DateRange::from_days(first, last))
    } else {
        let first = today.checked_sub_months(Months::new(1))?.with_day(day)?;
        let last = today.with_day(day)?.pred_opt()?;
        Some(DateRange::from_days(first, last))
    }
}

fn start_of_day(day: NaiveDate) -> NaiveDateTime {
    day.and_time(NaiveTime::MIN)
}

fn end_of_day(day: NaiveDate) -> NaiveDateTime {
    start_of_day(day) + Duration::seconds(86_399)
}
