use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cycle::CyclePolicy;
use crate::error::{Result, TrackerError};
use crate::money::parse_amount;

/// Declares a closed tag set with a stable storage string, a display name and
/// a forgiving `FromStr` (case, spaces, dashes and underscores are ignored).
macro_rules! tag_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => ($key:literal, $display:literal)),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Storage key, as written to the database.
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $key),+
                }
            }

            pub fn display_name(self) -> &'static str {
                match self {
                    $($name::$variant => $display),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.display_name())
            }
        }

        impl FromStr for $name {
            type Err = TrackerError;

            fn from_str(s: &str) -> Result<Self> {
                let wanted = normalize_tag(s);
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| normalize_tag(v.as_str()) == wanted || normalize_tag(v.display_name()) == wanted)
                    .ok_or_else(|| TrackerError::Invalid(format!("unknown {} '{}'", stringify!($name), s)))
            }
        }
    };
}

fn normalize_tag(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .flat_map(char::to_lowercase)
        .collect()
}

tag_enum!(
    /// Issuing bank.
    Bank {
        Dbs => ("dbs", "DBS"),
        Uob => ("uob", "UOB"),
        Ocbc => ("ocbc", "OCBC"),
        Citibank => ("citibank", "Citibank"),
        Hsbc => ("hsbc", "HSBC"),
        StanChart => ("stan_chart", "Standard Chartered"),
        Amex => ("amex", "AMEX"),
        Maybank => ("maybank", "Maybank"),
        Other => ("other", "Other"),
    }
);

tag_enum!(
    CardNetwork {
        Visa => ("visa", "Visa"),
        Mastercard => ("mastercard", "Mastercard"),
        Amex => ("amex", "AMEX"),
        Other => ("other", "Other"),
    }
);

tag_enum!(
    /// Attributes an expense to a category cap. Untagged expenses count as
    /// `General`.
    BonusCategory {
        Online => ("online", "Online"),
        Contactless => ("contactless", "Contactless"),
        ForeignCurrency => ("foreign_currency", "Foreign Currency"),
        Dining => ("dining", "Dining"),
        Travel => ("travel", "Travel"),
        Groceries => ("groceries", "Groceries"),
        Transport => ("transport", "Transport"),
        Shopping => ("shopping", "Shopping"),
        Fuel => ("fuel", "Fuel"),
        General => ("general", "General"),
    }
);

tag_enum!(
    /// Display/filter tag only; never used in calculations.
    ExpenseCategory {
        Dining => ("dining", "Dining"),
        Transport => ("transport", "Transport"),
        Shopping => ("shopping", "Shopping"),
        Groceries => ("groceries", "Groceries"),
        Online => ("online", "Online"),
        Travel => ("travel", "Travel"),
        Utilities => ("utilities", "Utilities"),
        Others => ("others", "Others"),
    }
);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Card {
    pub id: i64,
    pub bank: Bank,
    pub network: CardNetwork,
    pub name: String,
    pub last_four: Option<String>,
    pub cycle: CyclePolicy,
    pub min_spending_threshold: Option<Decimal>,
    pub max_spending_threshold: Option<Decimal>,
    /// Kept in step with `category_caps` by the writer; readers treat an empty
    /// list as "no caps" regardless of this flag.
    pub has_category_caps: bool,
    pub category_caps: Vec<CategoryCap>,
    pub local_earn_rate: Option<f64>,
    pub foreign_earn_rate: Option<f64>,
    pub base_miles_rate: Option<f64>,
    pub reward_notes: Option<String>,
    /// User-controlled sort key.
    pub display_order: i64,
    #[serde(skip)]
    pub expenses: Vec<Expense>,
}

impl Card {
    pub fn new(name: impl Into<String>, cycle: CyclePolicy) -> Self {
        Self {
            id: 0,
            bank: Bank::Other,
            network: CardNetwork::Other,
            name: name.into(),
            last_four: None,
            cycle,
            min_spending_threshold: None,
            max_spending_threshold: None,
            has_category_caps: false,
            category_caps: Vec::new(),
            local_earn_rate: None,
            foreign_earn_rate: None,
            base_miles_rate: None,
            reward_notes: None,
            display_order: 0,
            expenses: Vec::new(),
        }
    }

    /// "Altitude Visa •••• 1234" when the last four digits are known.
    pub fn display_name(&self) -> String {
        match self.last_four.as_deref() {
            Some(digits) if !digits.is_empty() => format!("{} •••• {}", self.name, digits),
            _ => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCap {
    pub id: i64,
    pub category: BonusCategory,
    /// Spend needed in the category before the bonus unlocks.
    pub min_spend: Option<Decimal>,
    /// Ceiling beyond which no further bonus accrues. Always positive.
    pub cap_amount: Decimal,
    pub bonus_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: i64,
    pub card_id: i64,
    pub amount: Decimal,
    pub date: NaiveDateTime,
    pub label: Option<String>,
    pub category: Option<ExpenseCategory>,
    pub bonus_category: Option<BonusCategory>,
}

impl Expense {
    pub fn new(amount: Decimal, date: NaiveDateTime) -> Self {
        Self {
            id: 0,
            card_id: 0,
            amount,
            date,
            label: None,
            category: None,
            bonus_category: None,
        }
    }

    pub fn with_bonus(mut self, bonus: BonusCategory) -> Self {
        self.bonus_category = Some(bonus);
        self
    }

    /// The cap bucket this expense counts toward.
    pub fn bonus_bucket(&self) -> BonusCategory {
        self.bonus_category.unwrap_or(BonusCategory::General)
    }
}

/// Input for a card insert; caps are added separately.
#[derive(Debug, Clone)]
pub struct NewCard {
    pub bank: Bank,
    pub network: CardNetwork,
    pub name: String,
    pub last_four: Option<String>,
    pub cycle: CyclePolicy,
    pub min_spending_threshold: Option<Decimal>,
    pub max_spending_threshold: Option<Decimal>,
    pub local_earn_rate: Option<f64>,
    pub foreign_earn_rate: Option<f64>,
    pub base_miles_rate: Option<f64>,
    pub reward_notes: Option<String>,
    pub display_order: i64,
}

impl NewCard {
    pub fn new(name: impl Into<String>, cycle: CyclePolicy) -> Self {
        Self {
            bank: Bank::Other,
            network: CardNetwork::Other,
            name: name.into(),
            last_four: None,
            cycle,
            min_spending_threshold: None,
            max_spending_threshold: None,
            local_earn_rate: None,
            foreign_earn_rate: None,
            base_miles_rate: None,
            reward_notes: None,
            display_order: 0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(TrackerError::Invalid("card name must not be empty".into()));
        }
        if let Some(digits) = &self.last_four {
            if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
                return Err(TrackerError::Invalid(format!(
                    "last four digits must be 4 digits, got '{digits}'"
                )));
            }
        }
        if let (Some(min), Some(max)) = (self.min_spending_threshold, self.max_spending_threshold) {
            if max < min {
                return Err(TrackerError::Invalid(format!(
                    "maximum threshold {max} is below minimum {min}"
                )));
            }
        }
        Ok(())
    }
}

impl From<&Card> for NewCard {
    fn from(card: &Card) -> Self {
        Self {
            bank: card.bank,
            network: card.network,
            name: card.name.clone(),
            last_four: card.last_four.clone(),
            cycle: card.cycle,
            min_spending_threshold: card.min_spending_threshold,
            max_spending_threshold: card.max_spending_threshold,
            local_earn_rate: card.local_earn_rate,
            foreign_earn_rate: card.foreign_earn_rate,
            base_miles_rate: card.base_miles_rate,
            reward_notes: card.reward_notes.clone(),
            display_order: card.display_order,
        }
    }
}

/// Field-wise edit of a stored card. `None` keeps the current value; the
/// `clear_*` flags drop an optional one and win over a value given alongside.
#[derive(Debug, Clone, Default)]
pub struct CardPatch {
    pub bank: Option<Bank>,
    pub network: Option<CardNetwork>,
    pub name: Option<String>,
    pub last_four: Option<String>,
    /// Replaces the whole policy, day included.
    pub cycle: Option<CyclePolicy>,
    /// Drops the statement day, leaving a calendar-month cycle.
    pub clear_statement_day: bool,
    pub min_spending_threshold: Option<Decimal>,
    pub clear_min_threshold: bool,
    pub max_spending_threshold: Option<Decimal>,
    pub clear_max_threshold: bool,
    pub local_earn_rate: Option<f64>,
    pub foreign_earn_rate: Option<f64>,
    pub base_miles_rate: Option<f64>,
    pub reward_notes: Option<String>,
}

impl CardPatch {
    pub fn apply_to(&self, card: &mut Card) {
        if let Some(bank) = self.bank {
            card.bank = bank;
        }
        if let Some(network) = self.network {
            card.network = network;
        }
        if let Some(name) = &self.name {
            card.name = name.clone();
        }
        if let Some(digits) = &self.last_four {
            card.last_four = Some(digits.clone());
        }
        if let Some(cycle) = self.cycle {
            card.cycle = cycle;
        }
        if self.clear_statement_day {
            card.cycle = CyclePolicy::CalendarMonth;
        }
        if let Some(min) = self.min_spending_threshold {
            card.min_spending_threshold = Some(min);
        }
        if self.clear_min_threshold {
            card.min_spending_threshold = None;
        }
        if let Some(max) = self.max_spending_threshold {
            card.max_spending_threshold = Some(max);
        }
        if self.clear_max_threshold {
            card.max_spending_threshold = None;
        }
        if let Some(rate) = self.local_earn_rate {
            card.local_earn_rate = Some(rate);
        }
        if let Some(rate) = self.foreign_earn_rate {
            card.foreign_earn_rate = Some(rate);
        }
        if let Some(rate) = self.base_miles_rate {
            card.base_miles_rate = Some(rate);
        }
        if let Some(notes) = &self.reward_notes {
            card.reward_notes = Some(notes.clone());
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewCategoryCap {
    pub category: BonusCategory,
    pub min_spend: Option<Decimal>,
    pub cap_amount: Decimal,
    pub bonus_rate: f64,
}

impl NewCategoryCap {
    pub fn validate(&self) -> Result<()> {
        if self.cap_amount <= Decimal::ZERO {
            return Err(TrackerError::Invalid(format!(
                "cap amount must be positive, got {}",
                self.cap_amount
            )));
        }
        if let Some(min) = self.min_spend {
            if min < Decimal::ZERO || min > self.cap_amount {
                return Err(TrackerError::Invalid(format!(
                    "minimum spend {min} must lie between 0 and the cap {}",
                    self.cap_amount
                )));
            }
        }
        Ok(())
    }
}

/// "online:1200", "online:1200:10" or "online:1200:10:1000" as
/// `category:cap[:rate[:min]]`; amounts may carry `$` and commas.
impl FromStr for NewCategoryCap {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split(':').map(str::trim);
        let category: BonusCategory = parts.next().unwrap_or_default().parse()?;
        let cap_amount = match parts.next() {
            Some(text) => parse_amount(text)?,
            None => return Err(TrackerError::Invalid(format!("cap '{s}' has no amount"))),
        };
        let bonus_rate = match parts.next() {
            Some(text) => text
                .parse::<f64>()
                .map_err(|e| TrackerError::Invalid(format!("'{text}' is not a rate: {e}")))?,
            None => 0.0,
        };
        let min_spend = parts.next().map(parse_amount).transpose()?;
        if parts.next().is_some() {
            return Err(TrackerError::Invalid(format!("cap '{s}' has too many parts")));
        }

        let cap = NewCategoryCap {
            category,
            min_spend,
            cap_amount,
            bonus_rate,
        };
        cap.validate()?;
        Ok(cap)
    }
}

#[derive(Debug, Clone)]
pub struct NewExpense {
    pub card_id: i64,
    pub amount: Decimal,
    pub date: NaiveDateTime,
    pub label: Option<String>,
    pub category: Option<ExpenseCategory>,
    pub bonus_category: Option<BonusCategory>,
}

impl NewExpense {
    pub fn validate(&self) -> Result<()> {
        if self.amount <= Decimal::ZERO {
            return Err(TrackerError::Invalid(format!(
                "expense amount must be positive, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}
