use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tabled::Table;

use miles_tracker::config::Config;
use miles_tracker::cycle::{CyclePolicy, calendar_month_range, current_cycle};
use miles_tracker::db::{self, CardRepository};
use miles_tracker::models::{
    Bank, BonusCategory, CardNetwork, CardPatch, ExpenseCategory, NewCard, NewCategoryCap, NewExpense,
};
use miles_tracker::money::{format_sgd, parse_amount};
use miles_tracker::report::{CapRow, CardRow, ExpenseRow, SummaryRow};
use miles_tracker::spending::{monthly_overview, summarize_all};

/// Credit Card Miles Tracker: see where every card stands this cycle
#[derive(Parser)]
#[command(name = "miles-tracker", version, about)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a new credit card
    AddCard {
        /// Card name (e.g. "Altitude Visa Signature")
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "other")]
        bank: Bank,
        #[arg(long, default_value = "other")]
        network: CardNetwork,
        /// Last four digits, shown next to the name
        #[arg(long)]
        last_four: Option<String>,
        /// Statement day (1-28); omit for calendar-month cycles
        #[arg(long)]
        statement_day: Option<u32>,
        /// Minimum spend per cycle to earn the bonus
        #[arg(long, value_parser = parse_amount)]
        min_spend: Option<Decimal>,
        /// Spend per cycle beyond which the bonus stops
        #[arg(long, value_parser = parse_amount)]
        max_spend: Option<Decimal>,
        /// Local miles per dollar
        #[arg(long)]
        local_rate: Option<f64>,
        /// Foreign-currency miles per dollar
        #[arg(long)]
        foreign_rate: Option<f64>,
        /// Base miles per dollar
        #[arg(long)]
        base_rate: Option<f64>,
        #[arg(long)]
        notes: Option<String>,
        /// Sort position in listings
        #[arg(long, default_value_t = 0)]
        order: i64,
    },

    /// Edit a card; only the given fields change
    EditCard {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        bank: Option<Bank>,
        #[arg(long)]
        network: Option<CardNetwork>,
        #[arg(long)]
        last_four: Option<String>,
        /// Switch to a statement cycle on this day (1-28)
        #[arg(long, conflicts_with = "clear_statement_day")]
        statement_day: Option<u32>,
        /// Switch to calendar-month cycles
        #[arg(long)]
        clear_statement_day: bool,
        #[arg(long, value_parser = parse_amount, conflicts_with = "clear_min")]
        min_spend: Option<Decimal>,
        #[arg(long)]
        clear_min: bool,
        #[arg(long, value_parser = parse_amount, conflicts_with = "clear_max")]
        max_spend: Option<Decimal>,
        #[arg(long)]
        clear_max: bool,
        #[arg(long)]
        local_rate: Option<f64>,
        #[arg(long)]
        foreign_rate: Option<f64>,
        #[arg(long)]
        base_rate: Option<f64>,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Move a card to a position in the listing (0 = first)
    MoveCard {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        to: usize,
    },

    /// List all saved credit cards
    ListCards,

    /// Remove a credit card with its caps and expenses
    RemoveCard {
        #[arg(long)]
        id: i64,
    },

    /// Add a bonus category cap to a card
    AddCap {
        #[arg(long)]
        card: i64,
        /// Bonus category (e.g. "online", "dining", "general")
        #[arg(long)]
        category: BonusCategory,
        /// Category spend needed before the bonus unlocks
        #[arg(long, value_parser = parse_amount)]
        min_spend: Option<Decimal>,
        /// Category spend at which the bonus is exhausted
        #[arg(long, value_parser = parse_amount)]
        cap: Decimal,
        /// Bonus miles per dollar
        #[arg(long, default_value_t = 0.0)]
        rate: f64,
    },

    /// Replace all of a card's category caps; no --cap clears them
    SetCaps {
        #[arg(long)]
        card: i64,
        /// "category:cap[:rate[:min]]", e.g. "online:1200:10:1000"; repeatable
        #[arg(long = "cap")]
        caps: Vec<NewCategoryCap>,
    },

    /// Remove a category cap by ID
    RemoveCap {
        #[arg(long)]
        id: i64,
    },

    /// Log an expense against a card
    AddExpense {
        #[arg(long)]
        card: i64,
        /// Amount in SGD (e.g. 12.50)
        #[arg(long, value_parser = parse_amount)]
        amount: Decimal,
        /// When it happened: "YYYY-MM-DD" or "YYYY-MM-DD HH:MM" (default: now)
        #[arg(long, value_parser = parse_moment)]
        at: Option<NaiveDateTime>,
        /// Short note (e.g. "Chicken rice")
        #[arg(long)]
        label: Option<String>,
        #[arg(long)]
        category: Option<ExpenseCategory>,
        /// Category cap this counts toward (default: general)
        #[arg(long)]
        bonus: Option<BonusCategory>,
    },

    /// Remove an expense by ID
    RemoveExpense {
        #[arg(long)]
        id: i64,
    },

    /// List expenses in a card's current cycle, or this month across all cards
    ListExpenses {
        #[arg(long)]
        card: Option<i64>,
        /// Reference day (default: today)
        #[arg(long, value_parser = parse_moment)]
        date: Option<NaiveDateTime>,
    },

    /// Show cycle spending, threshold status and cap progress
    Summary {
        /// Only this card (default: all cards)
        #[arg(long)]
        card: Option<i64>,
        /// Reference day (default: today)
        #[arg(long, value_parser = parse_moment)]
        date: Option<NaiveDateTime>,
    },

    /// Total spending this calendar month across all cards
    Overview {
        #[arg(long, value_parser = parse_moment)]
        date: Option<NaiveDateTime>,
    },
}

/// Accepts "YYYY-MM-DD", "YYYY-MM-DD HH:MM" or "YYYY-MM-DD HH:MM:SS".
fn parse_moment(text: &str) -> std::result::Result<NaiveDateTime, String> {
    let text = text.trim();
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(moment) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(moment);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map(|day| day.and_time(NaiveTime::MIN))
        .map_err(|_| format!("'{text}' is not a date (expected YYYY-MM-DD [HH:MM])"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    miles_tracker::init_tracing(&cli.config.log_filter);

    let conn = db::init_db(&cli.config.db_path)
        .with_context(|| format!("Failed to open database {}", cli.config.db_path.display()))?;
    let now = Local::now().naive_local();

    match cli.command {
        Commands::AddCard {
            name,
            bank,
            network,
            last_four,
            statement_day,
            min_spend,
            max_spend,
            local_rate,
            foreign_rate,
            base_rate,
            notes,
            order,
        } => {
            let cycle = match statement_day {
                Some(day) => CyclePolicy::StatementMonth { day },
                None => CyclePolicy::CalendarMonth,
            };
            let card = NewCard {
                bank,
                network,
                name,
                last_four,
                cycle,
                min_spending_threshold: min_spend,
                max_spending_threshold: max_spend,
                local_earn_rate: local_rate,
                foreign_earn_rate: foreign_rate,
                base_miles_rate: base_rate,
                reward_notes: notes,
                display_order: order,
            };
            let id = db::add_card(&conn, &card).context("Failed to add card")?;
            println!("Added card '{}' with ID {} ({})", card.name, id, cycle.label());
        }

        Commands::EditCard {
            id,
            name,
            bank,
            network,
            last_four,
            statement_day,
            clear_statement_day,
            min_spend,
            clear_min,
            max_spend,
            clear_max,
            local_rate,
            foreign_rate,
            base_rate,
            notes,
        } => {
            let patch = CardPatch {
                bank,
                network,
                name,
                last_four,
                cycle: statement_day.map(|day| CyclePolicy::StatementMonth { day }),
                clear_statement_day,
                min_spending_threshold: min_spend,
                clear_min_threshold: clear_min,
                max_spending_threshold: max_spend,
                clear_max_threshold: clear_max,
                local_earn_rate: local_rate,
                foreign_earn_rate: foreign_rate,
                base_miles_rate: base_rate,
                reward_notes: notes,
            };
            let card = db::update_card(&conn, id, &patch).context("Failed to update card")?;
            println!("Updated card {} '{}' ({})", id, card.display_name(), card.cycle.label());
        }

        Commands::MoveCard { id, to } => {
            db::move_card(&conn, id, to).context("Failed to move card")?;
            println!("Moved card {} to position {}", id, to);
        }

        Commands::ListCards => {
            let cards = conn.list_cards().context("Failed to list cards")?;
            if cards.is_empty() {
                println!("No cards found. Add one with: miles-tracker add-card --name \"...\"");
            } else {
                let rows: Vec<CardRow> = cards.iter().map(CardRow::from).collect();
                println!("{}", Table::new(rows));
            }
        }

        Commands::RemoveCard { id } => {
            let removed = db::remove_card(&conn, id).context("Failed to remove card")?;
            if removed {
                println!("Removed card with ID {} and its expenses", id);
            } else {
                println!("No card found with ID {}", id);
            }
        }

        Commands::AddCap {
            card,
            category,
            min_spend,
            cap,
            rate,
        } => {
            let new_cap = NewCategoryCap {
                category,
                min_spend,
                cap_amount: cap,
                bonus_rate: rate,
            };
            let id = db::add_category_cap(&conn, card, &new_cap).context("Failed to add category cap")?;
            println!("Added {} cap of {} to card {} (cap ID {})", category, format_sgd(cap), card, id);
        }

        Commands::SetCaps { card, caps } => {
            let ids = db::replace_category_caps(&conn, card, &caps).context("Failed to set category caps")?;
            if ids.is_empty() {
                println!("Cleared all caps on card {}", card);
            } else {
                println!("Card {} now has {} cap(s)", card, ids.len());
            }
        }

        Commands::RemoveCap { id } => {
            if db::remove_category_cap(&conn, id).context("Failed to remove category cap")? {
                println!("Removed cap with ID {}", id);
            } else {
                println!("No cap found with ID {}", id);
            }
        }

        Commands::AddExpense {
            card,
            amount,
            at,
            label,
            category,
            bonus,
        } => {
            let expense = NewExpense {
                card_id: card,
                amount,
                date: at.unwrap_or(now),
                label,
                category,
                bonus_category: bonus,
            };
            let id = db::add_expense(&conn, &expense).context("Failed to add expense")?;
            println!("Logged {} on card {} (expense ID {})", format_sgd(amount), card, id);
        }

        Commands::RemoveExpense { id } => {
            if db::remove_expense(&conn, id).context("Failed to remove expense")? {
                println!("Removed expense with ID {}", id);
            } else {
                println!("No expense found with ID {}", id);
            }
        }

        Commands::ListExpenses { card, date } => {
            let reference = date.unwrap_or(now);
            let (range, expenses) = match card {
                Some(id) => {
                    let Some(card) = conn.get_card(id).context("Failed to load card")? else {
                        bail!("No card found with ID {}", id);
                    };
                    let range = current_cycle(card.cycle, reference);
                    (range, conn.list_expenses(id, &range).context("Failed to list expenses")?)
                }
                None => {
                    let range = calendar_month_range(reference);
                    (range, db::expenses_in_range(&conn, &range).context("Failed to list expenses")?)
                }
            };
            if expenses.is_empty() {
                println!("No expenses between {}", range.label());
            } else {
                let rows: Vec<ExpenseRow> = expenses.iter().map(ExpenseRow::from).collect();
                println!("Expenses {}:", range.label());
                println!("{}", Table::new(rows));
            }
        }

        Commands::Summary { card, date } => {
            let reference = date.unwrap_or(now);
            let cards = match card {
                Some(id) => match conn.get_card(id).context("Failed to load card")? {
                    Some(card) => vec![card],
                    None => bail!("No card found with ID {}", id),
                },
                None => conn.list_cards().context("Failed to list cards")?,
            };
            if cards.is_empty() {
                println!("No cards found.");
                return Ok(());
            }

            let summaries = summarize_all(&cards, reference);
            let rows: Vec<SummaryRow> = summaries.iter().map(|s| SummaryRow::new(s, reference)).collect();
            println!("{}", Table::new(rows));

            let caps: Vec<CapRow> = summaries
                .iter()
                .flat_map(|s| s.category_cap_progress.iter().map(|cap| CapRow::new(s.card, cap)))
                .collect();
            if !caps.is_empty() {
                println!("{}", Table::new(caps));
            }
        }

        Commands::Overview { date } => {
            let cards = conn.list_cards().context("Failed to list cards")?;
            let overview = monthly_overview(&cards, date.unwrap_or(now));
            println!(
                "{}: {} across {} card(s)",
                overview.month,
                format_sgd(overview.total_spending),
                overview.card_count
            );
        }
    }

    Ok(())
}
