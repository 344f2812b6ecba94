use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};

use crate::cycle::{CyclePolicy, DateRange};
use crate::error::{Result, TrackerError};
use crate::models::{Card, CardPatch, CategoryCap, Expense, NewCard, NewCategoryCap, NewExpense};

/// Read side used by the summary code. Returns plain data; callers decide
/// when to re-read.
pub trait CardRepository {
    /// The card with its caps and every expense loaded.
    fn get_card(&self, id: i64) -> Result<Option<Card>>;
    /// All cards, fully loaded, by display order.
    fn list_cards(&self) -> Result<Vec<Card>>;
    /// One card's expenses inside `range`, newest first.
    fn list_expenses(&self, card_id: i64, range: &DateRange) -> Result<Vec<Expense>>;
}

/// Creates tables on the given connection.
pub fn init_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
        CREATE TABLE IF NOT EXISTS cards (
            id                      INTEGER PRIMARY KEY AUTOINCREMENT,
            bank                    TEXT NOT NULL,
            network                 TEXT NOT NULL,
            name                    TEXT NOT NULL,
            last_four               TEXT,
            cycle_type              TEXT NOT NULL DEFAULT 'calendar_month',
            statement_day           INTEGER,
            min_spending_threshold  TEXT,
            max_spending_threshold  TEXT,
            has_category_caps       INTEGER NOT NULL DEFAULT 0,
            local_earn_rate         REAL,
            foreign_earn_rate       REAL,
            base_miles_rate         REAL,
            reward_notes            TEXT,
            display_order           INTEGER NOT NULL DEFAULT 0
        );
        CREATE TABLE IF NOT EXISTS category_caps (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            card_id     INTEGER NOT NULL REFERENCES cards(id) ON DELETE CASCADE,
            category    TEXT NOT NULL,
            min_spend   TEXT,
            cap_amount  TEXT NOT NULL,
            bonus_rate  REAL NOT NULL DEFAULT 0.0
        );
        CREATE TABLE IF NOT EXISTS expenses (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            card_id         INTEGER NOT NULL REFERENCES cards(id) ON DELETE CASCADE,
            amount          TEXT NOT NULL,
            spent_at        TEXT NOT NULL,
            label           TEXT,
            category        TEXT,
            bonus_category  TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_expenses_card_spent_at ON expenses (card_id, spent_at);",
    )?;
    Ok(())
}

/// Opens (or creates) the SQLite database file and ensures tables exist.
pub fn init_db(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    init_tables(&conn)?;
    debug!(path = %path.display(), "database ready");
    Ok(conn)
}

pub fn add_card(conn: &Connection, card: &NewCard) -> Result<i64> {
    card.validate()?;
    conn.execute(
        "INSERT INTO cards (bank, network, name, last_four, cycle_type, statement_day,
                            min_spending_threshold, max_spending_threshold,
                            local_earn_rate, foreign_earn_rate, base_miles_rate,
                            reward_notes, display_order)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            card.bank.as_str(),
            card.network.as_str(),
            card.name,
            card.last_four,
            card.cycle.kind(),
            card.cycle.statement_day(),
            card.min_spending_threshold.map(|d| d.to_string()),
            card.max_spending_threshold.map(|d| d.to_string()),
            card.local_earn_rate,
            card.foreign_earn_rate,
            card.base_miles_rate,
            card.reward_notes,
            card.display_order,
        ],
    )?;
    let id = conn.last_insert_rowid();
    info!(card_id = id, name = %card.name, "card added");
    Ok(id)
}

/// Applies `patch` to the stored card and returns the result. The edited card
/// must pass the same checks as a new one; nothing is written otherwise.
pub fn update_card(conn: &Connection, id: i64, patch: &CardPatch) -> Result<Card> {
    let mut card = conn
        .get_card(id)?
        .ok_or_else(|| TrackerError::NotFound(format!("card {id}")))?;
    patch.apply_to(&mut card);
    NewCard::from(&card).validate()?;

    conn.execute(
        "UPDATE cards SET bank = ?1, network = ?2, name = ?3, last_four = ?4,
                          cycle_type = ?5, statement_day = ?6,
                          min_spending_threshold = ?7, max_spending_threshold = ?8,
                          local_earn_rate = ?9, foreign_earn_rate = ?10, base_miles_rate = ?11,
                          reward_notes = ?12
         WHERE id = ?13",
        params![
            card.bank.as_str(),
            card.network.as_str(),
            card.name,
            card.last_four,
            card.cycle.kind(),
            card.cycle.statement_day(),
            card.min_spending_threshold.map(|d| d.to_string()),
            card.max_spending_threshold.map(|d| d.to_string()),
            card.local_earn_rate,
            card.foreign_earn_rate,
            card.base_miles_rate,
            card.reward_notes,
            id,
        ],
    )?;
    info!(card_id = id, cycle = %card.cycle.label(), "card updated");
    Ok(card)
}

/// Swaps the card's whole cap set for `caps`. An empty slice removes every
/// cap and clears the flag.
pub fn replace_category_caps(conn: &Connection, card_id: i64, caps: &[NewCategoryCap]) -> Result<Vec<i64>> {
    for cap in caps {
        cap.validate()?;
    }
    ensure_card(conn, card_id)?;

    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM category_caps WHERE card_id = ?1", params![card_id])?;
    let ids = caps
        .iter()
        .map(|cap| insert_cap(&tx, card_id, cap))
        .collect::<Result<Vec<_>>>()?;
    tx.execute(
        "UPDATE cards SET has_category_caps = ?1 WHERE id = ?2",
        params![!caps.is_empty(), card_id],
    )?;
    tx.commit()?;

    info!(card_id, count = ids.len(), "category caps replaced");
    Ok(ids)
}

/// Rewrites `display_order` to each card's position in `ordered_ids`.
/// Cards not listed keep their current order value.
pub fn reorder_cards(conn: &Connection, ordered_ids: &[i64]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    for (position, id) in ordered_ids.iter().enumerate() {
        let changed = tx.execute(
            "UPDATE cards SET display_order = ?1 WHERE id = ?2",
            params![position as i64, *id],
        )?;
        if changed == 0 {
            return Err(TrackerError::NotFound(format!("card {id}")));
        }
    }
    tx.commit()?;
    debug!(count = ordered_ids.len(), "cards reordered");
    Ok(())
}

/// Moves one card to `position` in the listing (0 is first, past the end is
/// last) and renumbers every card.
pub fn move_card(conn: &Connection, card_id: i64, position: usize) -> Result<()> {
    let mut ids = {
        let mut stmt = conn.prepare("SELECT id FROM cards ORDER BY display_order, id")?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
        collect_rows(rows)?
    };

    let current = ids
        .iter()
        .position(|id| *id == card_id)
        .ok_or_else(|| TrackerError::NotFound(format!("card {card_id}")))?;
    let moved = ids.remove(current);
    ids.insert(position.min(ids.len()), moved);

    reorder_cards(conn, &ids)?;
    info!(card_id, position, "card moved");
    Ok(())
}

/// Deletes the card together with its caps and expenses.
pub fn remove_card(conn: &Connection, id: i64) -> Result<bool> {
    let changed = conn.execute("DELETE FROM cards WHERE id = ?1", params![id])?;
    if changed > 0 {
        info!(card_id = id, "card removed");
    }
    Ok(changed > 0)
}

pub fn add_category_cap(conn: &Connection, card_id: i64, cap: &NewCategoryCap) -> Result<i64> {
    cap.validate()?;
    ensure_card(conn, card_id)?;

    let tx = conn.unchecked_transaction()?;
    let id = insert_cap(&tx, card_id, cap)?;
    tx.execute("UPDATE cards SET has_category_caps = 1 WHERE id = ?1", params![card_id])?;
    tx.commit()?;

    info!(card_id, cap_id = id, category = %cap.category, "category cap added");
    Ok(id)
}

/// Drops a cap; the card's cap flag is cleared once its last cap is gone.
pub fn remove_category_cap(conn: &Connection, cap_id: i64) -> Result<bool> {
    let card_id: Option<i64> = conn
        .query_row(
            "SELECT card_id FROM category_caps WHERE id = ?1",
            params![cap_id],
            |row| row.get(0),
        )
        .optional()?;
    let Some(card_id) = card_id else {
        return Ok(false);
    };

    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM category_caps WHERE id = ?1", params![cap_id])?;
    tx.execute(
        "UPDATE cards SET has_category_caps =
            EXISTS (SELECT 1 FROM category_caps WHERE card_id = ?1)
         WHERE id = ?1",
        params![card_id],
    )?;
    tx.commit()?;
    Ok(true)
}

pub fn add_expense(conn: &Connection, expense: &NewExpense) -> Result<i64> {
    expense.validate()?;
    ensure_card(conn, expense.card_id)?;
    conn.execute(
        "INSERT INTO expenses (card_id, amount, spent_at, label, category, bonus_category)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            expense.card_id,
            expense.amount.to_string(),
            expense.date,
            expense.label,
            expense.category.map(|c| c.as_str()),
            expense.bonus_category.map(|c| c.as_str()),
        ],
    )?;
    let id = conn.last_insert_rowid();
    info!(card_id = expense.card_id, expense_id = id, amount = %expense.amount, "expense added");
    Ok(id)
}

pub fn remove_expense(conn: &Connection, id: i64) -> Result<bool> {
    let changed = conn.execute("DELETE FROM expenses WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

/// Expenses on every card inside `range`, newest first.
pub fn expenses_in_range(conn: &Connection, range: &DateRange) -> Result<Vec<Expense>> {
    let (from, until) = sql_bounds(range);
    let mut stmt = conn.prepare(
        "SELECT id, card_id, amount, spent_at, label, category, bonus_category
         FROM expenses
         WHERE spent_at >= ?1 AND spent_at < ?2
         ORDER BY spent_at DESC, id DESC",
    )?;
    let rows = stmt.query_map(params![from, until], expense_from_row)?;
    collect_rows(rows)
}

impl CardRepository for Connection {
    fn get_card(&self, id: i64) -> Result<Option<Card>> {
        let card = self
            .query_row(
                &format!("SELECT {CARD_COLUMNS} FROM cards WHERE id = ?1"),
                params![id],
                card_from_row,
            )
            .optional()?;
        match card {
            Some(card) => Ok(Some(load_children(self, card)?)),
            None => Ok(None),
        }
    }

    fn list_cards(&self) -> Result<Vec<Card>> {
        let mut stmt = self.prepare(&format!(
            "SELECT {CARD_COLUMNS} FROM cards ORDER BY display_order, id"
        ))?;
        let rows = stmt.query_map([], card_from_row)?;

        let mut cards = Vec::new();
        for card in rows {
            cards.push(load_children(self, card?)?);
        }
        Ok(cards)
    }

    fn list_expenses(&self, card_id: i64, range: &DateRange) -> Result<Vec<Expense>> {
        let (from, until) = sql_bounds(range);
        let mut stmt = self.prepare(
            "SELECT id, card_id, amount, spent_at, label, category, bonus_category
             FROM expenses
             WHERE card_id = ?1 AND spent_at >= ?2 AND spent_at < ?3
             ORDER BY spent_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![card_id, from, until], expense_from_row)?;
        collect_rows(rows)
    }
}

const CARD_COLUMNS: &str = "id, bank, network, name, last_four, cycle_type, statement_day,
    min_spending_threshold, max_spending_threshold, has_category_caps,
    local_earn_rate, foreign_earn_rate, base_miles_rate, reward_notes, display_order";

fn ensure_card(conn: &Connection, card_id: i64) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM cards WHERE id = ?1)",
        params![card_id],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(TrackerError::NotFound(format!("card {card_id}")))
    }
}

fn insert_cap(conn: &Connection, card_id: i64, cap: &NewCategoryCap) -> Result<i64> {
    conn.execute(
        "INSERT INTO category_caps (card_id, category, min_spend, cap_amount, bonus_rate)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            card_id,
            cap.category.as_str(),
            cap.min_spend.map(|d| d.to_string()),
            cap.cap_amount.to_string(),
            cap.bonus_rate,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn load_children(conn: &Connection, mut card: Card) -> Result<Card> {
    let mut stmt = conn.prepare(
        "SELECT id, category, min_spend, cap_amount, bonus_rate
         FROM category_caps WHERE card_id = ?1 ORDER BY id",
    )?;
    let caps = stmt.query_map(params![card.id], |row| {
        Ok(CategoryCap {
            id: row.get(0)?,
            category: parse_column(row, 1)?,
            min_spend: parse_optional_column(row, 2)?,
            cap_amount: parse_column(row, 3)?,
            bonus_rate: row.get(4)?,
        })
    })?;
    card.category_caps = collect_rows(caps)?;

    let mut stmt = conn.prepare(
        "SELECT id, card_id, amount, spent_at, label, category, bonus_category
         FROM expenses WHERE card_id = ?1
         ORDER BY spent_at DESC, id DESC",
    )?;
    let expenses = stmt.query_map(params![card.id], expense_from_row)?;
    card.expenses = collect_rows(expenses)?;
    Ok(card)
}

fn card_from_row(row: &Row<'_>) -> rusqlite::Result<Card> {
    let kind: String = row.get(5)?;
    let statement_day: Option<i64> = row.get(6)?;
    let cycle = CyclePolicy::from_parts(&kind, statement_day).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            Type::Text,
            Box::new(TrackerError::Invalid(format!("unknown cycle type '{kind}'"))),
        )
    })?;

    Ok(Card {
        id: row.get(0)?,
        bank: parse_column(row, 1)?,
        network: parse_column(row, 2)?,
        name: row.get(3)?,
        last_four: row.get(4)?,
        cycle,
        min_spending_threshold: parse_optional_column(row, 7)?,
        max_spending_threshold: parse_optional_column(row, 8)?,
        has_category_caps: row.get(9)?,
        category_caps: Vec::new(),
        local_earn_rate: row.get(10)?,
        foreign_earn_rate: row.get(11)?,
        base_miles_rate: row.get(12)?,
        reward_notes: row.get(13)?,
        display_order: row.get(14)?,
        expenses: Vec::new(),
    })
}

fn expense_from_row(row: &Row<'_>) -> rusqlite::Result<Expense> {
    Ok(Expense {
        id: row.get(0)?,
        card_id: row.get(1)?,
        amount: parse_column(row, 2)?,
        date: row.get(3)?,
        label: row.get(4)?,
        category: parse_optional_column(row, 5)?,
        bonus_category: parse_optional_column(row, 6)?,
    })
}

/// Reads a text column through `FromStr`; decimals and tags are stored this way.
fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_optional_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: Option<String> = row.get(idx)?;
    text.map(|text| {
        text.parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

/// Half-open `[first day 00:00, day after last 00:00)` so sub-second stamps on
/// the last day are kept, matching `DateRange::contains`.
fn sql_bounds(range: &DateRange) -> (NaiveDateTime, NaiveDateTime) {
    let from = range.start.date().and_time(chrono::NaiveTime::MIN);
    let until = range
        .end
        .date()
        .succ_opt()
        .map(|d| d.and_time(chrono::NaiveTime::MIN))
        .unwrap_or(range.end);
    (from, until)
}

fn collect_rows<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> Result<Vec<T>> {
    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}
