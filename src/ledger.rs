//! The live transaction table. Every write here appends its history row in
//! the same SQLite transaction.

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use crate::accounts;
use crate::dates::YearMonth;
use crate::error::{HearthError, Result};
use crate::history;
use crate::models::{Operation, Posting, Transaction, Window};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Oldest first: date, then id.
    Ascending,
    Descending,
}

const SELECT_TRANSACTION: &str = "
    SELECT t.id, t.version, t.date, t.debit_id, t.credit_id, t.amount, t.note,
           t.start_month, t.end_month, COALESCE(d.name, ''), COALESCE(c.name, '')
    FROM transactions t
    LEFT JOIN accounts d ON d.id = t.debit_id
    LEFT JOIN accounts c ON c.id = t.credit_id";

/// Read the `(start_month, end_month)` pair at `idx` and `idx + 1`.
pub(crate) fn window_at(row: &Row, idx: usize) -> rusqlite::Result<Option<Window>> {
    let start: i64 = row.get(idx)?;
    let end: i64 = row.get(idx + 1)?;
    Window::from_columns(start, end)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

fn row_to_transaction(row: &Row) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        version: row.get(1)?,
        posting: Posting {
            date: row.get(2)?,
            debit_id: row.get(3)?,
            credit_id: row.get(4)?,
            amount: row.get(5)?,
            note: row.get(6)?,
            window: window_at(row, 7)?,
        },
        debit_name: row.get(9)?,
        credit_name: row.get(10)?,
    })
}

pub(crate) fn query(conn: &Connection, tail: &str, args: impl rusqlite::Params) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(&format!("{SELECT_TRANSACTION} {tail}"))?;
    let transactions = stmt
        .query_map(args, row_to_transaction)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(transactions)
}

pub fn get(conn: &Connection, id: i64) -> Result<Transaction> {
    query(conn, "WHERE t.id = ?1", [id])?
        .into_iter()
        .next()
        .ok_or_else(|| HearthError::NotFound(format!("transaction {id}")))
}

pub fn list_all(conn: &Connection, order: Order) -> Result<Vec<Transaction>> {
    let tail = match order {
        Order::Ascending => "ORDER BY t.date, t.id",
        Order::Descending => "ORDER BY t.date DESC, t.id DESC",
    };
    query(conn, tail, [])
}

pub fn list_by_month(conn: &Connection, month: YearMonth) -> Result<Vec<Transaction>> {
    query(
        conn,
        "WHERE substr(t.date, 1, 7) = ?1 ORDER BY t.date, t.id",
        [month.to_string()],
    )
}

fn validate(conn: &Connection, posting: &Posting) -> Result<()> {
    if !accounts::exists(conn, posting.debit_id)? {
        return Err(HearthError::MissingAccount(format!("debit {}", posting.debit_id)));
    }
    if !accounts::exists(conn, posting.credit_id)? {
        return Err(HearthError::MissingAccount(format!("credit {}", posting.credit_id)));
    }
    if let Some(w) = posting.window {
        Window::new(w.start, w.end)?;
    }
    if posting.note.contains(['\t', '\n']) {
        return Err(HearthError::validation("note", "must be a single line without tabs"));
    }
    Ok(())
}

fn current_version(conn: &Connection, id: i64) -> Result<i64> {
    conn.query_row("SELECT version FROM transactions WHERE id = ?1", [id], |row| row.get(0))
        .optional()?
        .ok_or_else(|| HearthError::NotFound(format!("transaction {id}")))
}

/// Insert at version 0 and record the creation. No transaction is opened.
pub(crate) fn insert(conn: &Connection, posting: &Posting) -> Result<i64> {
    validate(conn, posting)?;
    let (start, end) = Window::to_columns(posting.window);
    conn.execute(
        "INSERT INTO transactions (version, date, debit_id, credit_id, amount, note, start_month, end_month)
         VALUES (0, ?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            posting.date,
            posting.debit_id,
            posting.credit_id,
            posting.amount,
            posting.note,
            start,
            end
        ],
    )?;
    let id = conn.last_insert_rowid();
    history::append(conn, Operation::Insert, id, 0, posting)?;
    info!(id, amount = posting.amount, "transaction added");
    Ok(id)
}

pub(crate) fn update(conn: &Connection, id: i64, posting: &Posting) -> Result<i64> {
    let version = current_version(conn, id)? + 1;
    validate(conn, posting)?;
    let (start, end) = Window::to_columns(posting.window);
    conn.execute(
        "UPDATE transactions
         SET version = ?2, date = ?3, debit_id = ?4, credit_id = ?5, amount = ?6, note = ?7,
             start_month = ?8, end_month = ?9
         WHERE id = ?1",
        params![
            id,
            version,
            posting.date,
            posting.debit_id,
            posting.credit_id,
            posting.amount,
            posting.note,
            start,
            end
        ],
    )?;
    history::append(conn, Operation::Update, id, version, posting)?;
    info!(id, version, "transaction edited");
    Ok(version)
}

pub(crate) fn delete(conn: &Connection, id: i64) -> Result<()> {
    let current = get(conn, id)?;
    history::append(conn, Operation::Delete, id, current.version, &current.posting)?;
    conn.execute("DELETE FROM transactions WHERE id = ?1", [id])?;
    info!(id, version = current.version, "transaction removed");
    Ok(())
}

/// Bring a removed transaction back under its old id, continuing its lineage at `version`.
pub(crate) fn restore(conn: &Connection, id: i64, version: i64, posting: &Posting) -> Result<()> {
    if current_version(conn, id).is_ok() {
        return Err(HearthError::Consistency(format!(
            "transaction {id} is still live and cannot be restored"
        )));
    }
    validate(conn, posting)?;
    let (start, end) = Window::to_columns(posting.window);
    conn.execute(
        "INSERT INTO transactions (id, version, date, debit_id, credit_id, amount, note, start_month, end_month)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            id,
            version,
            posting.date,
            posting.debit_id,
            posting.credit_id,
            posting.amount,
            posting.note,
            start,
            end
        ],
    )?;
    history::append(conn, Operation::Insert, id, version, posting)?;
    info!(id, version, "transaction restored");
    Ok(())
}

/// Add a transaction; returns its id.
pub fn add(conn: &Connection, posting: &Posting) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    let id = insert(&tx, posting)?;
    tx.commit()?;
    Ok(id)
}

/// Replace a transaction's content; returns the new version.
pub fn edit(conn: &Connection, id: i64, posting: &Posting) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    let version = update(&tx, id, posting)?;
    tx.commit()?;
    Ok(version)
}

pub fn remove(conn: &Connection, id: i64) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    delete(&tx, id)?;
    tx.commit()?;
    Ok(())
}
