//! Append-only transaction history and the undo engine built on it.
//!
//! Rows are only ever inserted. For INSERT and UPDATE the snapshot is the
//! state after the write; for DELETE it is the state just before removal,
//! recorded at the version the transaction had at that moment.

use chrono::Local;
use rusqlite::{params, Connection, Row};
use tracing::info;

use crate::dates::YearMonth;
use crate::error::{HearthError, Result};
use crate::ledger::{self, window_at};
use crate::models::{HistoryEntry, Operation, Posting, Window};

const SELECT_HISTORY: &str = "
    SELECT h.history_id, h.operation, h.operate_time, h.transaction_id, h.version,
           h.date, h.debit_id, h.credit_id, h.amount, h.note, h.start_month, h.end_month,
           COALESCE(d.name, ''), COALESCE(c.name, '')
    FROM transactions_history h
    LEFT JOIN accounts d ON d.id = h.debit_id
    LEFT JOIN accounts c ON c.id = h.credit_id";

fn row_to_entry(row: &Row) -> rusqlite::Result<HistoryEntry> {
    Ok(HistoryEntry {
        history_id: row.get(0)?,
        operation: row.get(1)?,
        operate_time: row.get(2)?,
        transaction_id: row.get(3)?,
        version: row.get(4)?,
        posting: Posting {
            date: row.get(5)?,
            debit_id: row.get(6)?,
            credit_id: row.get(7)?,
            amount: row.get(8)?,
            note: row.get(9)?,
            window: window_at(row, 10)?,
        },
        debit_name: row.get(12)?,
        credit_name: row.get(13)?,
    })
}

fn query(conn: &Connection, tail: &str, args: impl rusqlite::Params) -> Result<Vec<HistoryEntry>> {
    let mut stmt = conn.prepare(&format!("{SELECT_HISTORY} {tail}"))?;
    let entries = stmt
        .query_map(args, row_to_entry)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(entries)
}

pub(crate) fn append(
    conn: &Connection,
    operation: Operation,
    transaction_id: i64,
    version: i64,
    posting: &Posting,
) -> Result<i64> {
    let (start, end) = Window::to_columns(posting.window);
    conn.execute(
        "INSERT INTO transactions_history
             (transaction_id, version, operation, operate_time, date, debit_id, credit_id,
              amount, note, start_month, end_month)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            transaction_id,
            version,
            operation,
            Local::now().naive_local(),
            posting.date,
            posting.debit_id,
            posting.credit_id,
            posting.amount,
            posting.note,
            start,
            end
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Every entry of one transaction, oldest first.
pub fn all_for(conn: &Connection, transaction_id: i64) -> Result<Vec<HistoryEntry>> {
    query(
        conn,
        "WHERE h.transaction_id = ?1 ORDER BY h.history_id",
        [transaction_id],
    )
}

/// The snapshot at exactly `version`. Anything other than one match means the
/// log has been tampered with.
pub fn at(conn: &Connection, transaction_id: i64, version: i64) -> Result<HistoryEntry> {
    let mut found = query(
        conn,
        "WHERE h.transaction_id = ?1 AND h.version = ?2",
        params![transaction_id, version],
    )?;
    if found.len() != 1 {
        return Err(HearthError::Consistency(format!(
            "expected one entry for transaction {transaction_id} at version {version}, found {}",
            found.len()
        )));
    }
    Ok(found.remove(0))
}

pub fn all(conn: &Connection) -> Result<Vec<HistoryEntry>> {
    query(conn, "ORDER BY h.history_id", [])
}

/// Entries whose operation time falls in `month`.
pub fn by_month(conn: &Connection, month: YearMonth) -> Result<Vec<HistoryEntry>> {
    query(
        conn,
        "WHERE substr(h.operate_time, 1, 7) = ?1 ORDER BY h.history_id",
        [month.to_string()],
    )
}

/// The latest entry of every transaction, newest first, leaving out entries
/// at version 0. An untouched creation is therefore not undoable here and has
/// to go through a plain remove.
pub fn list_undoable(conn: &Connection) -> Result<Vec<HistoryEntry>> {
    query(
        conn,
        "WHERE h.history_id IN (
             SELECT MAX(history_id) FROM transactions_history GROUP BY transaction_id
         )
         AND h.version > 0
         ORDER BY h.history_id DESC",
        [],
    )
}

/// The write that reverses one history entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    /// Re-insert a removed transaction under its old id.
    Restore {
        transaction_id: i64,
        version: i64,
        posting: Posting,
    },
    /// Edit the transaction back to the snapshot at `version`.
    Revert { transaction_id: i64, version: i64 },
    Remove { transaction_id: i64 },
}

pub fn compensation(entry: &HistoryEntry) -> Compensation {
    let transaction_id = entry.transaction_id;
    match entry.operation {
        Operation::Delete => Compensation::Restore {
            transaction_id,
            version: entry.version + 1,
            posting: entry.posting.clone(),
        },
        Operation::Update => Compensation::Revert {
            transaction_id,
            version: entry.version - 1,
        },
        Operation::Insert => Compensation::Remove { transaction_id },
    }
}

/// Undo one entry atomically. The compensating write is itself recorded.
pub fn undo(conn: &Connection, entry: &HistoryEntry) -> Result<Compensation> {
    let action = compensation(entry);
    let tx = conn.unchecked_transaction()?;
    let latest: Option<i64> = tx.query_row(
        "SELECT MAX(history_id) FROM transactions_history WHERE transaction_id = ?1",
        [entry.transaction_id],
        |row| row.get(0),
    )?;
    if latest != Some(entry.history_id) {
        return Err(HearthError::Consistency(format!(
            "transaction {} changed after history entry {}",
            entry.transaction_id, entry.history_id
        )));
    }
    match &action {
        Compensation::Restore {
            transaction_id,
            version,
            posting,
        } => ledger::restore(&tx, *transaction_id, *version, posting)?,
        Compensation::Revert {
            transaction_id,
            version,
        } => {
            let previous = at(&tx, *transaction_id, *version)?;
            ledger::update(&tx, *transaction_id, &previous.posting)?;
        }
        Compensation::Remove { transaction_id } => ledger::delete(&tx, *transaction_id)?,
    }
    tx.commit()?;
    info!(
        transaction_id = entry.transaction_id,
        operation = %entry.operation,
        version = entry.version,
        "undo applied"
    );
    Ok(action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use crate::ledger::tests::{posting, two_accounts};
    use crate::ledger::{self, Order};

    #[test]
    fn test_fresh_transaction_is_not_undoable() {
        let (_dir, conn) = test_db();
        let (cash, food) = two_accounts(&conn);
        let id = ledger::add(&conn, &posting(food, cash, 3000, "")).unwrap();

        let entries = all_for(&conn, id).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].operation, Operation::Insert);
        assert_eq!(entries[0].version, 0);
        assert!(list_undoable(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_undo_edit_restores_previous_fields() {
        let (_dir, conn) = test_db();
        let (cash, food) = two_accounts(&conn);
        let before = posting(food, cash, 3000, "groceries");
        let id = ledger::add(&conn, &before).unwrap();
        ledger::edit(&conn, id, &posting(cash, food, 9999, "oops")).unwrap();

        let undoable = list_undoable(&conn).unwrap();
        assert_eq!(undoable.len(), 1);
        assert_eq!(undoable[0].operation, Operation::Update);

        let action = undo(&conn, &undoable[0]).unwrap();
        assert_eq!(action, Compensation::Revert { transaction_id: id, version: 0 });

        let t = ledger::get(&conn, id).unwrap();
        assert_eq!(t.posting, before);
        assert_eq!(t.version, 2);
        assert_eq!(all_for(&conn, id).unwrap().len(), 3);

        // The undo itself can be undone.
        let latest = list_undoable(&conn).unwrap();
        assert_eq!(latest[0].version, 2);
        undo(&conn, &latest[0]).unwrap();
        assert_eq!(ledger::get(&conn, id).unwrap().posting.amount, 9999);
    }

    #[test]
    fn test_remove_then_restore_keeps_identity() {
        let (_dir, conn) = test_db();
        let (cash, food) = two_accounts(&conn);
        let id = ledger::add(&conn, &posting(food, cash, 3000, "groceries")).unwrap();
        ledger::edit(&conn, id, &posting(food, cash, 3100, "groceries")).unwrap();
        ledger::remove(&conn, id).unwrap();

        let undoable = list_undoable(&conn).unwrap();
        assert_eq!(undoable[0].operation, Operation::Delete);
        assert_eq!(undoable[0].version, 1);
        undo(&conn, &undoable[0]).unwrap();

        let t = ledger::get(&conn, id).unwrap();
        assert_eq!(t.id, id);
        assert_eq!(t.version, 2);
        assert_eq!(t.posting.amount, 3100);
        assert_eq!(ledger::list_all(&conn, Order::Ascending).unwrap().len(), 1);

        // Undoing the restoration removes it again.
        let undoable = list_undoable(&conn).unwrap();
        assert_eq!(undoable[0].operation, Operation::Insert);
        assert_eq!(undoable[0].version, 2);
        undo(&conn, &undoable[0]).unwrap();
        assert!(ledger::get(&conn, id).is_err());

        let ops: Vec<Operation> = all_for(&conn, id).unwrap().iter().map(|e| e.operation).collect();
        assert_eq!(
            ops,
            vec![
                Operation::Insert,
                Operation::Update,
                Operation::Delete,
                Operation::Insert,
                Operation::Delete
            ]
        );
    }

    #[test]
    fn test_removed_untouched_transaction_stays_removed() {
        let (_dir, conn) = test_db();
        let (cash, food) = two_accounts(&conn);
        let id = ledger::add(&conn, &posting(food, cash, 3000, "")).unwrap();
        ledger::remove(&conn, id).unwrap();
        assert!(list_undoable(&conn).unwrap().is_empty());
        assert_eq!(all_for(&conn, id).unwrap().len(), 2);
    }

    #[test]
    fn test_at_requires_exactly_one_row() {
        let (_dir, conn) = test_db();
        let (cash, food) = two_accounts(&conn);
        let id = ledger::add(&conn, &posting(food, cash, 3000, "")).unwrap();
        assert_eq!(at(&conn, id, 0).unwrap().posting.amount, 3000);
        assert!(matches!(at(&conn, id, 5), Err(HearthError::Consistency(_))));

        ledger::remove(&conn, id).unwrap();
        // Removal is recorded at the same version as the insert.
        assert!(matches!(at(&conn, id, 0), Err(HearthError::Consistency(_))));
    }

    #[test]
    fn test_failed_undo_leaves_no_trace() {
        let (_dir, conn) = test_db();
        let (cash, food) = two_accounts(&conn);
        let id = ledger::add(&conn, &posting(food, cash, 3000, "")).unwrap();
        ledger::edit(&conn, id, &posting(food, cash, 3100, "")).unwrap();
        ledger::remove(&conn, id).unwrap();
        let entry = list_undoable(&conn).unwrap().remove(0);

        // Occupy the id so the restore cannot proceed.
        ledger::add(&conn, &posting(food, cash, 1, "")).unwrap();
        conn.execute("UPDATE transactions SET id = ?1", [id]).unwrap();

        let before = all(&conn).unwrap().len();
        assert!(undo(&conn, &entry).is_err());
        assert_eq!(all(&conn).unwrap().len(), before);
    }

    #[test]
    fn test_undo_refuses_superseded_entry() {
        let (_dir, conn) = test_db();
        let (cash, food) = two_accounts(&conn);
        let id = ledger::add(&conn, &posting(food, cash, 3000, "")).unwrap();
        ledger::edit(&conn, id, &posting(food, cash, 3100, "")).unwrap();
        let stale = list_undoable(&conn).unwrap().remove(0);
        ledger::edit(&conn, id, &posting(food, cash, 3200, "")).unwrap();

        assert!(matches!(undo(&conn, &stale), Err(HearthError::Consistency(_))));
        let t = ledger::get(&conn, id).unwrap();
        assert_eq!((t.posting.amount, t.version), (3200, 2));
        assert_eq!(all_for(&conn, id).unwrap().len(), 3);
    }

    #[test]
    fn test_compensation_is_pure() {
        let entry = HistoryEntry {
            history_id: 9,
            operation: Operation::Delete,
            operate_time: chrono::NaiveDate::from_ymd_opt(2019, 11, 3)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            transaction_id: 4,
            version: 3,
            posting: posting(1, 2, 10, ""),
            debit_name: String::new(),
            credit_name: String::new(),
        };
        assert!(matches!(
            compensation(&entry),
            Compensation::Restore { transaction_id: 4, version: 4, .. }
        ));
        let insert = HistoryEntry { operation: Operation::Insert, ..entry.clone() };
        assert_eq!(compensation(&insert), Compensation::Remove { transaction_id: 4 });
    }

    #[test]
    fn test_history_by_month_uses_operation_time() {
        let (_dir, conn) = test_db();
        let (cash, food) = two_accounts(&conn);
        ledger::add(&conn, &posting(food, cash, 3000, "")).unwrap();
        let this_month = YearMonth::of(crate::dates::today());
        assert_eq!(by_month(&conn, this_month).unwrap().len(), 1);
        assert!(by_month(&conn, this_month.minus_months(1)).unwrap().is_empty());
    }
}
