//! Reconciliation groups: buckets of existing transactions checked against
//! one account. A transaction belongs to at most one group. Membership rows
//! are kept when a transaction is removed so an undo-restore brings it back
//! into its group.

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use crate::accounts;
use crate::error::{HearthError, Result};
use crate::ledger;
use crate::models::{Group, Transaction};

const SELECT_GROUP: &str = "
    SELECT g.id, g.name, g.check_account_id, COALESCE(a.name, ''),
           COALESCE(SUM(CASE WHEN t.debit_id = g.check_account_id THEN t.amount ELSE 0 END), 0),
           COALESCE(SUM(CASE WHEN t.credit_id = g.check_account_id THEN t.amount ELSE 0 END), 0)
    FROM recon_groups g
    LEFT JOIN accounts a ON a.id = g.check_account_id
    LEFT JOIN recon_groups_detail gd ON gd.group_id = g.id
    LEFT JOIN transactions t ON t.id = gd.transaction_id";

fn row_to_group(row: &Row) -> rusqlite::Result<Group> {
    Ok(Group {
        id: row.get(0)?,
        name: row.get(1)?,
        check_account_id: row.get(2)?,
        check_account_name: row.get(3)?,
        debit: row.get(4)?,
        credit: row.get(5)?,
    })
}

/// Newest group first.
pub fn list(conn: &Connection) -> Result<Vec<Group>> {
    let mut stmt = conn.prepare(&format!("{SELECT_GROUP} GROUP BY g.id ORDER BY g.id DESC"))?;
    let groups = stmt
        .query_map([], row_to_group)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(groups)
}

pub fn get(conn: &Connection, id: i64) -> Result<Group> {
    conn.query_row(
        &format!("{SELECT_GROUP} WHERE g.id = ?1 GROUP BY g.id"),
        [id],
        row_to_group,
    )
    .optional()?
    .ok_or_else(|| HearthError::NotFound(format!("group {id}")))
}

/// Sums of member amounts where the check account is the debit leg and the
/// credit leg.
pub fn balance(conn: &Connection, id: i64) -> Result<(i64, i64)> {
    let group = get(conn, id)?;
    Ok((group.debit, group.credit))
}

/// Live member transactions, oldest first.
pub fn members(conn: &Connection, id: i64) -> Result<Vec<Transaction>> {
    ledger::query(
        conn,
        "WHERE t.id IN (SELECT transaction_id FROM recon_groups_detail WHERE group_id = ?1)
         ORDER BY t.date, t.id",
        [id],
    )
}

/// Transactions not in any group, newest first. With a check account only
/// those touching it on either leg.
pub fn candidates(conn: &Connection, check_account_id: Option<i64>) -> Result<Vec<Transaction>> {
    let ungrouped = "WHERE t.id NOT IN (SELECT transaction_id FROM recon_groups_detail)";
    match check_account_id {
        Some(account) => ledger::query(
            conn,
            &format!(
                "{ungrouped} AND (t.debit_id = ?1 OR t.credit_id = ?1)
                 ORDER BY t.date DESC, t.id DESC"
            ),
            [account],
        ),
        None => ledger::query(
            conn,
            &format!("{ungrouped} ORDER BY t.date DESC, t.id DESC"),
            [],
        ),
    }
}

fn insert_members(conn: &Connection, group_id: i64, check_account_id: i64, ids: &[i64]) -> Result<()> {
    for &tid in ids {
        let t = ledger::get(conn, tid)?;
        if t.posting.debit_id != check_account_id && t.posting.credit_id != check_account_id {
            return Err(HearthError::validation(
                "member",
                format!("transaction {tid} does not touch the check account"),
            ));
        }
        let owner: Option<i64> = conn
            .query_row(
                "SELECT group_id FROM recon_groups_detail WHERE transaction_id = ?1",
                [tid],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(owner) = owner {
            return Err(HearthError::validation(
                "member",
                format!("transaction {tid} already belongs to group {owner}"),
            ));
        }
        conn.execute(
            "INSERT INTO recon_groups_detail (group_id, transaction_id) VALUES (?1, ?2)",
            params![group_id, tid],
        )?;
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(HearthError::validation("name", "must not be empty"));
    }
    Ok(())
}

/// Create a group and its membership in one step.
pub fn create(conn: &Connection, name: &str, check_account_id: i64, member_ids: &[i64]) -> Result<i64> {
    validate_name(name)?;
    if !accounts::exists(conn, check_account_id)? {
        return Err(HearthError::MissingAccount(format!("check account {check_account_id}")));
    }
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO recon_groups (name, check_account_id) VALUES (?1, ?2)",
        params![name, check_account_id],
    )?;
    let id = tx.last_insert_rowid();
    insert_members(&tx, id, check_account_id, member_ids)?;
    tx.commit()?;
    info!(id, name, members = member_ids.len(), "group created");
    Ok(id)
}

pub fn add_members(conn: &Connection, group_id: i64, ids: &[i64]) -> Result<()> {
    let group = get(conn, group_id)?;
    let tx = conn.unchecked_transaction()?;
    insert_members(&tx, group_id, group.check_account_id, ids)?;
    tx.commit()?;
    info!(group_id, added = ids.len(), "group members added");
    Ok(())
}

/// Drop membership rows; the transactions themselves are untouched.
pub fn remove_members(conn: &Connection, group_id: i64, ids: &[i64]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut removed = 0;
    for &tid in ids {
        removed += tx.execute(
            "DELETE FROM recon_groups_detail WHERE group_id = ?1 AND transaction_id = ?2",
            params![group_id, tid],
        )?;
    }
    tx.commit()?;
    info!(group_id, removed, "group members removed");
    Ok(removed)
}

pub fn rename(conn: &Connection, group_id: i64, name: &str) -> Result<()> {
    validate_name(name)?;
    let n = conn.execute(
        "UPDATE recon_groups SET name = ?2 WHERE id = ?1",
        params![group_id, name],
    )?;
    if n == 0 {
        return Err(HearthError::NotFound(format!("group {group_id}")));
    }
    Ok(())
}

pub fn remove(conn: &Connection, group_id: i64) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM recon_groups_detail WHERE group_id = ?1", [group_id])?;
    let n = tx.execute("DELETE FROM recon_groups WHERE id = ?1", [group_id])?;
    if n == 0 {
        return Err(HearthError::NotFound(format!("group {group_id}")));
    }
    tx.commit()?;
    info!(group_id, "group removed");
    Ok(())
}
