//! Named sets of transaction skeletons.
//!
//! Items are addressed by `(template_id, no)`. `no` comes from the template's
//! persisted high-water mark so a removed item's number is never handed out
//! again; `order_no` is the display rank and is all that reordering touches.

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use crate::accounts;
use crate::error::{HearthError, Result};
use crate::ledger;
use crate::models::{Draft, ItemInput, Posting, Template, TemplateItem};
use crate::reorder;

pub fn list(conn: &Connection) -> Result<Vec<Template>> {
    let mut stmt = conn.prepare("SELECT id, name FROM templates ORDER BY id")?;
    let templates = stmt
        .query_map([], |row| {
            Ok(Template {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(templates)
}

pub fn get(conn: &Connection, id: i64) -> Result<Template> {
    conn.query_row("SELECT id, name FROM templates WHERE id = ?1", [id], |row| {
        Ok(Template {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    })
    .optional()?
    .ok_or_else(|| HearthError::NotFound(format!("template {id}")))
}

fn row_to_item(row: &Row) -> rusqlite::Result<TemplateItem> {
    Ok(TemplateItem {
        template_id: row.get(0)?,
        no: row.get(1)?,
        order_no: row.get(2)?,
        debit_id: row.get(3)?,
        debit_name: row.get(4)?,
        credit_id: row.get(5)?,
        credit_name: row.get(6)?,
        amount: row.get(7)?,
        note: row.get(8)?,
    })
}

/// Items in display order.
pub fn items(conn: &Connection, template_id: i64) -> Result<Vec<TemplateItem>> {
    let mut stmt = conn.prepare(
        "SELECT i.template_id, i.no, i.order_no, i.debit_id, d.name, i.credit_id, c.name,
                i.amount, i.note
         FROM templates_detail i
         JOIN accounts d ON d.id = i.debit_id
         JOIN accounts c ON c.id = i.credit_id
         WHERE i.template_id = ?1
         ORDER BY i.order_no, i.no",
    )?;
    let items = stmt
        .query_map([template_id], row_to_item)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(items)
}

pub(crate) fn insert(conn: &Connection, name: &str) -> Result<i64> {
    if name.trim().is_empty() {
        return Err(HearthError::validation("name", "must not be empty"));
    }
    conn.execute("INSERT INTO templates (name) VALUES (?1)", [name])?;
    let id = conn.last_insert_rowid();
    info!(id, name, "template created");
    Ok(id)
}

/// Create an empty template.
pub fn add(conn: &Connection, name: &str) -> Result<i64> {
    insert(conn, name)
}

fn validate_item(conn: &Connection, item: &ItemInput) -> Result<()> {
    if !accounts::exists(conn, item.debit_id)? {
        return Err(HearthError::MissingAccount(format!("debit {}", item.debit_id)));
    }
    if !accounts::exists(conn, item.credit_id)? {
        return Err(HearthError::MissingAccount(format!("credit {}", item.credit_id)));
    }
    Ok(())
}

pub(crate) fn insert_item(conn: &Connection, template_id: i64, item: &ItemInput) -> Result<i64> {
    validate_item(conn, item)?;
    let last_no: i64 = conn
        .query_row("SELECT last_no FROM templates WHERE id = ?1", [template_id], |row| row.get(0))
        .optional()?
        .ok_or_else(|| HearthError::NotFound(format!("template {template_id}")))?;
    let order_no: i64 = conn.query_row(
        "SELECT COALESCE(MAX(order_no), 0) + 1 FROM templates_detail WHERE template_id = ?1",
        [template_id],
        |row| row.get(0),
    )?;
    let no = last_no + 1;
    conn.execute(
        "INSERT INTO templates_detail (template_id, no, order_no, debit_id, credit_id, amount, note)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![template_id, no, order_no, item.debit_id, item.credit_id, item.amount, item.note],
    )?;
    conn.execute("UPDATE templates SET last_no = ?2 WHERE id = ?1", params![template_id, no])?;
    Ok(no)
}

/// Append an item; returns its `no`.
pub fn add_item(conn: &Connection, template_id: i64, item: &ItemInput) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    let no = insert_item(&tx, template_id, item)?;
    tx.commit()?;
    info!(template_id, no, "template item added");
    Ok(no)
}

pub fn edit_item(conn: &Connection, template_id: i64, no: i64, item: &ItemInput) -> Result<()> {
    validate_item(conn, item)?;
    let n = conn.execute(
        "UPDATE templates_detail SET debit_id = ?3, credit_id = ?4, amount = ?5, note = ?6
         WHERE template_id = ?1 AND no = ?2",
        params![template_id, no, item.debit_id, item.credit_id, item.amount, item.note],
    )?;
    if n == 0 {
        return Err(HearthError::Referential(format!(
            "template {template_id} has no item {no}"
        )));
    }
    info!(template_id, no, "template item edited");
    Ok(())
}

pub fn remove_item(conn: &Connection, template_id: i64, no: i64) -> Result<()> {
    let n = conn.execute(
        "DELETE FROM templates_detail WHERE template_id = ?1 AND no = ?2",
        params![template_id, no],
    )?;
    if n == 0 {
        return Err(HearthError::Referential(format!(
            "template {template_id} has no item {no}"
        )));
    }
    info!(template_id, no, "template item removed");
    Ok(())
}

/// Re-rank items from a parsed permutation. Returns the number of rows written.
pub fn reorder_items(conn: &Connection, items: &[TemplateItem], ranks: &[usize]) -> Result<usize> {
    let current: Vec<i64> = items.iter().map(|i| i.order_no).collect();
    let changed = reorder::changed_ranks(&current, ranks, 0);

    let tx = conn.unchecked_transaction()?;
    for &(i, order_no) in &changed {
        tx.execute(
            "UPDATE templates_detail SET order_no = ?3 WHERE template_id = ?1 AND no = ?2",
            params![items[i].template_id, items[i].no, order_no],
        )?;
    }
    tx.commit()?;
    Ok(changed.len())
}

/// Delete a template together with its items.
pub fn remove(conn: &Connection, template_id: i64) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM templates_detail WHERE template_id = ?1", [template_id])?;
    let n = tx.execute("DELETE FROM templates WHERE id = ?1", [template_id])?;
    if n == 0 {
        return Err(HearthError::NotFound(format!("template {template_id}")));
    }
    tx.commit()?;
    info!(template_id, "template removed");
    Ok(())
}

/// One draft per item, all dated `date`.
pub fn drafts(conn: &Connection, template_id: i64, date: NaiveDate) -> Result<Vec<Draft>> {
    let items = items(conn, template_id)?;
    if items.is_empty() {
        get(conn, template_id)?;
        return Err(HearthError::validation("template", "has no items"));
    }
    Ok(items
        .into_iter()
        .map(|item| Draft {
            ask_amount: item.amount == 0,
            posting: Posting {
                date,
                debit_id: item.debit_id,
                credit_id: item.credit_id,
                amount: item.amount,
                note: item.note,
                window: None,
            },
            debit_name: item.debit_name,
            credit_name: item.credit_name,
        })
        .collect())
}

/// Insert every draft with a non-zero amount in one transaction. Zero-amount
/// drafts are skipped. Returns the new transaction ids.
pub fn post(conn: &Connection, drafts: &[Draft]) -> Result<Vec<i64>> {
    let tx = conn.unchecked_transaction()?;
    let mut ids = Vec::new();
    for draft in drafts.iter().filter(|d| d.posting.amount != 0) {
        ids.push(ledger::insert(&tx, &draft.posting)?);
    }
    tx.commit()?;
    info!(
        posted = ids.len(),
        skipped = drafts.len() - ids.len(),
        "template used"
    );
    Ok(ids)
}

/// Ask `amount_for` for every draft stamped from an item without a default amount.
pub fn fill_amounts<F>(drafts: &mut [Draft], mut amount_for: F) -> Result<()>
where
    F: FnMut(&Draft) -> Result<i64>,
{
    for draft in drafts.iter_mut().filter(|d| d.ask_amount) {
        draft.posting.amount = amount_for(draft)?;
    }
    Ok(())
}
