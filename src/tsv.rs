//! Tab-separated bulk import and export.
//!
//! One record per line, `#` lines and blank lines ignored. Records are read
//! with a tab-delimited `csv` reader without any quoting. An import runs in a
//! single SQLite transaction and stops at the first bad record, reporting its
//! line number.

use std::collections::HashMap;
use std::io::{Read, Write};

use chrono::NaiveDate;
use csv::{QuoteStyle, ReaderBuilder, StringRecord, WriterBuilder};
use rusqlite::Connection;
use tracing::info;

use crate::accounts;
use crate::dates::{parse_date, parse_month};
use crate::error::{HearthError, Result};
use crate::ledger::{self, Order};
use crate::models::{AccountInput, AccountType, ItemInput, Posting, Window};
use crate::templates;

/// Non-blank, non-comment records with their 1-based line numbers.
fn records(mut reader: impl Read) -> Result<Vec<(u64, Vec<String>)>> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    let mut rdr = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .comment(Some(b'#'))
        .from_reader(bytes.as_slice());

    let mut rows = Vec::new();
    let mut record = StringRecord::new();
    while rdr.read_record(&mut record)? {
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        // A record's own position points at any skipped comment or blank
        // lines before it, so count back from where the reader stopped.
        let end = rdr.position().byte() as usize;
        let ended_line = bytes.get(..end).is_some_and(|read| read.ends_with(b"\n"));
        let line = rdr.position().line() - u64::from(ended_line);
        rows.push((line, record.iter().map(|f| f.trim().to_string()).collect()));
    }
    Ok(rows)
}

fn at_line<T>(line: u64, result: Result<T>) -> Result<T> {
    result.map_err(|e| HearthError::Import {
        line,
        source: Box::new(e),
    })
}

fn field_count(fields: &[String], allowed: &[usize]) -> Result<()> {
    if allowed.contains(&fields.len()) {
        return Ok(());
    }
    let allowed: Vec<String> = allowed.iter().map(|n| n.to_string()).collect();
    Err(HearthError::validation(
        "fields",
        format!("expected {} fields, got {}", allowed.join(", "), fields.len()),
    ))
}

fn lookup(names: &HashMap<String, i64>, field: &str, name: &str) -> Result<i64> {
    names
        .get(name)
        .copied()
        .ok_or_else(|| HearthError::validation(field, format!("unknown account '{name}'")))
}

pub(crate) fn account_names(conn: &Connection) -> Result<HashMap<String, i64>> {
    Ok(accounts::list(conn)?
        .into_iter()
        .map(|a| (a.name, a.id))
        .collect())
}

fn writer<W: Write>(out: W) -> csv::Writer<W> {
    WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quote_style(QuoteStyle::Never)
        .from_writer(out)
}

pub(crate) fn parse_account(names: &HashMap<String, i64>, fields: &[String]) -> Result<AccountInput> {
    field_count(fields, &[2, 3, 4])?;
    let account_type: AccountType = fields[0].parse()?;
    let mut input = AccountInput::new(account_type, &fields[1]);
    if let Some(aliases) = fields.get(2) {
        input.aliases = aliases.clone();
    }
    if let Some(parent) = fields.get(3).filter(|p| !p.is_empty()) {
        let id = names
            .get(parent)
            .copied()
            .ok_or_else(|| HearthError::validation("parent", format!("unknown parent '{parent}'")))?;
        input.parent = Some(id);
    }
    Ok(input)
}

/// `type  name  [aliases]  [parent]`. A parent may be defined earlier in the same file.
pub fn import_accounts(conn: &Connection, reader: impl Read) -> Result<usize> {
    let rows = records(reader)?;
    let mut names = account_names(conn)?;

    let tx = conn.unchecked_transaction()?;
    for (line, fields) in &rows {
        let input = at_line(*line, parse_account(&names, fields))?;
        let id = at_line(*line, accounts::insert(&tx, &input))?;
        names.insert(input.name, id);
    }
    tx.commit()?;
    info!(count = rows.len(), "accounts imported");
    Ok(rows.len())
}

pub fn export_accounts(conn: &Connection, out: impl Write) -> Result<()> {
    let mut w = writer(out);
    for a in accounts::list(conn)? {
        let parent = if a.has_parent() { a.parent_name.as_str() } else { "" };
        w.write_record([a.account_type.name(), a.name.as_str(), a.aliases.as_str(), parent])?;
    }
    w.flush()?;
    Ok(())
}

fn parse_window_month(field: &str, raw: &str, today: NaiveDate) -> Result<i64> {
    if raw == "0" {
        return Ok(0);
    }
    let month = parse_month(raw, today)
        .map_err(|e| HearthError::validation(field, e.to_string()))?;
    Ok(month.map_or(0, |m| m.to_int()))
}

pub(crate) fn parse_transaction(names: &HashMap<String, i64>, fields: &[String], today: NaiveDate) -> Result<Posting> {
    field_count(fields, &[4, 5, 7])?;
    let date = parse_date(&fields[0], today).map_err(|e| HearthError::validation("date", e.to_string()))?;
    let debit_id = lookup(names, "debit", &fields[1])?;
    let credit_id = lookup(names, "credit", &fields[2])?;
    let amount: i64 = fields[3]
        .parse()
        .map_err(|_| HearthError::validation("amount", format!("not a number: '{}'", fields[3])))?;
    let note = fields.get(4).cloned().unwrap_or_default();
    let window = if fields.len() == 7 {
        let start = parse_window_month("start month", &fields[5], today)?;
        let end = parse_window_month("end month", &fields[6], today)?;
        Window::from_columns(start, end)?
    } else {
        None
    };
    Ok(Posting {
        date,
        debit_id,
        credit_id,
        amount,
        note,
        window,
    })
}

/// `date  debit  credit  amount  [note  [start  end]]`.
pub fn import_transactions(conn: &Connection, reader: impl Read, today: NaiveDate) -> Result<usize> {
    let rows = records(reader)?;
    let names = account_names(conn)?;

    let tx = conn.unchecked_transaction()?;
    for (line, fields) in &rows {
        let posting = at_line(*line, parse_transaction(&names, fields, today))?;
        at_line(*line, ledger::insert(&tx, &posting))?;
    }
    tx.commit()?;
    info!(count = rows.len(), "transactions imported");
    Ok(rows.len())
}

pub fn export_transactions(conn: &Connection, out: impl Write) -> Result<()> {
    let mut w = writer(out);
    for t in ledger::list_all(conn, Order::Ascending)? {
        let p = &t.posting;
        let (start, end) = Window::to_columns(p.window);
        w.write_record([
            p.date.format("%Y-%m-%d").to_string(),
            t.debit_name.clone(),
            t.credit_name.clone(),
            p.amount.to_string(),
            p.note.clone(),
            start.to_string(),
            end.to_string(),
        ])?;
    }
    w.flush()?;
    Ok(())
}

fn parse_template_item(names: &HashMap<String, i64>, fields: &[String]) -> Result<ItemInput> {
    field_count(fields, &[3, 4, 5])?;
    if fields[0].is_empty() {
        return Err(HearthError::validation("template", "must not be empty"));
    }
    let debit_id = lookup(names, "debit", &fields[1])?;
    let credit_id = lookup(names, "credit", &fields[2])?;
    let amount = match fields.get(3).filter(|a| !a.is_empty()) {
        Some(raw) => raw
            .parse()
            .map_err(|_| HearthError::validation("amount", format!("not a number: '{raw}'")))?,
        None => 0,
    };
    Ok(ItemInput {
        debit_id,
        credit_id,
        amount,
        note: fields.get(4).cloned().unwrap_or_default(),
    })
}

/// `template  debit  credit  [amount]  [note]`. Consecutive or scattered lines
/// with the same template name become one template, in first-seen order.
pub fn import_templates(conn: &Connection, reader: impl Read) -> Result<usize> {
    let rows = records(reader)?;
    let names = account_names(conn)?;

    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, Vec<(u64, ItemInput)>> = HashMap::new();
    for (line, fields) in &rows {
        let item = at_line(*line, parse_template_item(&names, fields))?;
        let name = fields[0].clone();
        if !grouped.contains_key(&name) {
            order.push(name.clone());
        }
        grouped.entry(name).or_default().push((*line, item));
    }

    let tx = conn.unchecked_transaction()?;
    for name in &order {
        let items = grouped.get(name).map(Vec::as_slice).unwrap_or_default();
        let first = items.first().map_or(0, |(line, _)| *line);
        let id = at_line(first, templates::insert(&tx, name))?;
        for (line, item) in items {
            at_line(*line, templates::insert_item(&tx, id, item))?;
        }
    }
    tx.commit()?;
    info!(count = order.len(), "templates imported");
    Ok(order.len())
}

pub fn export_templates(conn: &Connection, out: impl Write) -> Result<()> {
    let mut w = writer(out);
    for t in templates::list(conn)? {
        for item in templates::items(conn, t.id)? {
            w.write_record([
                t.name.clone(),
                item.debit_name,
                item.credit_name,
                item.amount.to_string(),
                item.note,
            ])?;
        }
    }
    w.flush()?;
    Ok(())
}
