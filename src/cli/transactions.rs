use std::fs::File;
use std::path::{Path, PathBuf};

use super::{confirm_draft, export_to, select_account, Session};
use crate::accounts;
use crate::dates::{parse_month, YearMonth};
use crate::error::{HearthError, Result};
use crate::fmt::numbered;
use crate::history::{self, Compensation};
use crate::ledger::{self, Order};
use crate::models::{Draft, Posting, Transaction};
use crate::tsv;

const USAGE: &str = "usage: hearth transaction add DATE DEBIT CREDIT AMOUNT [NOTE [START END]]";

fn month_or_this(session: &Session, month: Option<&str>) -> Result<YearMonth> {
    let month = parse_month(month.unwrap_or(""), session.today)?;
    Ok(month.unwrap_or_else(|| YearMonth::of(session.today)))
}

pub fn list(session: &mut Session, all: bool, month: Option<&str>) -> Result<()> {
    let transactions = if all {
        ledger::list_all(&session.conn, Order::Ascending)?
    } else {
        let month = month_or_this(session, month)?;
        ledger::list_by_month(&session.conn, month)?
    };
    for line in numbered(transactions.iter().map(Transaction::to_line)) {
        session.say(line)?;
    }
    Ok(())
}

/// Newest first, so recent entries sit next to the prompt.
fn select(session: &mut Session) -> Result<Option<Transaction>> {
    let transactions = ledger::list_all(&session.conn, Order::Descending)?;
    if transactions.is_empty() {
        return Err(HearthError::NotFound("no transactions recorded".to_string()));
    }
    let lines: Vec<String> = transactions.iter().map(Transaction::to_line).collect();
    let Some(i) = session.pick_one("Transaction", &lines)? else {
        return Ok(None);
    };
    let picked = transactions[i].clone();
    session.say(format!("Transaction: {picked}"))?;
    Ok(Some(picked))
}

fn draft_of(t: Transaction) -> Draft {
    Draft {
        posting: t.posting,
        debit_name: t.debit_name,
        credit_name: t.credit_name,
        ask_amount: false,
    }
}

pub fn add(session: &mut Session, args: &[String]) -> Result<()> {
    let posting = match args.len() {
        0 => {
            let Some(draft) = scan(session)? else {
                return Ok(());
            };
            draft.posting
        }
        4 | 5 | 7 => tsv::parse_transaction(&tsv::account_names(&session.conn)?, args, session.today)?,
        _ => return Err(HearthError::validation("arguments", USAGE)),
    };
    let id = ledger::add(&session.conn, &posting)?;
    let added = ledger::get(&session.conn, id)?;
    session.say(format!("Added: {added}"))
}

/// Prompt for a new transaction and let the user amend it. `None` when abandoned.
fn scan(session: &mut Session) -> Result<Option<Draft>> {
    let all = accounts::list(&session.conn)?;
    let date = session.scan_date()?;
    let Some(debit) = select_account(session, &all, "Debit")? else {
        return Ok(None);
    };
    let Some(credit) = select_account(session, &all, "Credit")? else {
        return Ok(None);
    };
    let amount = session.scan_amount()?;
    let note = session.scan_text("Note")?;

    let mut draft = Draft {
        posting: Posting {
            date,
            debit_id: debit.id,
            credit_id: credit.id,
            amount,
            note,
            window: None,
        },
        debit_name: debit.name,
        credit_name: credit.name,
        ask_amount: false,
    };
    if confirm_draft(session, &all, &mut draft)? {
        Ok(Some(draft))
    } else {
        Ok(None)
    }
}

pub fn edit(session: &mut Session) -> Result<()> {
    let Some(t) = select(session)? else {
        return Ok(());
    };
    let id = t.id;
    let all = accounts::list(&session.conn)?;
    let mut draft = draft_of(t);
    if confirm_draft(session, &all, &mut draft)? {
        let version = ledger::edit(&session.conn, id, &draft.posting)?;
        session.say(format!("Updated transaction {id} (version {version})"))?;
    }
    Ok(())
}

pub fn remove(session: &mut Session) -> Result<()> {
    let Some(t) = select(session)? else {
        return Ok(());
    };
    if session.confirm("Remove this transaction?")? {
        ledger::remove(&session.conn, t.id)?;
        session.say(format!("Removed transaction {}", t.id))?;
    }
    Ok(())
}

pub fn undo(session: &mut Session) -> Result<()> {
    let entries = history::list_undoable(&session.conn)?;
    if entries.is_empty() {
        return session.say("Nothing to undo.");
    }
    let lines: Vec<String> = entries.iter().map(|e| e.to_line()).collect();
    let Some(i) = session.pick_one("Undo", &lines)? else {
        return Ok(());
    };
    let entry = &entries[i];
    session.say(format!("Change: {entry}"))?;
    if !session.confirm("Undo this change?")? {
        return Ok(());
    }
    match history::undo(&session.conn, entry)? {
        Compensation::Restore { transaction_id, .. } | Compensation::Revert { transaction_id, .. } => {
            let t = ledger::get(&session.conn, transaction_id)?;
            session.say(format!("Now: {t}"))
        }
        Compensation::Remove { transaction_id } => {
            session.say(format!("Removed transaction {transaction_id}"))
        }
    }
}

pub fn history(session: &mut Session, all: bool, month: Option<&str>) -> Result<()> {
    let entries = if all {
        history::all(&session.conn)?
    } else {
        let month = month_or_this(session, month)?;
        history::by_month(&session.conn, month)?
    };
    for e in &entries {
        session.say(e.to_line())?;
    }
    Ok(())
}

pub fn search(session: &mut Session) -> Result<()> {
    let Some(t) = select(session)? else {
        return Ok(());
    };
    session.say("")?;
    session.say("History:")?;
    for e in history::all_for(&session.conn, t.id)? {
        session.say(e)?;
    }
    Ok(())
}

pub fn import(session: &mut Session, file: &Path) -> Result<()> {
    let count = tsv::import_transactions(&session.conn, File::open(file)?, session.today)?;
    session.say(format!("Imported {count} transactions"))
}

pub fn export(session: &mut Session, file: Option<PathBuf>) -> Result<()> {
    export_to(session, file, |conn, out| tsv::export_transactions(conn, out))
}
