use std::fs::File;
use std::path::{Path, PathBuf};

use comfy_table::{Cell, CellAlignment, Table};

use super::{confirm_draft, export_to, index_range, select_account, Session};
use crate::accounts;
use crate::error::{HearthError, Result};
use crate::fmt::{amount, numbered};
use crate::models::{Account, Draft, ItemInput, Template, TemplateItem};
use crate::reorder;
use crate::templates;
use crate::tsv;

pub fn list(session: &mut Session) -> Result<()> {
    let mut table = Table::new();
    table.set_header(vec!["Template", "Debit", "Credit", "Amount", "Note"]);
    for t in templates::list(&session.conn)? {
        let items = templates::items(&session.conn, t.id)?;
        if items.is_empty() {
            table.add_row(vec![Cell::new(&t.name)]);
        }
        for (i, item) in items.iter().enumerate() {
            let name = if i == 0 { t.name.as_str() } else { "" };
            table.add_row(vec![
                Cell::new(name),
                Cell::new(&item.debit_name),
                Cell::new(&item.credit_name),
                Cell::new(amount(item.amount)).set_alignment(CellAlignment::Right),
                Cell::new(&item.note),
            ]);
        }
    }
    session.say(format!("Templates\n{table}"))
}

fn select(session: &mut Session) -> Result<Option<Template>> {
    let all = templates::list(&session.conn)?;
    if all.is_empty() {
        return Err(HearthError::NotFound("no templates defined".to_string()));
    }
    let lines: Vec<String> = all.iter().map(|t| t.name.clone()).collect();
    let Some(i) = session.pick_one("Template", &lines)? else {
        return Ok(None);
    };
    Ok(Some(all[i].clone()))
}

pub fn add(session: &mut Session) -> Result<()> {
    let name = session.scan_name("Template name")?;
    let id = templates::add(&session.conn, &name)?;
    session.say(format!("Added template: {name}"))?;
    edit_items(session, &Template { id, name })
}

pub fn edit(session: &mut Session) -> Result<()> {
    let Some(template) = select(session)? else {
        return Ok(());
    };
    edit_items(session, &template)
}

/// The item loop: add, remove, reorder, or pick an item by index to change it.
fn edit_items(session: &mut Session, template: &Template) -> Result<()> {
    let accounts = accounts::list(&session.conn)?;
    loop {
        let items = templates::items(&session.conn, template.id)?;
        session.say("")?;
        session.say(&template.name)?;
        for line in numbered(items.iter().map(TemplateItem::to_string)) {
            session.say(line)?;
        }
        let prompt = if items.is_empty() {
            "a(dd), q(uit): ".to_string()
        } else {
            format!("{}, a(dd), r(emove), o(rder), q(uit): ", index_range(items.len()))
        };

        let answer = session.command(&prompt)?;
        match answer.as_str() {
            "q" | "quit" => return Ok(()),
            "a" | "add" => {
                if let Some(form) = scan_item(session, &accounts)? {
                    templates::add_item(&session.conn, template.id, &form.input)?;
                }
            }
            "r" | "remove" => {
                let lines: Vec<String> = items.iter().map(TemplateItem::to_string).collect();
                if let Some(i) = session.pick_one("Remove", &lines)? {
                    templates::remove_item(&session.conn, template.id, items[i].no)?;
                }
            }
            "o" | "order" => reorder_items(session, &items)?,
            other => {
                let Some(item) = other.parse::<usize>().ok().and_then(|i| items.get(i)) else {
                    continue;
                };
                let mut form = ItemForm::from_item(item);
                if confirm_item(session, &accounts, &mut form)? {
                    templates::edit_item(&session.conn, template.id, item.no, &form.input)?;
                }
            }
        }
    }
}

fn reorder_items(session: &mut Session, items: &[TemplateItem]) -> Result<()> {
    if items.is_empty() {
        return session.say("Nothing to reorder.");
    }
    let text = reorder::render(items.iter().map(TemplateItem::to_string));
    let Some(edited) = session.edit_text(&text)? else {
        return Ok(());
    };
    match reorder::parse_permutation(&edited, items.len()) {
        Ok(ranks) => {
            templates::reorder_items(&session.conn, items, &ranks)?;
            Ok(())
        }
        // a bad edit goes back to the loop
        Err(e) => session.say(e),
    }
}

/// Item fields under edit, with account names for display.
struct ItemForm {
    input: ItemInput,
    debit_name: String,
    credit_name: String,
}

impl ItemForm {
    fn from_item(item: &TemplateItem) -> Self {
        Self {
            input: ItemInput {
                debit_id: item.debit_id,
                credit_id: item.credit_id,
                amount: item.amount,
                note: item.note.clone(),
            },
            debit_name: item.debit_name.clone(),
            credit_name: item.credit_name.clone(),
        }
    }

    fn to_line(&self) -> String {
        format!(
            "{} / {} {} {}",
            self.debit_name,
            self.credit_name,
            amount(self.input.amount),
            self.input.note
        )
    }
}

fn scan_item(session: &mut Session, accounts: &[Account]) -> Result<Option<ItemForm>> {
    let Some(debit) = select_account(session, accounts, "Debit")? else {
        return Ok(None);
    };
    let Some(credit) = select_account(session, accounts, "Credit")? else {
        return Ok(None);
    };
    let amount = session.scan_amount()?;
    let note = session.scan_text("Note")?;
    let mut form = ItemForm {
        input: ItemInput {
            debit_id: debit.id,
            credit_id: credit.id,
            amount,
            note,
        },
        debit_name: debit.name,
        credit_name: credit.name,
    };
    Ok(confirm_item(session, accounts, &mut form)?.then_some(form))
}

fn confirm_item(session: &mut Session, accounts: &[Account], form: &mut ItemForm) -> Result<bool> {
    loop {
        session.say("")?;
        session.say(form.to_line())?;
        match session.command("y(es), l(eft), r(ight), a(mount), n(ote), q(uit): ")?.as_str() {
            "q" | "quit" => return Ok(false),
            "y" | "yes" => return Ok(true),
            "l" | "left" => {
                if let Some(debit) = select_account(session, accounts, "Debit")? {
                    form.input.debit_id = debit.id;
                    form.debit_name = debit.name;
                }
            }
            "r" | "right" => {
                if let Some(credit) = select_account(session, accounts, "Credit")? {
                    form.input.credit_id = credit.id;
                    form.credit_name = credit.name;
                }
            }
            "a" | "amount" => form.input.amount = session.scan_amount()?,
            "n" | "note" => form.input.note = session.scan_text("Note")?,
            _ => {}
        }
    }
}

pub fn remove(session: &mut Session) -> Result<()> {
    let Some(template) = select(session)? else {
        return Ok(());
    };
    if session.confirm(&format!("Remove template {}?", template.name))? {
        templates::remove(&session.conn, template.id)?;
        session.say(format!("Removed template: {}", template.name))?;
    }
    Ok(())
}

/// Stamp the template's items on a date, fill in missing amounts and post.
pub fn use_template(session: &mut Session) -> Result<()> {
    let Some(template) = select(session)? else {
        return Ok(());
    };
    // fails before any prompt when the template is empty
    let mut drafts = templates::drafts(&session.conn, template.id, session.today)?;
    let date = session.scan_date()?;
    for draft in drafts.iter_mut() {
        draft.posting.date = date;
    }
    templates::fill_amounts(&mut drafts, |draft| {
        session.say(draft.to_line())?;
        session.scan_amount()
    })?;

    if !confirm_use(session, &mut drafts)? {
        return Ok(());
    }
    let ids = templates::post(&session.conn, &drafts)?;
    session.say(format!("Posted {} transactions", ids.len()))
}

fn confirm_use(session: &mut Session, drafts: &mut [Draft]) -> Result<bool> {
    let accounts = accounts::list(&session.conn)?;
    loop {
        session.say("")?;
        for line in numbered(drafts.iter().map(Draft::to_line)) {
            session.say(line)?;
        }
        let prompt = format!("y(es), d(ate), {}, q(uit): ", index_range(drafts.len()));
        match session.command(&prompt)?.as_str() {
            "q" | "quit" => return Ok(false),
            "y" | "yes" => return Ok(true),
            "d" | "date" => {
                let date = session.scan_date()?;
                for d in drafts.iter_mut() {
                    d.posting.date = date;
                }
            }
            other => {
                if let Some(draft) = other.parse::<usize>().ok().and_then(|i| drafts.get_mut(i)) {
                    let mut amended = draft.clone();
                    if confirm_draft(session, &accounts, &mut amended)? {
                        *draft = amended;
                    }
                }
            }
        }
    }
}

pub fn import(session: &mut Session, file: &Path) -> Result<()> {
    let count = tsv::import_templates(&session.conn, File::open(file)?)?;
    session.say(format!("Imported {count} templates"))
}

pub fn export(session: &mut Session, file: Option<PathBuf>) -> Result<()> {
    export_to(session, file, |conn, out| tsv::export_templates(conn, out))
}
