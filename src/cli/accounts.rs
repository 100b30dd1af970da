use std::fs::File;
use std::path::{Path, PathBuf};

use comfy_table::{Cell, Table};

use super::{export_to, select_account, Session};
use crate::accounts;
use crate::error::{HearthError, Result};
use crate::models::{Account, AccountInput, AccountType};
use crate::reorder;
use crate::tsv;

const USAGE: &str = "usage: hearth account add TYPE NAME [ALIASES [PARENT]]";

pub fn list(session: &mut Session) -> Result<()> {
    let rows = accounts::list(&session.conn)?;

    let mut table = Table::new();
    table.set_header(vec!["Type", "Name", "Parent", "Aliases", "Extraordinary"]);
    for a in &rows {
        let parent = if a.has_parent() { a.parent_name.as_str() } else { "" };
        table.add_row(vec![
            Cell::new(a.account_type),
            Cell::new(&a.name),
            Cell::new(parent),
            Cell::new(&a.aliases),
            Cell::new(if a.extraordinary { "yes" } else { "" }),
        ]);
    }
    session.say(format!("Accounts\n{table}"))
}

pub fn add(session: &mut Session, args: &[String]) -> Result<()> {
    let input = match args.len() {
        0 => {
            let all = accounts::list(&session.conn)?;
            let account_type = scan_type(session)?;
            let name = session.scan_name("Name")?;
            let mut form = Form::new(AccountInput::new(account_type, &name));
            if !confirm(session, &all, &mut form, true)? {
                return Ok(());
            }
            form.input
        }
        2..=4 => tsv::parse_account(&tsv::account_names(&session.conn)?, args)?,
        _ => return Err(HearthError::validation("arguments", USAGE)),
    };
    accounts::create(&session.conn, &input)?;
    session.say(format!("Added account: {}", input.name))
}

pub fn edit(session: &mut Session) -> Result<()> {
    let all = accounts::list(&session.conn)?;
    let Some(account) = select_account(session, &all, "Account")? else {
        return Ok(());
    };
    let mut form = Form::from_account(&account);
    if confirm(session, &all, &mut form, false)? {
        accounts::edit(&session.conn, account.id, &form.input)?;
        session.say(format!("Updated account: {}", form.input.name))?;
    }
    Ok(())
}

pub fn remove(session: &mut Session) -> Result<()> {
    let all = accounts::list(&session.conn)?;
    let Some(account) = select_account(session, &all, "Account")? else {
        return Ok(());
    };
    if session.confirm(&format!("Remove {}?", account.name))? {
        accounts::remove(&session.conn, account.id)?;
        session.say(format!("Removed account: {}", account.name))?;
    }
    Ok(())
}

/// Root accounts of one of the four main types, or the children of one parent.
enum Target {
    Roots(AccountType),
    Children(Account),
}

const REORDER_TYPES: [AccountType; 4] = [
    AccountType::Asset,
    AccountType::Liability,
    AccountType::Income,
    AccountType::Expense,
];

pub fn reorder(session: &mut Session) -> Result<()> {
    let parents = accounts::list_with_two_or_more_children(&session.conn)?;
    let mut targets: Vec<Target> = REORDER_TYPES.into_iter().map(Target::Roots).collect();
    targets.extend(parents.into_iter().map(Target::Children));

    let lines: Vec<String> = targets
        .iter()
        .map(|t| match t {
            Target::Roots(t) => t.to_string(),
            Target::Children(p) => format!("{} {}", p.name, p.aliases).trim_end().to_string(),
        })
        .collect();
    let Some(i) = session.pick_one("Reorder", &lines)? else {
        return Ok(());
    };
    session.say(format!("Reordering: {}", lines[i]))?;

    let (siblings, start) = match &targets[i] {
        Target::Roots(t) => (accounts::list_by_type(&session.conn, *t)?, 0),
        Target::Children(p) => (accounts::children_of(&session.conn, p.id)?, p.order_no + 1),
    };
    if siblings.is_empty() {
        return session.say("Nothing to reorder.");
    }

    let text = reorder::render(siblings.iter().map(|a| a.name.as_str()));
    let Some(edited) = session.edit_text(&text)? else {
        return Ok(());
    };
    let ranks = reorder::parse_permutation(&edited, siblings.len())?;
    let changed = accounts::reorder(&session.conn, &siblings, &ranks, start)?;
    session.say(format!("Reordered {changed} accounts"))
}

pub fn import(session: &mut Session, file: &Path) -> Result<()> {
    let count = tsv::import_accounts(&session.conn, File::open(file)?)?;
    session.say(format!("Imported {count} accounts"))
}

pub fn export(session: &mut Session, file: Option<PathBuf>) -> Result<()> {
    export_to(session, file, |conn, out| tsv::export_accounts(conn, out))
}

fn scan_type(session: &mut Session) -> Result<AccountType> {
    loop {
        let s = session.ask("Type (Asset, Liability, Income, Expense, Equity): ")?;
        match s.parse() {
            Ok(t) => return Ok(t),
            Err(e) => session.say(e)?,
        }
    }
}

/// Account fields under edit, with the parent name for display.
struct Form {
    input: AccountInput,
    parent_name: String,
}

impl Form {
    fn new(input: AccountInput) -> Self {
        Self {
            input,
            parent_name: String::new(),
        }
    }

    fn from_account(account: &Account) -> Self {
        let parent_name = if account.has_parent() {
            account.parent_name.clone()
        } else {
            String::new()
        };
        Self {
            input: AccountInput::from_account(account),
            parent_name,
        }
    }

    fn to_line(&self) -> String {
        let i = &self.input;
        format!(
            "{} {} {} ({}) extraordinary: {}",
            i.account_type, i.name, i.aliases, self.parent_name, i.extraordinary
        )
    }
}

fn confirm(session: &mut Session, accounts: &[Account], form: &mut Form, with_type: bool) -> Result<bool> {
    let prompt = if with_type {
        "y(es), t(ype), n(ame), s(earch words), p(arent), e(xtraordinary), q(uit): "
    } else {
        "y(es), n(ame), s(earch words), p(arent), e(xtraordinary), q(uit): "
    };
    loop {
        session.say("")?;
        session.say(form.to_line())?;
        match session.command(prompt)?.as_str() {
            "q" | "quit" => return Ok(false),
            "y" | "yes" => return Ok(true),
            "t" | "type" if with_type => form.input.account_type = scan_type(session)?,
            "n" | "name" => form.input.name = session.scan_name("Name")?,
            "s" | "search words" => form.input.aliases = session.scan_text("Search words")?,
            "p" | "parent" if !accounts.is_empty() => {
                // cancelling the pick makes the account a root again
                match select_account(session, accounts, "Parent")? {
                    Some(parent) => {
                        form.input.parent = Some(parent.id);
                        form.parent_name = parent.name;
                    }
                    None => {
                        form.input.parent = None;
                        form.parent_name.clear();
                    }
                }
            }
            "e" | "extraordinary" => form.input.extraordinary = session.confirm("Extraordinary?")?,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::testing::{session, text};
    use crate::db::test_db;
    use crate::picker::scripted::{ScriptedEditor, ScriptedSelector};
    use crate::picker::Selection;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_add_from_arguments() {
        let (_dir, conn) = test_db();
        let mut out = Vec::new();
        let mut sel = ScriptedSelector::default();
        let mut ed = ScriptedEditor::default();
        let mut s = session(conn, "", &mut out, &mut sel, &mut ed);

        add(&mut s, &args(&["Expense", "Living"])).unwrap();
        add(&mut s, &args(&["4", "Food", "shokuhi", "Living"])).unwrap();

        let food = accounts::find_by_name(&s.conn, "Food").unwrap().unwrap();
        assert_eq!(food.parent_name, "Living");
        assert!(food.has_parent());
        assert!(add(&mut s, &args(&["Expense"])).is_err());
        assert!(add(&mut s, &args(&["Expense", "Rent", "", "Nowhere"])).is_err());
    }

    #[test]
    fn test_add_interactively_with_parent() {
        let (_dir, conn) = test_db();
        accounts::create(&conn, &AccountInput::new(AccountType::Expense, "Living")).unwrap();
        let mut out = Vec::new();
        let mut sel = ScriptedSelector::new([Selection::Chosen(vec![0])]);
        let mut ed = ScriptedEditor::default();
        let mut s = session(conn, "expense\nFood\np\ns\nshokuhi\ny\n", &mut out, &mut sel, &mut ed);

        add(&mut s, &[]).unwrap();

        let food = accounts::find_by_name(&s.conn, "Food").unwrap().unwrap();
        assert_eq!(food.aliases, "shokuhi");
        assert_eq!(food.parent_name, "Living");
        drop(s);
        assert!(text(out).contains("Added account: Food"));
    }

    #[test]
    fn test_quit_adds_nothing() {
        let (_dir, conn) = test_db();
        let mut out = Vec::new();
        let mut sel = ScriptedSelector::default();
        let mut ed = ScriptedEditor::default();
        let mut s = session(conn, "asset\nCash\nq\n", &mut out, &mut sel, &mut ed);
        add(&mut s, &[]).unwrap();
        assert!(accounts::list(&s.conn).unwrap().is_empty());
    }

    #[test]
    fn test_edit_cannot_change_type_but_renames() {
        let (_dir, conn) = test_db();
        accounts::create(&conn, &AccountInput::new(AccountType::Asset, "Cash")).unwrap();
        let mut out = Vec::new();
        let mut sel = ScriptedSelector::new([Selection::Chosen(vec![0])]);
        let mut ed = ScriptedEditor::default();
        let mut s = session(conn, "t\nn\nWallet\ny\n", &mut out, &mut sel, &mut ed);

        edit(&mut s).unwrap();

        let all = accounts::list(&s.conn).unwrap();
        assert_eq!(all[0].name, "Wallet");
        assert_eq!(all[0].account_type, AccountType::Asset);
    }

    #[test]
    fn test_cancelled_selection_is_a_no_op() {
        let (_dir, conn) = test_db();
        accounts::create(&conn, &AccountInput::new(AccountType::Asset, "Cash")).unwrap();
        let mut out = Vec::new();
        let mut sel = ScriptedSelector::new([Selection::Cancelled]);
        let mut ed = ScriptedEditor::default();
        let mut s = session(conn, "", &mut out, &mut sel, &mut ed);
        remove(&mut s).unwrap();
        assert_eq!(accounts::list(&s.conn).unwrap().len(), 1);
    }

    #[test]
    fn test_remove_used_account_is_refused() {
        let (_dir, conn) = test_db();
        let (cash, food) = crate::ledger::tests::two_accounts(&conn);
        crate::ledger::add(&conn, &crate::ledger::tests::posting(food, cash, 100, "")).unwrap();
        let mut out = Vec::new();
        let mut sel = ScriptedSelector::new([Selection::Chosen(vec![0])]);
        let mut ed = ScriptedEditor::default();
        let mut s = session(conn, "y\n", &mut out, &mut sel, &mut ed);
        assert!(matches!(remove(&mut s), Err(HearthError::Referential(_))));
    }

    #[test]
    fn test_reorder_root_accounts_of_a_type() {
        let (_dir, conn) = test_db();
        for name in ["Cash", "Bank", "Card"] {
            accounts::create(&conn, &AccountInput::new(AccountType::Asset, name)).unwrap();
        }
        let mut out = Vec::new();
        // Asset bucket, then move Card to the top
        let mut sel = ScriptedSelector::new([Selection::Chosen(vec![0])]);
        let mut ed = ScriptedEditor::new([Selection::Chosen("2 Card\n0 Cash\n1 Bank\n".to_string())]);
        let mut s = session(conn, "", &mut out, &mut sel, &mut ed);

        reorder(&mut s).unwrap();

        let names: Vec<String> = accounts::list_by_type(&s.conn, AccountType::Asset)
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["Card", "Cash", "Bank"]);
        drop(s);
        assert_eq!(ed.seen, vec!["0 Cash\n1 Bank\n2 Card\n".to_string()]);
    }

    #[test]
    fn test_reorder_offers_parents_with_two_children() {
        let (_dir, conn) = test_db();
        let living = accounts::create(&conn, &AccountInput::new(AccountType::Expense, "Living")).unwrap();
        for name in ["Food", "Rent"] {
            let mut input = AccountInput::new(AccountType::Expense, name);
            input.parent = Some(living);
            accounts::create(&conn, &input).unwrap();
        }
        let mut out = Vec::new();
        let mut sel = ScriptedSelector::new([Selection::Chosen(vec![4])]);
        let mut ed = ScriptedEditor::new([Selection::Chosen("1 Rent\n0 Food\n".to_string())]);
        let mut s = session(conn, "", &mut out, &mut sel, &mut ed);

        reorder(&mut s).unwrap();

        let children = accounts::children_of(&s.conn, living).unwrap();
        assert_eq!(children[0].name, "Rent");
        drop(s);
        assert_eq!(sel.shown[0].1.len(), 5);
        assert!(sel.shown[0].1[4].ends_with("Living"));
    }

    #[test]
    fn test_export_goes_to_output() {
        let (_dir, conn) = test_db();
        let living = accounts::create(&conn, &AccountInput::new(AccountType::Expense, "Living")).unwrap();
        let mut food = AccountInput::new(AccountType::Expense, "Food");
        food.parent = Some(living);
        accounts::create(&conn, &food).unwrap();
        let mut out = Vec::new();
        let mut sel = ScriptedSelector::default();
        let mut ed = ScriptedEditor::default();
        let mut s = session(conn, "", &mut out, &mut sel, &mut ed);
        export(&mut s, None).unwrap();
        drop(s);
        let out = text(out);
        assert!(out.contains("Expense\tLiving\t\t\n"));
        assert!(out.contains("Expense\tFood\t\tLiving\n"));
    }
}
