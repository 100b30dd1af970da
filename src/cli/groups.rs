use super::{select_account, Session};
use crate::accounts;
use crate::error::{HearthError, Result};
use crate::fmt::{amount, numbered};
use crate::groups;
use crate::models::{Group, Transaction};

pub fn list(session: &mut Session) -> Result<()> {
    let all = groups::list(&session.conn)?;
    for line in numbered(all.iter().map(Group::to_string)) {
        session.say(line)?;
    }
    Ok(())
}

fn select(session: &mut Session) -> Result<Option<Group>> {
    let all = groups::list(&session.conn)?;
    let lines: Vec<String> = all.iter().map(Group::to_string).collect();
    Ok(session.pick_one("Group", &lines)?.map(|i| all[i].clone()))
}

fn lines(transactions: &[Transaction]) -> Vec<String> {
    transactions.iter().map(Transaction::to_line).collect()
}

fn total<'t>(mut members: impl Iterator<Item = &'t &'t Transaction>) -> Result<i64> {
    members
        .try_fold(0i64, |sum, t| sum.checked_add(t.posting.amount))
        .ok_or_else(|| HearthError::validation("amount", "group total is out of range"))
}

pub fn add(session: &mut Session) -> Result<()> {
    let name = session.scan_name("Group name")?;
    let all = accounts::list(&session.conn)?;
    let Some(check) = select_account(session, &all, "Check account")? else {
        return Ok(());
    };

    let candidates = groups::candidates(&session.conn, Some(check.id))?;
    if candidates.is_empty() {
        return session.say(format!("No ungrouped transactions touch {}.", check.name));
    }
    let Some(picked) = session.pick_many("Members", &lines(&candidates))? else {
        return Ok(());
    };
    let members: Vec<&Transaction> = picked.iter().map(|&i| &candidates[i]).collect();

    let debit = total(members.iter().filter(|t| t.posting.debit_id == check.id))?;
    let credit = total(members.iter().filter(|t| t.posting.credit_id == check.id))?;
    let mark = if debit == credit { 'o' } else { 'x' };
    session.say("")?;
    session.say(format!("{mark} {name} [{}, {}, {}]", check.name, amount(debit), amount(credit)))?;
    for t in &members {
        session.say(t.to_line())?;
    }

    if session.confirm("Create this group?")? {
        let ids: Vec<i64> = members.iter().map(|t| t.id).collect();
        let id = groups::create(&session.conn, &name, check.id, &ids)?;
        let (debit, credit) = groups::balance(&session.conn, id)?;
        let state = if debit == credit { "balanced" } else { "unbalanced" };
        session.say(format!("Added group: {name} ({state})"))?;
    }
    Ok(())
}

pub fn edit(session: &mut Session) -> Result<()> {
    let Some(group) = select(session)? else {
        return Ok(());
    };
    loop {
        let current = groups::get(&session.conn, group.id)?;
        let members = groups::members(&session.conn, group.id)?;
        session.say("")?;
        session.say(&current)?;
        for line in numbered(lines(&members)) {
            session.say(line)?;
        }

        match session.command("n(ame), a(dd), r(emove), q(uit): ")?.as_str() {
            "q" | "quit" => return Ok(()),
            "n" | "name" => {
                let name = session.scan_name("Group name")?;
                groups::rename(&session.conn, group.id, &name)?;
            }
            "a" | "add" => {
                let candidates = groups::candidates(&session.conn, Some(current.check_account_id))?;
                if candidates.is_empty() {
                    session.say("No ungrouped transactions left.")?;
                    continue;
                }
                if let Some(picked) = session.pick_many("Add", &lines(&candidates))? {
                    let ids: Vec<i64> = picked.iter().map(|&i| candidates[i].id).collect();
                    groups::add_members(&session.conn, group.id, &ids)?;
                }
            }
            "r" | "remove" => {
                if let Some(picked) = session.pick_many("Remove", &lines(&members))? {
                    let ids: Vec<i64> = picked.iter().map(|&i| members[i].id).collect();
                    groups::remove_members(&session.conn, group.id, &ids)?;
                }
            }
            _ => {}
        }
    }
}

pub fn remove(session: &mut Session) -> Result<()> {
    let Some(group) = select(session)? else {
        return Ok(());
    };
    if session.confirm(&format!("Remove group {}?", group.name))? {
        groups::remove(&session.conn, group.id)?;
        session.say(format!("Removed group: {}", group.name))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::testing::{session, text};
    use crate::db::test_db;
    use crate::ledger::{self, tests::posting};
    use crate::models::{AccountInput, AccountType};
    use crate::picker::scripted::{ScriptedEditor, ScriptedSelector};
    use crate::picker::Selection;

    /// Bank, Card and three transactions moving money between them.
    fn card_payments(conn: &rusqlite::Connection) -> (i64, i64) {
        let bank = accounts::create(conn, &AccountInput::new(AccountType::Asset, "Bank")).unwrap();
        let card = accounts::create(conn, &AccountInput::new(AccountType::Liability, "Card")).unwrap();
        ledger::add(conn, &posting(card, bank, 1000, "")).unwrap();
        ledger::add(conn, &posting(card, bank, 2000, "")).unwrap();
        ledger::add(conn, &posting(bank, card, 3000, "")).unwrap();
        (bank, card)
    }

    #[test]
    fn test_add_balanced_group() {
        let (_dir, conn) = test_db();
        card_payments(&conn);
        let mut out = Vec::new();
        // check account Card (index 1), then all three candidates
        let mut sel = ScriptedSelector::new([Selection::Chosen(vec![1]), Selection::Chosen(vec![0, 1, 2])]);
        let mut ed = ScriptedEditor::default();
        let mut s = session(conn, "card october\ny\n", &mut out, &mut sel, &mut ed);

        add(&mut s).unwrap();

        let all = groups::list(&s.conn).unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].is_balanced());
        drop(s);
        assert!(text(out).contains("o card october [Card, 3,000, 3,000]"));
    }

    #[test]
    fn test_add_without_candidates() {
        let (_dir, conn) = test_db();
        accounts::create(&conn, &AccountInput::new(AccountType::Asset, "Bank")).unwrap();
        let mut out = Vec::new();
        let mut sel = ScriptedSelector::new([Selection::Chosen(vec![0])]);
        let mut ed = ScriptedEditor::default();
        let mut s = session(conn, "empty\n", &mut out, &mut sel, &mut ed);
        add(&mut s).unwrap();
        assert!(groups::list(&s.conn).unwrap().is_empty());
        drop(s);
        assert!(text(out).contains("No ungrouped transactions touch Bank."));
    }

    #[test]
    fn test_add_rejects_total_out_of_range() {
        let (_dir, conn) = test_db();
        let bank = accounts::create(&conn, &AccountInput::new(AccountType::Asset, "Bank")).unwrap();
        let card = accounts::create(&conn, &AccountInput::new(AccountType::Liability, "Card")).unwrap();
        ledger::add(&conn, &posting(card, bank, i64::MAX, "")).unwrap();
        ledger::add(&conn, &posting(card, bank, 1, "")).unwrap();
        let mut out = Vec::new();
        let mut sel = ScriptedSelector::new([Selection::Chosen(vec![1]), Selection::Chosen(vec![0, 1])]);
        let mut ed = ScriptedEditor::default();
        let mut s = session(conn, "huge\n", &mut out, &mut sel, &mut ed);

        assert!(matches!(add(&mut s), Err(HearthError::Validation { .. })));
        assert!(groups::list(&s.conn).unwrap().is_empty());
    }

    #[test]
    fn test_edit_renames_and_changes_members() {
        let (_dir, conn) = test_db();
        let (_bank, card) = card_payments(&conn);
        let gid = groups::create(&conn, "october", card, &[1]).unwrap();
        let mut out = Vec::new();
        let mut sel = ScriptedSelector::new([
            Selection::Chosen(vec![0]),
            // candidates are newest first: 3, 2
            Selection::Chosen(vec![0]),
            Selection::Chosen(vec![0]),
        ]);
        let mut ed = ScriptedEditor::default();
        let mut s = session(conn, "n\nnovember\na\nr\nq\n", &mut out, &mut sel, &mut ed);

        edit(&mut s).unwrap();

        let group = groups::get(&s.conn, gid).unwrap();
        assert_eq!(group.name, "november");
        let ids: Vec<i64> = groups::members(&s.conn, gid).unwrap().iter().map(|t| t.id).collect();
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn test_remove_keeps_transactions() {
        let (_dir, conn) = test_db();
        let (_bank, card) = card_payments(&conn);
        groups::create(&conn, "october", card, &[1, 2, 3]).unwrap();
        let mut out = Vec::new();
        let mut sel = ScriptedSelector::new([Selection::Chosen(vec![0])]);
        let mut ed = ScriptedEditor::default();
        let mut s = session(conn, "y\n", &mut out, &mut sel, &mut ed);

        remove(&mut s).unwrap();

        assert!(groups::list(&s.conn).unwrap().is_empty());
        assert_eq!(ledger::list_all(&s.conn, ledger::Order::Ascending).unwrap().len(), 3);
    }
}
