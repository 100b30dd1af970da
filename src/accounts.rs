use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use crate::error::{HearthError, Result};
use crate::models::{Account, AccountInput, AccountType};
use crate::reorder;

const SELECT_ACCOUNT: &str = "
    SELECT a.id, a.account_type, a.name, a.aliases, a.order_no, a.extraordinary,
           a.parent_id, COALESCE(p.name, '')
    FROM accounts a
    LEFT JOIN accounts p ON p.id = a.parent_id";

fn row_to_account(row: &Row) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        account_type: row.get(1)?,
        name: row.get(2)?,
        aliases: row.get(3)?,
        order_no: row.get(4)?,
        extraordinary: row.get(5)?,
        parent_id: row.get(6)?,
        parent_name: row.get(7)?,
    })
}

fn query(conn: &Connection, tail: &str, args: impl rusqlite::Params) -> Result<Vec<Account>> {
    let mut stmt = conn.prepare(&format!("{SELECT_ACCOUNT} {tail}"))?;
    let accounts = stmt
        .query_map(args, row_to_account)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(accounts)
}

/// Every account, grouped by type and then by parent rank.
pub fn list(conn: &Connection) -> Result<Vec<Account>> {
    query(
        conn,
        "ORDER BY a.account_type, p.order_no, a.order_no, a.id",
        [],
    )
}

pub fn get(conn: &Connection, id: i64) -> Result<Account> {
    query(conn, "WHERE a.id = ?1", [id])?
        .into_iter()
        .next()
        .ok_or_else(|| HearthError::NotFound(format!("account {id}")))
}

pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Account>> {
    Ok(query(conn, "WHERE a.name = ?1", [name])?.into_iter().next())
}

pub fn exists(conn: &Connection, id: i64) -> Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM accounts WHERE id = ?1", [id], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

/// Root accounts of one type.
pub fn list_by_type(conn: &Connection, account_type: AccountType) -> Result<Vec<Account>> {
    query(
        conn,
        "WHERE a.account_type = ?1 AND a.id = a.parent_id ORDER BY a.order_no, a.id",
        [account_type],
    )
}

/// Parents whose children are worth reordering.
pub fn list_with_two_or_more_children(conn: &Connection) -> Result<Vec<Account>> {
    query(
        conn,
        "WHERE a.id IN (
             SELECT parent_id FROM accounts
             WHERE id <> parent_id
             GROUP BY parent_id
             HAVING COUNT(*) >= 2
         )
         ORDER BY a.account_type, a.order_no, a.id",
        [],
    )
}

pub fn children_of(conn: &Connection, parent_id: i64) -> Result<Vec<Account>> {
    query(
        conn,
        "WHERE a.parent_id = ?1 AND a.id <> a.parent_id ORDER BY a.order_no, a.id",
        [parent_id],
    )
}

fn validate(conn: &Connection, input: &AccountInput, id: Option<i64>) -> Result<()> {
    if input.name.trim().is_empty() {
        return Err(HearthError::validation("name", "must not be empty"));
    }
    if input.name.contains('\t') || input.aliases.contains('\t') {
        return Err(HearthError::validation("name", "must not contain tabs"));
    }
    if let Some(other) = find_by_name(conn, &input.name)? {
        if Some(other.id) != id {
            return Err(HearthError::validation(
                "name",
                format!("'{}' already exists", input.name),
            ));
        }
    }
    if let Some(parent) = input.parent {
        if Some(parent) != id && !exists(conn, parent)? {
            return Err(HearthError::MissingAccount(format!("parent {parent}")));
        }
    }
    Ok(())
}

/// Insert without opening a transaction; the caller owns atomicity.
pub(crate) fn insert(conn: &Connection, input: &AccountInput) -> Result<i64> {
    validate(conn, input, None)?;
    conn.execute(
        "INSERT INTO accounts (account_type, name, aliases, extraordinary, parent_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            input.account_type,
            input.name,
            input.aliases,
            input.extraordinary,
            input.parent
        ],
    )?;
    let id = conn.last_insert_rowid();
    if input.parent.is_none() {
        conn.execute("UPDATE accounts SET parent_id = id WHERE id = ?1", [id])?;
    }
    info!(id, name = %input.name, "account created");
    Ok(id)
}

/// Create an account. Without a parent it becomes its own parent.
pub fn create(conn: &Connection, input: &AccountInput) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    let id = insert(&tx, input)?;
    tx.commit()?;
    Ok(id)
}

pub fn edit(conn: &Connection, id: i64, input: &AccountInput) -> Result<()> {
    validate(conn, input, Some(id))?;
    let parent = input.parent.unwrap_or(id);
    let n = conn.execute(
        "UPDATE accounts
         SET account_type = ?2, name = ?3, aliases = ?4, extraordinary = ?5, parent_id = ?6
         WHERE id = ?1",
        params![
            id,
            input.account_type,
            input.name,
            input.aliases,
            input.extraordinary,
            parent
        ],
    )?;
    if n == 0 {
        return Err(HearthError::NotFound(format!("account {id}")));
    }
    info!(id, name = %input.name, "account edited");
    Ok(())
}

/// Delete an account. Fails with a referential error while transactions,
/// template items, groups or child accounts still point at it.
pub fn remove(conn: &Connection, id: i64) -> Result<()> {
    let n = conn
        .execute("DELETE FROM accounts WHERE id = ?1", [id])
        .map_err(|e| HearthError::from_delete(e, &format!("account {id} is in use")))?;
    if n == 0 {
        return Err(HearthError::NotFound(format!("account {id}")));
    }
    info!(id, "account removed");
    Ok(())
}

/// Apply a parsed permutation to a sibling set, writing only changed ranks.
/// Ranks start at `start`. Returns the number of accounts updated.
pub fn reorder(conn: &Connection, siblings: &[Account], ranks: &[usize], start: i64) -> Result<usize> {
    let current: Vec<i64> = siblings.iter().map(|a| a.order_no).collect();
    let changed = reorder::changed_ranks(&current, ranks, start);

    let tx = conn.unchecked_transaction()?;
    for &(i, order_no) in &changed {
        tx.execute(
            "UPDATE accounts SET order_no = ?2 WHERE id = ?1",
            params![siblings[i].id, order_no],
        )?;
    }
    tx.commit()?;
    info!(updated = changed.len(), "accounts reordered");
    Ok(changed.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;

    fn add(conn: &Connection, t: AccountType, name: &str, parent: Option<i64>) -> i64 {
        let mut input = AccountInput::new(t, name);
        input.parent = parent;
        create(conn, &input).unwrap()
    }

    #[test]
    fn test_root_account_is_its_own_parent() {
        let (_dir, conn) = test_db();
        let id = add(&conn, AccountType::Asset, "Cash", None);
        let a = get(&conn, id).unwrap();
        assert_eq!(a.parent_id, id);
        assert_eq!(a.parent_name, "Cash");
        assert!(!a.has_parent());
    }

    #[test]
    fn test_child_account_points_at_parent() {
        let (_dir, conn) = test_db();
        let food = add(&conn, AccountType::Expense, "Food", None);
        let lunch = add(&conn, AccountType::Expense, "Lunch", Some(food));
        let a = get(&conn, lunch).unwrap();
        assert_eq!(a.parent(), Some(food));
        assert_eq!(a.parent_name, "Food");
    }

    #[test]
    fn test_create_rejects_missing_parent_and_empty_name() {
        let (_dir, conn) = test_db();
        let mut input = AccountInput::new(AccountType::Asset, "Cash");
        input.parent = Some(99);
        assert!(matches!(create(&conn, &input), Err(HearthError::MissingAccount(_))));
        assert!(create(&conn, &AccountInput::new(AccountType::Asset, " ")).is_err());
        assert!(list(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let (_dir, conn) = test_db();
        add(&conn, AccountType::Asset, "Cash", None);
        let err = create(&conn, &AccountInput::new(AccountType::Expense, "Cash")).unwrap_err();
        assert!(matches!(err, HearthError::Validation { .. }));
    }

    #[test]
    fn test_edit_clearing_parent_restores_sentinel() {
        let (_dir, conn) = test_db();
        let food = add(&conn, AccountType::Expense, "Food", None);
        let lunch = add(&conn, AccountType::Expense, "Lunch", Some(food));
        let mut input = AccountInput::from_account(&get(&conn, lunch).unwrap());
        input.parent = None;
        input.aliases = "hirumeshi".into();
        input.extraordinary = true;
        edit(&conn, lunch, &input).unwrap();
        let a = get(&conn, lunch).unwrap();
        assert_eq!(a.parent_id, lunch);
        assert_eq!(a.aliases, "hirumeshi");
        assert!(a.extraordinary);
    }

    #[test]
    fn test_remove_referenced_account_fails() {
        let (_dir, conn) = test_db();
        let food = add(&conn, AccountType::Expense, "Food", None);
        add(&conn, AccountType::Expense, "Lunch", Some(food));
        assert!(matches!(remove(&conn, food), Err(HearthError::Referential(_))));
        let cash = add(&conn, AccountType::Asset, "Cash", None);
        remove(&conn, cash).unwrap();
        assert!(matches!(remove(&conn, cash), Err(HearthError::NotFound(_))));
    }

    #[test]
    fn test_hierarchy_queries() {
        let (_dir, conn) = test_db();
        let food = add(&conn, AccountType::Expense, "Food", None);
        add(&conn, AccountType::Expense, "Lunch", Some(food));
        add(&conn, AccountType::Expense, "Dinner", Some(food));
        let fun = add(&conn, AccountType::Expense, "Fun", None);
        add(&conn, AccountType::Expense, "Games", Some(fun));
        add(&conn, AccountType::Asset, "Cash", None);

        let roots: Vec<String> = list_by_type(&conn, AccountType::Expense)
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(roots, vec!["Food", "Fun"]);

        let parents = list_with_two_or_more_children(&conn).unwrap();
        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0].id, food);

        let children: Vec<String> = children_of(&conn, food)
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(children, vec!["Lunch", "Dinner"]);
    }

    #[test]
    fn test_reorder_children_writes_only_changes() {
        let (_dir, conn) = test_db();
        let food = add(&conn, AccountType::Expense, "Food", None);
        add(&conn, AccountType::Expense, "Lunch", Some(food));
        add(&conn, AccountType::Expense, "Dinner", Some(food));
        add(&conn, AccountType::Expense, "Snack", Some(food));

        let siblings = children_of(&conn, food).unwrap();
        let parent = get(&conn, food).unwrap();
        let ranks = reorder::parse_permutation("2 Snack\n0 Lunch\n1 Dinner\n", 3).unwrap();
        let updated = reorder(&conn, &siblings, &ranks, parent.order_no + 1).unwrap();
        assert_eq!(updated, 3);

        let names: Vec<String> = children_of(&conn, food)
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["Snack", "Lunch", "Dinner"]);

        let siblings = children_of(&conn, food).unwrap();
        let same = reorder::parse_permutation("0\n1\n2\n", 3).unwrap();
        assert_eq!(reorder(&conn, &siblings, &same, parent.order_no + 1).unwrap(), 0);
    }

    #[test]
    fn test_list_orders_by_type() {
        let (_dir, conn) = test_db();
        add(&conn, AccountType::Expense, "Food", None);
        add(&conn, AccountType::Asset, "Cash", None);
        let names: Vec<String> = list(&conn).unwrap().into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["Cash", "Food"]);
        assert!(find_by_name(&conn, "Cash").unwrap().is_some());
        assert!(find_by_name(&conn, "Bank").unwrap().is_none());
    }
}
