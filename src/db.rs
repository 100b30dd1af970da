use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY,
    account_type INTEGER NOT NULL,
    name TEXT NOT NULL UNIQUE,
    aliases TEXT NOT NULL DEFAULT '',
    order_no INTEGER NOT NULL DEFAULT 0,
    extraordinary INTEGER NOT NULL DEFAULT 0,
    parent_id INTEGER,
    FOREIGN KEY (parent_id) REFERENCES accounts(id)
);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    version INTEGER NOT NULL DEFAULT 0,
    date TEXT NOT NULL,
    debit_id INTEGER NOT NULL,
    credit_id INTEGER NOT NULL,
    amount INTEGER NOT NULL,
    note TEXT NOT NULL DEFAULT '',
    start_month INTEGER NOT NULL DEFAULT 0,
    end_month INTEGER NOT NULL DEFAULT 0,
    FOREIGN KEY (debit_id) REFERENCES accounts(id),
    FOREIGN KEY (credit_id) REFERENCES accounts(id)
);

CREATE TABLE IF NOT EXISTS transactions_history (
    history_id INTEGER PRIMARY KEY AUTOINCREMENT,
    transaction_id INTEGER NOT NULL,
    version INTEGER NOT NULL,
    operation TEXT NOT NULL,
    operate_time TEXT NOT NULL,
    date TEXT NOT NULL,
    debit_id INTEGER NOT NULL,
    credit_id INTEGER NOT NULL,
    amount INTEGER NOT NULL,
    note TEXT NOT NULL DEFAULT '',
    start_month INTEGER NOT NULL DEFAULT 0,
    end_month INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS transactions_history_tid
    ON transactions_history (transaction_id, version);

CREATE TABLE IF NOT EXISTS templates (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    last_no INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS templates_detail (
    template_id INTEGER NOT NULL,
    no INTEGER NOT NULL,
    order_no INTEGER NOT NULL,
    debit_id INTEGER NOT NULL,
    credit_id INTEGER NOT NULL,
    amount INTEGER NOT NULL DEFAULT 0,
    note TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (template_id, no),
    FOREIGN KEY (template_id) REFERENCES templates(id),
    FOREIGN KEY (debit_id) REFERENCES accounts(id),
    FOREIGN KEY (credit_id) REFERENCES accounts(id)
);

CREATE TABLE IF NOT EXISTS recon_groups (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    check_account_id INTEGER NOT NULL,
    FOREIGN KEY (check_account_id) REFERENCES accounts(id)
);

CREATE TABLE IF NOT EXISTS recon_groups_detail (
    group_id INTEGER NOT NULL,
    transaction_id INTEGER NOT NULL UNIQUE,
    PRIMARY KEY (group_id, transaction_id),
    FOREIGN KEY (group_id) REFERENCES recon_groups(id)
);
";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_db() -> (tempfile::TempDir, Connection) {
    let dir = tempfile::tempdir().unwrap();
    let conn = get_connection(&dir.path().join("test.db")).unwrap();
    init_db(&conn).unwrap();
    (dir, conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_db_creates_tables() {
        let (_dir, conn) = test_db();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        for expected in &[
            "accounts",
            "transactions",
            "transactions_history",
            "templates",
            "templates_detail",
            "recon_groups",
            "recon_groups_detail",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing table: {expected}");
        }
    }

    #[test]
    fn test_init_db_is_idempotent() {
        let (_dir, conn) = test_db();
        init_db(&conn).unwrap();
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let (_dir, conn) = test_db();
        let err = conn.execute(
            "INSERT INTO transactions (date, debit_id, credit_id, amount) VALUES ('2020-01-01', 1, 2, 10)",
            [],
        );
        assert!(err.is_err());
    }
}
