pub mod accounts;
pub mod groups;
pub mod init;
pub mod templates;
pub mod transactions;

use std::fmt::Display;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing::debug;

use crate::dates::{self, YearMonth};
use crate::db::{get_connection, init_db};
use crate::error::{HearthError, Result};
use crate::fmt::numbered;
use crate::models::{Account, Draft, Window};
use crate::picker::{Editor, ExternalEditor, ProcessSelector, Selection, Selector};
use crate::settings::{get_data_dir, Settings, DB_FILE};

const MAX_TEXT: usize = 64;

#[derive(Parser)]
#[command(name = "hearth", version, about = "Double-entry ledger for the household books.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and initialize the database.
    Init {
        /// Path for hearth data (default: ~/Documents/hearth)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Manage the chart of accounts.
    Account {
        #[command(subcommand)]
        command: AccountCommands,
    },
    /// Record, correct and undo transactions.
    Transaction {
        #[command(subcommand)]
        command: TransactionCommands,
    },
    /// Reusable sets of transactions.
    Template {
        #[command(subcommand)]
        command: TemplateCommands,
    },
    /// Reconciliation groups.
    Group {
        #[command(subcommand)]
        command: GroupCommands,
    },
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// List all accounts.
    List,
    /// Add an account. Prompts for the fields when no arguments are given.
    Add {
        /// TYPE NAME [ALIASES [PARENT]]
        args: Vec<String>,
    },
    /// Edit an account.
    Edit,
    /// Remove an account that no transaction uses.
    Remove,
    /// Change the display order of sibling accounts.
    Reorder,
    /// Import accounts from a tab-separated file.
    Import { file: PathBuf },
    /// Export accounts as tab-separated lines.
    Export { file: Option<PathBuf> },
}

#[derive(Subcommand)]
pub enum TransactionCommands {
    /// List the transactions of a month.
    List {
        /// List every transaction
        #[arg(long)]
        all: bool,
        /// Month: empty for this month, -N, M, Y/M or YYYYMM
        #[arg(allow_negative_numbers = true)]
        month: Option<String>,
    },
    /// Add a transaction. Prompts for the fields when no arguments are given.
    Add {
        /// DATE DEBIT CREDIT AMOUNT [NOTE [START END]]
        #[arg(allow_negative_numbers = true)]
        args: Vec<String>,
    },
    /// Edit a transaction.
    Edit,
    /// Remove a transaction.
    Remove,
    /// Revert the latest change of a transaction.
    Undo,
    /// Show recorded changes.
    History {
        /// Show every change
        #[arg(long)]
        all: bool,
        /// Month the change was made in
        #[arg(allow_negative_numbers = true)]
        month: Option<String>,
    },
    /// Pick a transaction and show its history.
    Search,
    /// Import transactions from a tab-separated file.
    Import { file: PathBuf },
    /// Export transactions as tab-separated lines.
    Export { file: Option<PathBuf> },
}

#[derive(Subcommand)]
pub enum TemplateCommands {
    /// List templates with their items.
    List,
    /// Create a template and fill in its items.
    Add,
    /// Edit the items of a template.
    Edit,
    /// Remove a template.
    Remove,
    /// Post the transactions of a template.
    Use,
    /// Import templates from a tab-separated file.
    Import { file: PathBuf },
    /// Export templates as tab-separated lines.
    Export { file: Option<PathBuf> },
}

#[derive(Subcommand)]
pub enum GroupCommands {
    /// List groups and whether they balance.
    List,
    /// Create a group from ungrouped transactions.
    Add,
    /// Rename a group or change its members.
    Edit,
    /// Remove a group. Its transactions are kept.
    Remove,
}

/// Everything a command handler talks to.
pub struct Session<'a> {
    conn: Connection,
    input: Box<dyn BufRead + 'a>,
    output: Box<dyn Write + 'a>,
    selector: Box<dyn Selector + 'a>,
    editor: Box<dyn Editor + 'a>,
    today: NaiveDate,
}

impl<'a> Session<'a> {
    pub fn new(
        conn: Connection,
        input: impl BufRead + 'a,
        output: impl Write + 'a,
        selector: impl Selector + 'a,
        editor: impl Editor + 'a,
        today: NaiveDate,
    ) -> Self {
        Self {
            conn,
            input: Box::new(input),
            output: Box::new(output),
            selector: Box::new(selector),
            editor: Box::new(editor),
            today,
        }
    }

    /// Open the configured database on the terminal.
    pub fn open(settings: &Settings) -> Result<Session<'static>> {
        let dir = get_data_dir();
        std::fs::create_dir_all(&dir)?;
        let conn = get_connection(&dir.join(DB_FILE))?;
        init_db(&conn)?;
        debug!(dir = %dir.display(), "database opened");
        Ok(Session::new(
            conn,
            std::io::stdin().lock(),
            std::io::stdout(),
            ProcessSelector {
                command: settings.selector.clone(),
            },
            ExternalEditor {
                command: settings.editor.clone(),
            },
            dates::today(),
        ))
    }

    pub fn say(&mut self, text: impl Display) -> Result<()> {
        writeln!(self.output, "{text}")?;
        Ok(())
    }

    /// Print `prompt` and read one trimmed line. End of input is an error.
    pub fn ask(&mut self, prompt: &str) -> Result<String> {
        write!(self.output, "{prompt}")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(HearthError::Collaborator("unexpected end of input".to_string()));
        }
        Ok(line.trim().to_string())
    }

    /// Lower-cased answer, for the single-letter command loops.
    fn command(&mut self, prompt: &str) -> Result<String> {
        Ok(self.ask(prompt)?.to_lowercase())
    }

    pub fn confirm(&mut self, question: &str) -> Result<bool> {
        loop {
            match self.command(&format!("{question} (y/n): "))?.as_str() {
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => {}
            }
        }
    }

    pub fn pick_one(&mut self, header: &str, lines: &[String]) -> Result<Option<usize>> {
        if lines.is_empty() {
            return Ok(None);
        }
        let shown = numbered(lines);
        let picked = self.selector.select(header, &shown, false)?.chosen();
        Ok(picked.and_then(|indices| indices.first().copied()))
    }

    pub fn pick_many(&mut self, header: &str, lines: &[String]) -> Result<Option<Vec<usize>>> {
        if lines.is_empty() {
            return Ok(None);
        }
        let shown = numbered(lines);
        Ok(self.selector.select(header, &shown, true)?.chosen())
    }

    pub fn edit_text(&mut self, text: &str) -> Result<Option<String>> {
        Ok(self.editor.edit(text)?.chosen())
    }

    pub fn scan_date(&mut self) -> Result<NaiveDate> {
        loop {
            let s = self.ask("Date: ")?;
            match dates::parse_date(&s, self.today) {
                Ok(date) => return Ok(date),
                Err(e) => self.say(e)?,
            }
        }
    }

    pub fn scan_amount(&mut self) -> Result<i64> {
        loop {
            let s = self.ask("Amount: ")?;
            match s.replace(',', "").parse::<i64>() {
                Ok(amount) => return Ok(amount),
                Err(_) => self.say(format!("amount: not a number: '{s}'"))?,
            }
        }
    }

    /// Free text without tabs, at most 64 characters. May be empty.
    pub fn scan_text(&mut self, label: &str) -> Result<String> {
        loop {
            let s = self.ask(&format!("{label}: "))?;
            if s.contains('\t') {
                self.say(format!("{}: must not contain tabs", label.to_lowercase()))?;
            } else if s.chars().count() > MAX_TEXT {
                self.say(format!("{}: at most {MAX_TEXT} characters", label.to_lowercase()))?;
            } else {
                return Ok(s);
            }
        }
    }

    pub fn scan_name(&mut self, label: &str) -> Result<String> {
        loop {
            let s = self.scan_text(label)?;
            if !s.is_empty() {
                return Ok(s);
            }
            self.say(format!("{}: required", label.to_lowercase()))?;
        }
    }

    fn scan_month(&mut self, label: &str) -> Result<Option<YearMonth>> {
        loop {
            let s = self.ask(&format!("{label}: "))?;
            match dates::parse_month(&s, self.today) {
                Ok(month) => return Ok(month),
                Err(e) => self.say(e)?,
            }
        }
    }

    /// An empty start month means no window.
    pub fn scan_window(&mut self) -> Result<Option<Window>> {
        let Some(start) = self.scan_month("Start month")? else {
            return Ok(None);
        };
        loop {
            let Some(end) = self.scan_month("End month")? else {
                self.say("window: end month is required when a start month is set")?;
                continue;
            };
            match Window::new(start, end) {
                Ok(window) => return Ok(Some(window)),
                Err(e) => self.say(e)?,
            }
        }
    }
}

/// `0`, `0, 1` or `0-N`: the indices a loop prompt accepts.
pub(crate) fn index_range(len: usize) -> String {
    match len {
        0 => String::new(),
        1 => "0".to_string(),
        2 => "0, 1".to_string(),
        n => format!("0-{}", n - 1),
    }
}

pub(crate) fn select_account(session: &mut Session, accounts: &[Account], header: &str) -> Result<Option<Account>> {
    let lines: Vec<String> = accounts.iter().map(Account::to_line).collect();
    Ok(session
        .pick_one(header, &lines)?
        .map(|i| accounts[i].clone()))
}

/// Let the user amend a draft until they accept (`true`) or quit (`false`).
pub(crate) fn confirm_draft(session: &mut Session, accounts: &[Account], draft: &mut Draft) -> Result<bool> {
    loop {
        session.say("")?;
        session.say(draft.to_line())?;
        let answer =
            session.command("y(es), d(ate), l(eft), r(ight), a(mount), n(ote), s(tart-end), q(uit): ")?;
        match answer.as_str() {
            "q" | "quit" => return Ok(false),
            "y" | "yes" => return Ok(true),
            "d" | "date" => draft.posting.date = session.scan_date()?,
            "l" | "left" => {
                if let Some(debit) = select_account(session, accounts, "Debit")? {
                    draft.posting.debit_id = debit.id;
                    draft.debit_name = debit.name;
                }
            }
            "r" | "right" => {
                if let Some(credit) = select_account(session, accounts, "Credit")? {
                    draft.posting.credit_id = credit.id;
                    draft.credit_name = credit.name;
                }
            }
            "a" | "amount" => draft.posting.amount = session.scan_amount()?,
            "n" | "note" => draft.posting.note = session.scan_text("Note")?,
            "s" | "start-end" => draft.posting.window = session.scan_window()?,
            _ => {}
        }
    }
}

/// Write to `file` when given, to the session output otherwise.
pub(crate) fn export_to<F>(session: &mut Session, file: Option<PathBuf>, write: F) -> Result<()>
where
    F: FnOnce(&Connection, &mut dyn Write) -> Result<()>,
{
    match file {
        Some(path) => {
            let mut out = std::fs::File::create(&path)?;
            write(&session.conn, &mut out)?;
            session.say(format!("Exported to {}", path.display()))
        }
        None => write(&session.conn, &mut session.output),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::db::test_db;
    use crate::picker::scripted::{ScriptedEditor, ScriptedSelector};

    #[test]
    fn test_index_range() {
        assert_eq!(index_range(0), "");
        assert_eq!(index_range(1), "0");
        assert_eq!(index_range(2), "0, 1");
        assert_eq!(index_range(5), "0-4");
    }

    #[test]
    fn test_scan_date_retries_until_valid() {
        let (_dir, conn) = test_db();
        let mut out = Vec::new();
        let mut sel = ScriptedSelector::default();
        let mut ed = ScriptedEditor::default();
        let mut s = session(conn, "13/40\n-1\n", &mut out, &mut sel, &mut ed);
        assert_eq!(s.scan_date().unwrap(), NaiveDate::from_ymd_opt(2019, 11, 14).unwrap());
        drop(s);
        assert_eq!(text(out).matches("Date: ").count(), 2);
    }

    #[test]
    fn test_scan_window_requires_end_after_start() {
        let (_dir, conn) = test_db();
        let mut out = Vec::new();
        let mut sel = ScriptedSelector::default();
        let mut ed = ScriptedEditor::default();
        let mut s = session(conn, "2019/10\n\n2019/9\n2019/12\n", &mut out, &mut sel, &mut ed);
        let window = s.scan_window().unwrap().unwrap();
        assert_eq!(window.to_string(), "[2019-10, 2019-12]");
        drop(s);
        let out = text(out);
        assert!(out.contains("end month is required"));
        assert!(out.contains("after end month"));
    }

    #[test]
    fn test_empty_start_month_means_no_window() {
        let (_dir, conn) = test_db();
        let mut out = Vec::new();
        let mut sel = ScriptedSelector::default();
        let mut ed = ScriptedEditor::default();
        let mut s = session(conn, "\n", &mut out, &mut sel, &mut ed);
        assert_eq!(s.scan_window().unwrap(), None);
    }

    #[test]
    fn test_end_of_input_is_an_error() {
        let (_dir, conn) = test_db();
        let mut out = Vec::new();
        let mut sel = ScriptedSelector::default();
        let mut ed = ScriptedEditor::default();
        let mut s = session(conn, "maybe\n", &mut out, &mut sel, &mut ed);
        assert!(matches!(s.confirm("Sure?"), Err(HearthError::Collaborator(_))));
    }

    #[test]
    fn test_scan_amount_accepts_separators() {
        let (_dir, conn) = test_db();
        let mut out = Vec::new();
        let mut sel = ScriptedSelector::default();
        let mut ed = ScriptedEditor::default();
        let mut s = session(conn, "abc\n-1,500\n", &mut out, &mut sel, &mut ed);
        assert_eq!(s.scan_amount().unwrap(), -1500);
    }

    #[test]
    fn test_scan_text_rejects_long_input() {
        let (_dir, conn) = test_db();
        let input = format!("{}\nshort\n", "x".repeat(65));
        let mut out = Vec::new();
        let mut sel = ScriptedSelector::default();
        let mut ed = ScriptedEditor::default();
        let mut s = session(conn, &input, &mut out, &mut sel, &mut ed);
        assert_eq!(s.scan_text("Note").unwrap(), "short");
    }
}
