use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

use crate::dates::YearMonth;
use crate::error::{HearthError, Result};
use crate::fmt::{amount, pad};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountType {
    Asset = 1,
    Liability = 2,
    Income = 3,
    Expense = 4,
    Equity = 5,
}

impl AccountType {
    pub const ALL: [AccountType; 5] = [
        Self::Asset,
        Self::Liability,
        Self::Income,
        Self::Expense,
        Self::Equity,
    ];

    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Asset => "Asset",
            Self::Liability => "Liability",
            Self::Income => "Income",
            Self::Expense => "Expense",
            Self::Equity => "Equity",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AccountType {
    type Err = HearthError;

    /// Accepts the English name (any case) or the numeric code 1-5.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(code) = s.parse::<i64>() {
            return Self::from_code(code)
                .ok_or_else(|| HearthError::validation("type", format!("unknown type '{s}'")));
        }
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| HearthError::validation("type", format!("unknown type '{s}'")))
    }
}

impl ToSql for AccountType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for AccountType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let code = i64::column_result(value)?;
        Self::from_code(code).ok_or(FromSqlError::OutOfRange(code))
    }
}

/// A row of the chart of accounts.
///
/// Root accounts store their own id in `parent_id`; use [`Account::parent`]
/// rather than comparing against a null value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: i64,
    pub account_type: AccountType,
    pub name: String,
    pub aliases: String,
    pub order_no: i64,
    pub extraordinary: bool,
    pub parent_id: i64,
    pub parent_name: String,
}

impl Account {
    pub fn parent(&self) -> Option<i64> {
        (self.parent_id != self.id).then_some(self.parent_id)
    }

    pub fn has_parent(&self) -> bool {
        self.parent().is_some()
    }

    pub fn to_line(&self) -> String {
        format!(
            "{} {} {} {}",
            self.account_type,
            pad(&self.name, 16),
            pad(&format!("({})", self.parent_name), 20),
            self.aliases
        )
        .trim_end()
        .to_string()
    }
}

/// Fields supplied when creating or editing an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInput {
    pub account_type: AccountType,
    pub name: String,
    pub aliases: String,
    pub parent: Option<i64>,
    pub extraordinary: bool,
}

impl AccountInput {
    pub fn new(account_type: AccountType, name: &str) -> Self {
        Self {
            account_type,
            name: name.to_string(),
            aliases: String::new(),
            parent: None,
            extraordinary: false,
        }
    }

    pub fn from_account(account: &Account) -> Self {
        Self {
            account_type: account.account_type,
            name: account.name.clone(),
            aliases: account.aliases.clone(),
            parent: account.parent(),
            extraordinary: account.extraordinary,
        }
    }
}

/// Months over which a transaction is recognised, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: YearMonth,
    pub end: YearMonth,
}

impl Window {
    pub fn new(start: YearMonth, end: YearMonth) -> Result<Self> {
        if start > end {
            return Err(HearthError::validation(
                "window",
                format!("start month {start} is after end month {end}"),
            ));
        }
        Ok(Self { start, end })
    }

    /// Build from the persisted `(start_month, end_month)` pair where `0` means unset.
    pub fn from_columns(start: i64, end: i64) -> Result<Option<Self>> {
        match (start, end) {
            (0, 0) => Ok(None),
            (0, _) | (_, 0) => Err(HearthError::validation(
                "window",
                format!("start and end month must both be set or both be empty (start = {start}, end = {end})"),
            )),
            _ => {
                let start_ym = YearMonth::from_int(start).ok_or_else(|| {
                    HearthError::validation("start month", format!("invalid month {start}"))
                })?;
                let end_ym = YearMonth::from_int(end).ok_or_else(|| {
                    HearthError::validation("end month", format!("invalid month {end}"))
                })?;
                Self::new(start_ym, end_ym).map(Some)
            }
        }
    }

    pub fn to_columns(window: Option<Window>) -> (i64, i64) {
        window.map_or((0, 0), |w| (w.start.to_int(), w.end.to_int()))
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// The editable content of a transaction: value flows from `credit_id` to `debit_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub date: NaiveDate,
    pub debit_id: i64,
    pub credit_id: i64,
    pub amount: i64,
    pub note: String,
    pub window: Option<Window>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub id: i64,
    pub version: i64,
    pub posting: Posting,
    pub debit_name: String,
    pub credit_name: String,
}

impl Transaction {
    /// Column-aligned rendering used by listings and the selector.
    pub fn to_line(&self) -> String {
        posting_line(&self.posting, &self.debit_name, &self.credit_name)
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = &self.posting;
        write!(
            f,
            "{} {} / {} {} {}",
            p.date.format("%Y-%m-%d"),
            self.debit_name,
            self.credit_name,
            amount(p.amount),
            p.note
        )?;
        if let Some(w) = p.window {
            write!(f, " {w}")?;
        }
        Ok(())
    }
}

pub fn posting_line(p: &Posting, debit_name: &str, credit_name: &str) -> String {
    let note = if p.note.is_empty() {
        String::new()
    } else {
        format!(" {}", p.note)
    };
    let window = match p.window {
        Some(w) => format!(" {w}"),
        None if !note.is_empty() => " ".repeat(19),
        None => String::new(),
    };
    format!(
        "{} {} {} {:>9}{window}{note}",
        p.date.format("%Y-%m-%d"),
        pad(debit_name, 16),
        pad(credit_name, 16),
        amount(p.amount)
    )
}

/// A transaction about to be written, shown to the user for confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub posting: Posting,
    pub debit_name: String,
    pub credit_name: String,
    /// Stamped from a template item without a default amount; the caller has
    /// to supply one.
    pub ask_amount: bool,
}

impl Draft {
    pub fn to_line(&self) -> String {
        posting_line(&self.posting, &self.debit_name, &self.credit_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromSql for Operation {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "INSERT" => Ok(Self::Insert),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

impl ToSql for Operation {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

/// One immutable row of a transaction's version lineage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub history_id: i64,
    pub operation: Operation,
    pub operate_time: NaiveDateTime,
    pub transaction_id: i64,
    pub version: i64,
    pub posting: Posting,
    pub debit_name: String,
    pub credit_name: String,
}

impl HistoryEntry {
    pub fn to_line(&self) -> String {
        format!(
            "{} {} {}",
            self.operate_time.format("%Y-%m-%d %H:%M:%S"),
            self.operation,
            posting_line(&self.posting, &self.debit_name, &self.credit_name)
        )
    }
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} v{} {} {} / {} {} {}",
            self.operate_time.format("%Y-%m-%d %H:%M:%S"),
            self.operation,
            self.version,
            self.posting.date.format("%Y-%m-%d"),
            self.debit_name,
            self.credit_name,
            amount(self.posting.amount),
            self.posting.note
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub id: i64,
    pub name: String,
}

/// A transaction skeleton inside a template. `no` is the stable identity,
/// `order_no` only the display rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateItem {
    pub template_id: i64,
    pub no: i64,
    pub order_no: i64,
    pub debit_id: i64,
    pub debit_name: String,
    pub credit_id: i64,
    pub credit_name: String,
    pub amount: i64,
    pub note: String,
}

impl fmt::Display for TemplateItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {} {} {}",
            self.debit_name,
            self.credit_name,
            amount(self.amount),
            self.note
        )
    }
}

/// Skeleton fields supplied when adding or editing a template item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemInput {
    pub debit_id: i64,
    pub credit_id: i64,
    pub amount: i64,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub check_account_id: i64,
    pub check_account_name: String,
    pub debit: i64,
    pub credit: i64,
}

impl Group {
    pub fn is_balanced(&self) -> bool {
        self.debit == self.credit
    }

    pub fn mark(&self) -> char {
        if self.is_balanced() {
            'o'
        } else {
            'x'
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}, {}, {}]",
            self.mark(),
            self.name,
            self.check_account_name,
            amount(self.debit),
            amount(self.credit)
        )
    }
}
