use thiserror::Error;

#[derive(Error, Debug)]
pub enum HearthError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Date(#[from] crate::dates::DateError),

    /// A single record failed validation; nothing was written.
    #[error("{field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Unknown account: {0}")]
    MissingAccount(String),

    /// The store refused a write because another row still points at the target.
    #[error("Still referenced: {0}")]
    Referential(String),

    /// A lookup that must match exactly one history row did not.
    #[error("History inconsistent: {0}")]
    Consistency(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("line {line}: {source}")]
    Import {
        line: u64,
        #[source]
        source: Box<HearthError>,
    },

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Collaborator(String),
}

impl HearthError {
    pub fn validation(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Translate SQLite foreign-key failures into a referential error.
    pub fn from_delete(err: rusqlite::Error, what: &str) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::Referential(what.to_string())
            }
            _ => Self::Db(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, HearthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_error_prefixes_line() {
        let err = HearthError::Import {
            line: 3,
            source: Box::new(HearthError::validation("debit", "unknown account 'Cash'")),
        };
        assert_eq!(err.to_string(), "line 3: debit: unknown account 'Cash'");
    }

    #[test]
    fn test_non_constraint_delete_error_passes_through() {
        let err = HearthError::from_delete(rusqlite::Error::QueryReturnedNoRows, "account");
        assert!(matches!(err, HearthError::Db(_)));
    }
}
