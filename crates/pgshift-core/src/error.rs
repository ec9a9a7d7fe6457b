use thiserror::Error;

/// Core error type for schema migration operations.
///
/// Everything surfaced through this type is a fatal failure: it unwinds to the
/// caller's transaction. Soft failures (a NOT NULL that cannot be added, a
/// constraint that cannot be dropped) are reported as outcomes instead.
#[derive(Error, Debug)]
pub enum PgShiftError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Object already exists: {0}")]
    DuplicateObject(String),

    /// The catalog reported a kind outside the closed set this crate maps.
    #[error("Unmapped catalog kind {kind:?} for relation {relation:?}")]
    UnmappedCatalogKind { relation: String, kind: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Plan error: {0}")]
    Plan(String),
}

impl PgShiftError {
    /// Whether this wraps a PostgreSQL `duplicate_table` / `duplicate_object` error.
    pub fn is_duplicate_object(&self) -> bool {
        match self {
            PgShiftError::DuplicateObject(_) => true,
            PgShiftError::Sql(sqlx::Error::Database(db)) => {
                matches!(db.code().as_deref(), Some("42P07") | Some("42710"))
            }
            _ => false,
        }
    }
}

/// Result type alias using PgShiftError.
pub type Result<T> = std::result::Result<T, PgShiftError>;
