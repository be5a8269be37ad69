use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process has the report database locked
    #[error("Another feedpatch run appears to hold the report database. Let it finish and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // Check for SQLite lock-related error messages
        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// Per-file processing statistics, one row per run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportEntry {
    pub filename: String,
    pub offers_total: i64,
    pub availability_updates: i64,
    pub labels_added: i64,
    pub images_deleted: i64,
    pub images_inserted: i64,
    pub images_promo_inserted: i64,
    pub offers_deleted: i64,
}

/// One offer in a feed's catalog snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub offer_id: String,
    pub name: String,
    pub available: Option<String>,
}

/// A stored report row, as read back from the database
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Report {
    pub id: i64,
    pub filename: String,
    pub offers_total: i64,
    pub availability_updates: i64,
    pub labels_added: i64,
    pub images_deleted: i64,
    pub images_inserted: i64,
    pub images_promo_inserted: i64,
    pub offers_deleted: i64,
    pub processed_at: i64,
}

/// Internal row type for catalog read-back queries
pub(crate) type CatalogRow = (String, String, Option<String>);
