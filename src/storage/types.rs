use chrono::{DateTime, Utc};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The database could not be opened (bad URL, unreadable file, locked)
    #[error("Failed to connect to database: {0}")]
    Connect(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A batch insert failed; earlier batches of the same save stay committed
    #[error("Failed to insert item batch {batch} of {total}: {source}")]
    Batch {
        batch: usize,
        total: usize,
        #[source]
        source: sqlx::Error,
    },

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

// ============================================================================
// Write-side Types
// ============================================================================

/// Identity of the publication a feed belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteInfo {
    pub name: String,
    pub url: String,
}

/// One item ready to be written.
///
/// `image_url` is carried on the item itself; an item whose entry had no
/// image is stored with a NULL image URL.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub title: String,
    pub link: String,
    pub published: Option<DateTime<Utc>>,
    pub description: String,
    pub image_url: Option<String>,
    pub tags: String,
}

/// Outcome of [`Database::save_site_and_items`](super::Database::save_site_and_items).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    /// Site the items were attached to; `None` when no row was inserted
    pub site_id: Option<i64>,
    /// Number of INSERT statements issued
    pub batches: usize,
    /// Rows actually inserted (links that lost the reservation race are not counted)
    pub inserted: usize,
}

// ============================================================================
// Read-side Types
// ============================================================================

/// Site row from database
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Site {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Item row from database
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Item {
    pub id: i64,
    pub title: String,
    pub link: String,
    pub published_at: i64,
    pub site_id: i64,
    pub description: String,
    pub image_url: Option<String>,
    pub tags: String,
    pub created_at: i64,
    pub updated_at: i64,
}
