//! Error types for the ingestion pipeline.
//!
//! [`ScanError`] is what a scan worker sees for a failed snapshot pass.
//! [`StoreError`] covers the persistence layer and [`NotifyError`] the
//! notification path; the latter never leaves the dispatcher.

use crate::domain::EntityKind;

/// Failure category of the pipeline's error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed snapshot; aborts that pass only.
    Structural,
    /// Storage error worth retrying.
    TransientStorage,
    /// Storage error that aborts the in-progress upsert.
    FatalStorage,
    /// Shortener, email, or webhook failure; logged and swallowed.
    Notification,
    /// Startup configuration or credential problem.
    Configuration,
}

/// Error surfaced to the caller of a snapshot pass.
///
/// # Error Codes
///
/// | Range     | Category      |
/// |-----------|---------------|
/// | 1000–1999 | Snapshot      |
/// | 2000–2999 | Storage       |
/// | 4000–4999 | Configuration |
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// The snapshot does not have the expected shape.
    #[error("malformed snapshot: {0}")]
    Structural(String),

    /// The snapshot source could not deliver a snapshot.
    #[error("snapshot source failed: {0}")]
    Source(String),

    /// One or more entity kinds failed to persist during a pass.
    #[error("persistence failed for {failed} entity kind(s); {committed}/{attempted} records committed")]
    Persistence {
        /// Number of entity kinds whose upsert aborted.
        failed: usize,
        /// Records handed to the store in this pass.
        attempted: usize,
        /// Records committed before the failures.
        committed: usize,
        /// First failure observed.
        #[source]
        first: StoreError,
    },

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ScanError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Structural(_) => 1001,
            Self::Source(_) => 1002,
            Self::Persistence { .. } => 2001,
            Self::Config(_) => 4001,
        }
    }

    /// Returns the taxonomy class of this error.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Structural(_) | Self::Source(_) => ErrorClass::Structural,
            Self::Persistence { first, .. } => first.class(),
            Self::Config(_) => ErrorClass::Configuration,
        }
    }
}

/// Persistence layer failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A non-transient error (or an exhausted retry budget) aborted an
    /// upsert call. Chunks before the failing one stay committed.
    #[error("upsert of {kind} aborted after {committed}/{attempted} records: {source}")]
    UpsertAborted {
        /// Entity kind being upserted.
        kind: EntityKind,
        /// Records handed to the call.
        attempted: usize,
        /// Records committed before the abort.
        committed: usize,
        /// Underlying driver error.
        #[source]
        source: sqlx::Error,
    },

    /// A read query or connection setup failed.
    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// A stored row could not be mapped back into an entity.
    #[error("corrupt row in {table}: {reason}")]
    CorruptRow {
        /// Table the row came from.
        table: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}

impl StoreError {
    /// Records committed before this error, when known.
    #[must_use]
    pub const fn committed(&self) -> usize {
        match self {
            Self::UpsertAborted { committed, .. } => *committed,
            _ => 0,
        }
    }

    /// Returns `true` if retrying the same operation may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::UpsertAborted { source, .. } | Self::Query(source) => {
                crate::persistence::retry::is_transient(source)
            }
            Self::Migrate(_) | Self::CorruptRow { .. } => false,
        }
    }

    /// Returns the taxonomy class of this error.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        if self.is_transient() {
            ErrorClass::TransientStorage
        } else {
            ErrorClass::FatalStorage
        }
    }
}

/// Notification path failure. Logged by the dispatcher, never propagated.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// URL shortening failed or returned garbage.
    #[error("url shortener failed: {0}")]
    Shortener(String),

    /// Building or sending an email failed.
    #[error("email delivery failed: {0}")]
    Email(String),

    /// A webhook endpoint rejected or failed the post.
    #[error("webhook {endpoint} failed: {reason}")]
    Webhook {
        /// Endpoint URL.
        endpoint: String,
        /// Failure description.
        reason: String,
    },

    /// An outbound call exceeded its bound.
    #[error("{0} timed out")]
    Timeout(&'static str),
}

impl NotifyError {
    /// Returns the taxonomy class of this error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        ErrorClass::Notification
    }
}
