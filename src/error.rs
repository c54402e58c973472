use std::path::PathBuf;

/// Errors produced by the storage layer (catalog database and settings).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying SQLite call failed.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The application data directory could not be determined or created.
    #[error("could not prepare data directory {path}: {source}")]
    DataDir {
        /// Directory that was attempted.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A persisted settings value failed to parse. Clearing the key recovers.
    #[error("settings value for '{key}' is corrupted: {source}")]
    CorruptSetting {
        /// The settings key that failed to parse.
        key: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors surfaced by the triage engine handle.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TriageError {
    /// The engine task has shut down and can no longer accept commands.
    #[error("triage engine is closed")]
    EngineClosed,
}
