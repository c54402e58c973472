//! Photo triage engine.
//!
//! Classification of a photo catalog into keep/trash/maybe with
//! optimistic writes, undo, deterministic shuffle ordering and
//! combo-style burst tracking. The engine runs as a single tokio task
//! and publishes immutable snapshots over a `watch` channel; the
//! catalog lives in sqlite behind a pair of narrow store traits, so
//! tests and alternative backends can swap it out.
//!
//! Typical setup:
//!
//! ```no_run
//! use std::sync::Arc;
//! use photo_triage::{EngineConfig, Library, NoSideEffects, TriageEngine};
//!
//! # async fn run() -> Result<(), photo_triage::StoreError> {
//! let library = Arc::new(Library::new()?);
//! let engine = TriageEngine::new(
//!     Arc::clone(&library),
//!     library,
//!     Arc::new(NoSideEffects),
//!     EngineConfig::default(),
//! );
//! let snapshots = engine.subscribe();
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod state;
pub mod store;

pub use engine::combo::ComboSnapshot;
pub use engine::criteria::{Criteria, FilterMode, PageFilter, SessionFilter};
pub use engine::{EngineConfig, EngineSnapshot, TriageEngine};
pub use error::{StoreError, TriageError};
pub use state::data::{
    DateRange, Photo, PhotoId, PhotoStatus, SessionCounters, SortOrder, UndoEntry,
};
pub use state::library::Library;
pub use store::{NoSideEffects, PhotoStore, SettingsStore, SideEffects};
