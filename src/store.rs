//! Collaborator traits the engine is built against.
//!
//! The engine never talks to sqlite (or any concrete backend) directly;
//! everything goes through these narrow seams so the UI layer can swap
//! in platform stores and the tests can swap in in-memory fakes.

use crate::engine::criteria::{Criteria, FilterMode, SessionFilter};
use crate::error::StoreError;
use crate::state::data::{Photo, PhotoId, PhotoStatus, SortOrder};

/// Read/write access to the photo catalog.
///
/// All methods are synchronous; the engine invokes them from
/// `tokio::task::spawn_blocking` so a slow catalog never stalls the
/// engine task. `count`, `ids` and `page` operate over the
/// "to classify" set, i.e. photos whose status is still `Unclassified`.
pub trait PhotoStore: Send + Sync + 'static {
    /// Number of unclassified photos matching `criteria`.
    fn count(&self, criteria: &Criteria) -> Result<u64, StoreError>;

    /// All matching photo ids, ordered. Used to materialize snapshot sessions.
    fn ids(&self, criteria: &Criteria, order: &SortOrder) -> Result<Vec<PhotoId>, StoreError>;

    /// One page of matching photos, ordered, with limit/offset applied
    /// store-side. Used by windowed sessions.
    fn page(
        &self,
        criteria: &Criteria,
        order: &SortOrder,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Photo>, StoreError>;

    /// Hydrate full records for `ids`, preserving the input order.
    /// Ids that no longer exist are silently skipped.
    fn by_ids(&self, ids: &[PhotoId]) -> Result<Vec<Photo>, StoreError>;

    /// Durably persist a classification for one photo.
    fn set_status(&self, id: PhotoId, status: PhotoStatus) -> Result<(), StoreError>;

    /// Durably persist a classification for many photos in one atomic write.
    fn set_status_batch(&self, ids: &[PhotoId], status: PhotoStatus) -> Result<(), StoreError>;
}

/// Persisted user preferences the engine resolves its session from.
pub trait SettingsStore: Send + Sync + 'static {
    /// The global filter mode (lowest-priority criteria source).
    fn filter_mode(&self) -> Result<FilterMode, StoreError>;

    /// The preferred sort order, if one was saved.
    fn sort_order(&self) -> Result<Option<SortOrder>, StoreError>;

    /// Save the preferred sort order.
    fn set_sort_order(&self, order: SortOrder) -> Result<(), StoreError>;

    /// The persisted session-scoped precise filter, if any.
    fn session_filter(&self) -> Result<Option<SessionFilter>, StoreError>;

    /// Persist the session-scoped precise filter.
    fn set_session_filter(&self, filter: &SessionFilter) -> Result<(), StoreError>;

    /// Remove the persisted session filter.
    fn clear_session_filter(&self) -> Result<(), StoreError>;
}

/// Fire-and-forget collaborators notified after a durable write succeeds.
///
/// Implementations must be cheap and non-blocking; they run on the engine
/// task and are never retried. Undo does not reverse these effects.
pub trait SideEffects: Send + Sync + 'static {
    /// Bump lifetime (cross-session) counters by `count` for `status`.
    fn lifetime_classified(&self, _count: usize, _status: PhotoStatus) {}

    /// Record a telemetry event for a confirmed classification.
    fn record_action(&self, _status: PhotoStatus) {}

    /// Ask the home-screen widget to refresh its numbers.
    fn refresh_widget(&self) {}
}

/// Default collaborator that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSideEffects;

impl SideEffects for NoSideEffects {}
