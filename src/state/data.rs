/// Shared data structures for the triage engine
///
/// These structs represent the data model that flows between
/// the database layer and the engine/UI layer.

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Opaque, stable identifier of a photo in the catalog.
pub type PhotoId = i64;

/// Classification status of a photo.
///
/// Stored as a lowercase string in the database so the schema
/// stays readable with plain sqlite tooling.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PhotoStatus {
    /// Not yet triaged; part of the "to classify" set.
    #[default]
    Unclassified,
    /// Marked to keep.
    Keep,
    /// Marked for deletion.
    Trash,
    /// Deferred decision.
    Maybe,
}

impl PhotoStatus {
    /// Database representation of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            PhotoStatus::Unclassified => "unclassified",
            PhotoStatus::Keep => "keep",
            PhotoStatus::Trash => "trash",
            PhotoStatus::Maybe => "maybe",
        }
    }

    /// Parse a database value. Unknown values read as `Unclassified`.
    pub fn parse(value: &str) -> Self {
        match value {
            "keep" => PhotoStatus::Keep,
            "trash" => PhotoStatus::Trash,
            "maybe" => PhotoStatus::Maybe,
            _ => PhotoStatus::Unclassified,
        }
    }
}

/// Represents a single photo in the catalog.
///
/// The store owns the authoritative row; the engine only holds
/// read-only copies plus a locally tracked status override.
#[derive(Debug, Clone, PartialEq)]
pub struct Photo {
    /// Unique database ID
    pub id: PhotoId,
    /// Full path to the image file
    pub path: String,
    /// Album (bucket) the photo belongs to
    pub album_id: i64,
    /// Capture timestamp, unix seconds; the sort key
    pub taken_at: i64,
    /// Current classification status as last read from the store
    pub status: PhotoStatus,
}

/// Inclusive date range in unix seconds.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    /// Start of the range (inclusive).
    pub start: i64,
    /// End of the range (inclusive).
    pub end: i64,
}

impl DateRange {
    /// Return a copy with the end bound extended to 23:59:59 of its day.
    ///
    /// Filters picked from a calendar UI carry a midnight end timestamp;
    /// without widening they would exclude the whole final day.
    pub fn widened_to_end_of_day(&self) -> DateRange {
        let end = match Utc.timestamp_opt(self.end, 0).single() {
            Some(dt) => {
                let eod = dt
                    .date_naive()
                    .and_hms_opt(23, 59, 59)
                    .expect("23:59:59 is a valid time");
                Utc.from_utc_datetime(&eod).timestamp()
            }
            None => self.end,
        };
        DateRange {
            start: self.start,
            end,
        }
    }

    /// Whether `timestamp` falls inside the range.
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}

/// How the triage session orders its photos.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Oldest first.
    DateAscending,
    /// Newest first. The store's native order.
    DateDescending,
    /// Deterministic shuffle; a fixed seed reproduces the same ordering
    /// across independently built sessions.
    Random {
        /// Shuffle key.
        seed: u64,
    },
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder::DateDescending
    }
}

/// Per-status classification counts for the current session only.
///
/// Reset whenever the session is rebuilt; distinct from the lifetime
/// achievement counters kept by an external collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCounters {
    /// Photos kept this session.
    pub keep: u64,
    /// Photos trashed this session.
    pub trash: u64,
    /// Photos deferred this session.
    pub maybe: u64,
}

impl SessionCounters {
    /// Increment the counter for `status`. `Unclassified` is a no-op.
    pub fn record(&mut self, status: PhotoStatus) {
        match status {
            PhotoStatus::Keep => self.keep += 1,
            PhotoStatus::Trash => self.trash += 1,
            PhotoStatus::Maybe => self.maybe += 1,
            PhotoStatus::Unclassified => {}
        }
    }

    /// Decrement the counter for `status`, flooring at zero.
    pub fn unrecord(&mut self, status: PhotoStatus) {
        match status {
            PhotoStatus::Keep => self.keep = self.keep.saturating_sub(1),
            PhotoStatus::Trash => self.trash = self.trash.saturating_sub(1),
            PhotoStatus::Maybe => self.maybe = self.maybe.saturating_sub(1),
            PhotoStatus::Unclassified => {}
        }
    }

    /// Total photos classified this session.
    pub fn classified_total(&self) -> u64 {
        self.keep + self.trash + self.maybe
    }
}

/// One reversible classification action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoEntry {
    /// The photo that was classified.
    pub id: PhotoId,
    /// Status before the action.
    pub previous: PhotoStatus,
    /// Status the action applied.
    pub status: PhotoStatus,
    /// When the action happened, unix seconds.
    pub at: i64,
}
