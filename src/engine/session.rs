//! Pagination sessions over the triage set.
//!
//! A session is built once per (criteria, sort order) pair and replaced
//! wholesale when either changes. Small collections use a snapshot of the
//! full id list; very large ones page directly against the store with
//! limit/offset, compensating the offset for photos classified since the
//! session started.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::engine::criteria::Criteria;
use crate::error::StoreError;
use crate::state::data::{Photo, PhotoId, SortOrder};
use crate::store::PhotoStore;

/// Which pagination strategy a session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Materialized id list, paged by slicing in memory.
    Snapshot,
    /// Direct limit/offset queries against the store.
    Windowed,
}

/// Pick a strategy from the matching-record count.
///
/// Snapshot gives perfectly stable random ordering and trivial paging math
/// at the cost of holding every id in memory; windowed bounds memory for
/// huge libraries at the cost of offset-drift bookkeeping. Decided once
/// per session, never revisited mid-session.
pub fn select_strategy(count: u64, windowed_threshold: u64) -> Strategy {
    if count > windowed_threshold {
        Strategy::Windowed
    } else {
        Strategy::Snapshot
    }
}

/// Deterministic Fisher-Yates shuffle keyed by an xorshift64 generator.
///
/// The same seed always produces the same permutation, so a random-order
/// session survives a crash or reload with its sequence intact.
pub fn shuffle_deterministic(values: &mut [PhotoId], seed: u64) {
    let mut state = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
    for i in (1..values.len()).rev() {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let j = (state % (i as u64 + 1)) as usize;
        values.swap(i, j);
    }
}

/// What the next page fetch should execute against the store.
#[derive(Debug, Clone, PartialEq)]
pub enum PageRequest {
    /// Hydrate these ids (snapshot strategy).
    ByIds(Vec<PhotoId>),
    /// Run a limit/offset query (windowed strategy).
    Query {
        /// Rows to fetch.
        limit: usize,
        /// Drift-compensated offset.
        offset: usize,
    },
}

enum PageSource {
    /// Fixed-length ordered id list; classification never removes ids from
    /// it, only from the visible projection, so indexes stay stable.
    Snapshot { ids: Vec<PhotoId> },
    Windowed,
}

/// One pagination session: strategy, cursor and loaded records.
pub struct Session {
    /// The resolved predicate this session was built from.
    pub criteria: Criteria,
    /// The sort order this session was built from.
    pub order: SortOrder,
    source: PageSource,
    page_size: usize,
    /// Index of the next page to fetch; advanced only on successful loads.
    next_page: usize,
    /// Records loaded so far, in session order.
    pub loaded: Vec<Photo>,
    loaded_ids: HashSet<PhotoId>,
    exhausted: bool,
}

impl Session {
    fn new(criteria: Criteria, order: SortOrder, source: PageSource, page_size: usize) -> Self {
        Session {
            criteria,
            order,
            source,
            page_size,
            next_page: 0,
            loaded: Vec::new(),
            loaded_ids: HashSet::new(),
            exhausted: false,
        }
    }

    /// The strategy this session runs under.
    pub fn strategy(&self) -> Strategy {
        match self.source {
            PageSource::Snapshot { .. } => Strategy::Snapshot,
            PageSource::Windowed => Strategy::Windowed,
        }
    }

    /// Whether every page has been fetched.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Drift-compensated offset for windowed page `page`.
    ///
    /// `removed_locally` is the number of photos classified since the
    /// session started; the store no longer returns them, so a naive
    /// offset would skip unseen photos.
    fn effective_offset(&self, page: usize, removed_locally: usize) -> usize {
        let naive = page * self.page_size;
        if removed_locally > naive {
            // Data-quality signal, not a user-facing error.
            warn!(
                page,
                removed_locally, "effective offset would be negative; clamping to 0"
            );
            return 0;
        }
        naive - removed_locally
    }

    /// Build the fetch request for the next page, or `None` if exhausted.
    pub fn next_page_request(&self, removed_locally: usize) -> Option<PageRequest> {
        if self.exhausted {
            return None;
        }
        match &self.source {
            PageSource::Snapshot { ids } => {
                let start = self.next_page * self.page_size;
                if start >= ids.len() {
                    return None;
                }
                let end = usize::min(start + self.page_size, ids.len());
                Some(PageRequest::ByIds(ids[start..end].to_vec()))
            }
            PageSource::Windowed => Some(PageRequest::Query {
                limit: self.page_size,
                offset: self.effective_offset(self.next_page, removed_locally),
            }),
        }
    }

    /// Fold a successfully fetched page into the session and return how
    /// many records were actually new.
    ///
    /// De-duplicates against already-loaded ids first: windowed offset
    /// drift can reintroduce an id that was already seen. A non-empty
    /// page that adds nothing means the drift compensation has fallen
    /// behind; the caller should rebuild.
    pub fn absorb_page(&mut self, photos: Vec<Photo>) -> usize {
        let fetched = photos.len();
        let mut added = 0;
        for photo in photos {
            if self.loaded_ids.insert(photo.id) {
                self.loaded.push(photo);
                added += 1;
            } else {
                debug!(id = photo.id, "dropping duplicate from drifted page");
            }
        }
        self.next_page += 1;
        match &self.source {
            PageSource::Snapshot { ids } => {
                if self.next_page * self.page_size >= ids.len() {
                    self.exhausted = true;
                }
            }
            PageSource::Windowed => {
                if fetched < self.page_size {
                    self.exhausted = true;
                }
            }
        }
        added
    }
}

/// A freshly built session plus the total it was built over.
pub struct BuiltSession {
    /// The session, with its first page already loaded.
    pub session: Session,
    /// Unclassified count at build time; latched into the stable total.
    pub total_unclassified: u64,
}

/// Run `request` against the store.
pub fn fetch_page<S: PhotoStore + ?Sized>(
    store: &S,
    session: &Session,
    request: PageRequest,
) -> Result<Vec<Photo>, StoreError> {
    match request {
        PageRequest::ByIds(ids) => store.by_ids(&ids),
        PageRequest::Query { limit, offset } => {
            store.page(&session.criteria, &session.order, limit, offset)
        }
    }
}

/// Build a session for `(criteria, order)`: count, pick a strategy,
/// materialize ids if snapshot, and load the first page.
///
/// A count failure here is fatal to session start and surfaces as a
/// reload error.
pub fn build_session<S: PhotoStore + ?Sized>(
    store: &S,
    criteria: Criteria,
    order: SortOrder,
    page_size: usize,
    windowed_threshold: u64,
) -> Result<BuiltSession, StoreError> {
    let total_unclassified = store.count(&criteria)?;
    let strategy = select_strategy(total_unclassified, windowed_threshold);
    debug!(total_unclassified, ?strategy, "building triage session");

    let source = match strategy {
        Strategy::Windowed => PageSource::Windowed,
        Strategy::Snapshot => {
            // Fetch in store-native order; a random order is produced by a
            // seeded shuffle so the sequence is reproducible.
            let mut ids = match order {
                SortOrder::Random { .. } => store.ids(&criteria, &SortOrder::DateDescending)?,
                other => store.ids(&criteria, &other)?,
            };
            if let SortOrder::Random { seed } = order {
                shuffle_deterministic(&mut ids, seed);
            }
            PageSource::Snapshot { ids }
        }
    };

    let mut session = Session::new(criteria, order, source, page_size);
    if let Some(request) = session.next_page_request(0) {
        let photos = fetch_page(store, &session, request)?;
        session.absorb_page(photos);
    } else {
        session.exhausted = true;
    }

    Ok(BuiltSession {
        session,
        total_unclassified,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_session(ids: Vec<PhotoId>, page_size: usize) -> Session {
        Session::new(
            Criteria::default(),
            SortOrder::DateDescending,
            PageSource::Snapshot { ids },
            page_size,
        )
    }

    fn windowed_session(page_size: usize) -> Session {
        Session::new(
            Criteria::default(),
            SortOrder::DateDescending,
            PageSource::Windowed,
            page_size,
        )
    }

    fn photo(id: PhotoId) -> Photo {
        Photo {
            id,
            path: format!("/photos/{id}.jpg"),
            album_id: 0,
            taken_at: 1_000_000 - id,
            status: crate::state::data::PhotoStatus::Unclassified,
        }
    }

    #[test]
    fn test_strategy_threshold() {
        assert_eq!(select_strategy(5000, 5000), Strategy::Snapshot);
        assert_eq!(select_strategy(5001, 5000), Strategy::Windowed);
        assert_eq!(select_strategy(0, 5000), Strategy::Snapshot);
    }

    #[test]
    fn test_shuffle_is_deterministic() {
        let mut a: Vec<PhotoId> = (0..200).collect();
        let mut b: Vec<PhotoId> = (0..200).collect();
        shuffle_deterministic(&mut a, 42);
        shuffle_deterministic(&mut b, 42);
        assert_eq!(a, b);

        let mut c: Vec<PhotoId> = (0..200).collect();
        shuffle_deterministic(&mut c, 43);
        assert_ne!(a, c);
        // still a permutation
        let mut sorted = c.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..200).collect::<Vec<_>>());
    }

    #[test]
    fn test_snapshot_page_slicing() {
        let session = snapshot_session((0..45).collect(), 20);
        match session.next_page_request(0) {
            Some(PageRequest::ByIds(ids)) => assert_eq!(ids, (0..20).collect::<Vec<_>>()),
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn test_snapshot_last_page_is_short_then_exhausted() {
        let mut session = snapshot_session((0..45).collect(), 20);
        for _ in 0..2 {
            let req = session.next_page_request(0).unwrap();
            match req {
                PageRequest::ByIds(ids) => {
                    session.absorb_page(ids.into_iter().map(photo).collect());
                }
                other => panic!("unexpected request: {other:?}"),
            }
        }
        let req = session.next_page_request(0).unwrap();
        match req {
            PageRequest::ByIds(ids) => {
                assert_eq!(ids, (40..45).collect::<Vec<_>>());
                session.absorb_page(ids.into_iter().map(photo).collect());
            }
            other => panic!("unexpected request: {other:?}"),
        }
        assert!(session.is_exhausted());
        assert_eq!(session.next_page_request(0), None);
        assert_eq!(session.loaded.len(), 45);
    }

    #[test]
    fn test_windowed_offset_compensates_for_removals() {
        let mut session = windowed_session(20);
        session.absorb_page((0..20).map(photo).collect());
        // 5 photos classified since the session started
        match session.next_page_request(5) {
            Some(PageRequest::Query { limit, offset }) => {
                assert_eq!(limit, 20);
                assert_eq!(offset, 15);
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn test_windowed_negative_offset_clamps_to_zero() {
        let session = windowed_session(20);
        // more local removals than the naive offset covers
        match session.next_page_request(7) {
            Some(PageRequest::Query { offset, .. }) => assert_eq!(offset, 0),
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn test_windowed_deduplicates_drifted_rows() {
        let mut session = windowed_session(20);
        assert_eq!(session.absorb_page((0..20).map(photo).collect()), 20);
        // offset drift re-serves ids 15..20 alongside the next rows
        assert_eq!(session.absorb_page((15..35).map(photo).collect()), 15);
        let ids: Vec<PhotoId> = session.loaded.iter().map(|p| p.id).collect();
        assert_eq!(ids, (0..35).collect::<Vec<_>>());

        // a page of nothing but duplicates signals runaway drift
        assert_eq!(session.absorb_page((0..20).map(photo).collect()), 0);
    }

    #[test]
    fn test_windowed_short_page_exhausts() {
        let mut session = windowed_session(20);
        session.absorb_page((0..12).map(photo).collect());
        assert!(session.is_exhausted());
        assert_eq!(session.next_page_request(0), None);
    }
}
