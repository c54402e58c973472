//! The triage engine.
//!
//! A single tokio task owns every piece of mutable session state and
//! drains a command channel, so no two classifications can interleave
//! their in-memory updates. Store reads and writes run on blocking
//! tasks and report back through the same channel, tagged with the
//! session generation; results from a superseded session are discarded.
//!
//! The UI observes the engine through a `watch` channel of immutable
//! [`EngineSnapshot`] values: the projected visible list, the stable
//! total, per-status counters, combo state and error/loading flags.

pub mod combo;
pub mod criteria;
pub mod removal;
pub mod session;
pub mod stabilizer;
pub mod undo;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{StoreError, TriageError};
use crate::state::data::{
    Photo, PhotoId, PhotoStatus, SessionCounters, SortOrder, UndoEntry,
};
use crate::store::{PhotoStore, SettingsStore, SideEffects};

use combo::{ComboSnapshot, ComboTracker};
use criteria::{resolve, FilterMode, PageFilter, SessionFilter};
use removal::RemovalTracker;
use session::{build_session, PageRequest, Session};
use stabilizer::CountStabilizer;
use undo::UndoStack;

/// Tunables for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Records fetched per page.
    pub page_size: usize,
    /// Above this matching-record count a session goes windowed.
    pub windowed_threshold: u64,
    /// Auto-fetch the next page when the visible list drops below this.
    pub low_water_mark: usize,
    /// Debounce for "load more" triggers, coalescing rapid bursts into
    /// one fetch.
    pub load_more_debounce: Duration,
    /// Max gap between actions of one combo burst.
    pub combo_window: Duration,
    /// Extra delay after a burst ends before the combo count resets.
    pub combo_cooldown: Duration,
    /// Album id of the camera roll, for the camera filter modes.
    pub camera_album: Option<i64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            page_size: 60,
            windowed_threshold: 5000,
            low_water_mark: 20,
            load_more_debounce: Duration::from_millis(50),
            combo_window: Duration::from_millis(1500),
            combo_cooldown: Duration::from_millis(300),
            camera_album: None,
        }
    }
}

/// Immutable view of the engine published to the UI layer.
#[derive(Debug, Clone, Default)]
pub struct EngineSnapshot {
    /// Loaded records minus everything in the removal tracker, in
    /// session order.
    pub visible: Vec<Photo>,
    /// Latched session total; does not flicker while writes are in flight.
    pub stable_total: u64,
    /// Per-status counts for this session.
    pub counters: SessionCounters,
    /// Classifications applied this session, bumped before the store
    /// confirms. Purely for display latency hiding.
    pub immediate_classified: u64,
    /// Current combo state.
    pub combo: ComboSnapshot,
    /// Whether an undoable action exists.
    pub can_undo: bool,
    /// A page fetch is in flight.
    pub loading: bool,
    /// A session rebuild is in flight.
    pub reloading: bool,
    /// Last transient error, until cleared.
    pub last_error: Option<String>,
}

/// One optimistic effect in flight, used to target rollbacks.
struct WriteAction {
    id: PhotoId,
    seq: u64,
    previous: PhotoStatus,
}

enum Command {
    Classify {
        id: PhotoId,
        status: PhotoStatus,
        reply: oneshot::Sender<u32>,
    },
    ClassifyBatch {
        ids: Vec<PhotoId>,
        status: PhotoStatus,
        reply: oneshot::Sender<usize>,
    },
    Undo {
        reply: oneshot::Sender<Option<PhotoId>>,
    },
    LoadMore,
    Reload,
    SetFilterMode(FilterMode),
    SetPageFilter(Option<PageFilter>),
    SetSessionFilter(Option<SessionFilter>),
    SetSortOrder(SortOrder),
    ClearError,
    // completions from background tasks
    WriteDone {
        actions: Vec<WriteAction>,
        status: PhotoStatus,
        undo: bool,
        result: Result<(), String>,
    },
    PageLoaded {
        generation: u64,
        result: Result<Vec<Photo>, String>,
    },
    SessionBuilt {
        generation: u64,
        result: Result<(Session, u64), String>,
    },
}

/// Handle to a running engine. Cheap to clone; all clones talk to the
/// same engine task.
#[derive(Clone)]
pub struct TriageEngine {
    tx: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<EngineSnapshot>,
}

impl TriageEngine {
    /// Spawn the engine task and start building the initial session from
    /// the persisted settings. Must be called inside a tokio runtime.
    pub fn new<S, T, E>(
        store: Arc<S>,
        settings: Arc<T>,
        effects: Arc<E>,
        config: EngineConfig,
    ) -> Self
    where
        S: PhotoStore,
        T: SettingsStore,
        E: SideEffects,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(EngineSnapshot::default());
        let actor = Actor {
            store,
            settings,
            effects,
            combo: ComboTracker::new(config.combo_window, config.combo_cooldown),
            config,
            tx: tx.downgrade(),
            snapshot_tx,
            filter_mode: FilterMode::default(),
            page_filter: None,
            session_filter: None,
            order: SortOrder::default(),
            generation: 0,
            session: None,
            removal: RemovalTracker::default(),
            counters: SessionCounters::default(),
            immediate_classified: 0,
            undo_stack: UndoStack::default(),
            stabilizer: CountStabilizer::default(),
            statuses: HashMap::new(),
            next_seq: 0,
            loading: false,
            reloading: false,
            last_error: None,
            load_deadline: None,
        };
        tokio::spawn(actor.run(rx));
        TriageEngine {
            tx,
            snapshot: snapshot_rx,
        }
    }

    /// Subscribe to engine snapshots.
    pub fn subscribe(&self) -> watch::Receiver<EngineSnapshot> {
        self.snapshot.clone()
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> EngineSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Classify one photo. Returns the combo count as soon as the
    /// optimistic update is applied, before the durable write completes.
    pub async fn classify(&self, id: PhotoId, status: PhotoStatus) -> Result<u32, TriageError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Classify { id, status, reply })
            .map_err(|_| TriageError::EngineClosed)?;
        rx.await.map_err(|_| TriageError::EngineClosed)
    }

    /// Classify many photos in one atomic in-memory update and one
    /// batched store write. Returns how many were applied. Not undoable.
    pub async fn classify_batch(
        &self,
        ids: Vec<PhotoId>,
        status: PhotoStatus,
    ) -> Result<usize, TriageError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::ClassifyBatch { ids, status, reply })
            .map_err(|_| TriageError::EngineClosed)?;
        rx.await.map_err(|_| TriageError::EngineClosed)
    }

    /// Reverse the most recent classification. Returns the id that became
    /// visible again, or `None` if there was nothing to undo.
    pub async fn undo(&self) -> Result<Option<PhotoId>, TriageError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Undo { reply })
            .map_err(|_| TriageError::EngineClosed)?;
        rx.await.map_err(|_| TriageError::EngineClosed)
    }

    /// Request the next page. Debounced with automatic low-water triggers.
    pub fn load_more(&self) {
        let _ = self.tx.send(Command::LoadMore);
    }

    /// Force a full session rebuild.
    pub fn reload(&self) {
        let _ = self.tx.send(Command::Reload);
    }

    /// Change the global filter mode and rebuild.
    pub fn set_filter_mode(&self, mode: FilterMode) {
        let _ = self.tx.send(Command::SetFilterMode(mode));
    }

    /// Set or clear the in-page ad-hoc filter and rebuild.
    pub fn set_page_filter(&self, filter: Option<PageFilter>) {
        let _ = self.tx.send(Command::SetPageFilter(filter));
    }

    /// Set or clear the persisted session filter and rebuild.
    pub fn set_session_filter(&self, filter: Option<SessionFilter>) {
        let _ = self.tx.send(Command::SetSessionFilter(filter));
    }

    /// Change the sort order, persist the preference and rebuild.
    pub fn set_sort_order(&self, order: SortOrder) {
        let _ = self.tx.send(Command::SetSortOrder(order));
    }

    /// Dismiss the last transient error.
    pub fn clear_error(&self) {
        let _ = self.tx.send(Command::ClearError);
    }
}

struct Actor<S, T, E> {
    store: Arc<S>,
    settings: Arc<T>,
    effects: Arc<E>,
    config: EngineConfig,
    /// Weak so the channel closes (and the task exits) once every handle
    /// is gone; background tasks upgrade it to post their completions.
    tx: mpsc::WeakUnboundedSender<Command>,
    snapshot_tx: watch::Sender<EngineSnapshot>,

    // criteria sources
    filter_mode: FilterMode,
    page_filter: Option<PageFilter>,
    session_filter: Option<SessionFilter>,
    order: SortOrder,

    // session state, owned exclusively by this task
    generation: u64,
    session: Option<Session>,
    removal: RemovalTracker,
    counters: SessionCounters,
    immediate_classified: u64,
    combo: ComboTracker,
    undo_stack: UndoStack,
    stabilizer: CountStabilizer,
    /// Last known status per photo touched this session.
    statuses: HashMap<PhotoId, PhotoStatus>,
    next_seq: u64,

    loading: bool,
    reloading: bool,
    last_error: Option<String>,
    load_deadline: Option<Instant>,
}

async fn sleep_until_or_pending(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

impl<S, T, E> Actor<S, T, E>
where
    S: PhotoStore,
    T: SettingsStore,
    E: SideEffects,
{
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        self.load_settings().await;
        self.start_rebuild();
        self.publish();

        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                command = rx.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                _ = sleep_until_or_pending(deadline) => self.on_deadline(),
            }
        }
        debug!("triage engine stopped");
    }

    async fn load_settings(&mut self) {
        let settings = Arc::clone(&self.settings);
        let loaded = tokio::task::spawn_blocking(move || {
            let mode = settings.filter_mode()?;
            let order = settings.sort_order()?;
            let filter = settings.session_filter()?;
            Ok::<_, StoreError>((mode, order, filter))
        })
        .await;

        match loaded {
            Ok(Ok((mode, order, filter))) => {
                self.filter_mode = mode;
                if let Some(order) = order {
                    self.order = order;
                }
                self.session_filter = filter;
            }
            Ok(Err(error)) => warn!(%error, "failed to load settings; using defaults"),
            Err(error) => warn!(%error, "settings load task failed"),
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Classify { id, status, reply } => {
                let count = self.apply_classify(id, status);
                let _ = reply.send(count);
                self.publish();
            }
            Command::ClassifyBatch { ids, status, reply } => {
                let applied = self.apply_batch(ids, status);
                let _ = reply.send(applied);
                self.publish();
            }
            Command::Undo { reply } => {
                let undone = self.apply_undo();
                let _ = reply.send(undone);
                self.publish();
            }
            Command::LoadMore => self.schedule_load(),
            Command::Reload => {
                self.start_rebuild();
                self.publish();
            }
            Command::SetFilterMode(mode) => {
                self.filter_mode = mode;
                self.start_rebuild();
                self.publish();
            }
            Command::SetPageFilter(filter) => {
                self.page_filter = filter;
                self.start_rebuild();
                self.publish();
            }
            Command::SetSessionFilter(filter) => {
                self.session_filter = filter.clone();
                self.persist_session_filter(filter);
                self.start_rebuild();
                self.publish();
            }
            Command::SetSortOrder(order) => {
                self.order = order;
                self.persist_sort_order(order);
                self.start_rebuild();
                self.publish();
            }
            Command::ClearError => {
                self.last_error = None;
                self.publish();
            }
            Command::WriteDone {
                actions,
                status,
                undo,
                result,
            } => self.on_write_done(actions, status, undo, result),
            Command::PageLoaded { generation, result } => self.on_page_loaded(generation, result),
            Command::SessionBuilt { generation, result } => {
                self.on_session_built(generation, result)
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        match (self.combo.next_deadline(), self.load_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn on_deadline(&mut self) {
        let now = Instant::now();
        if self.combo.tick(now) {
            self.publish();
        }
        if self.load_deadline.is_some_and(|deadline| deadline <= now) {
            self.load_deadline = None;
            self.start_page_fetch();
        }
    }

    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn known_status(&self, id: PhotoId) -> PhotoStatus {
        self.statuses.get(&id).copied().unwrap_or_default()
    }

    // ---- classification ----

    fn apply_classify(&mut self, id: PhotoId, status: PhotoStatus) -> u32 {
        let previous = self.known_status(id);
        let seq = self.next_seq();

        self.removal.insert(id, seq);
        if previous == PhotoStatus::Unclassified {
            self.immediate_classified += 1;
        } else {
            // re-classification: move the count between buckets
            self.counters.unrecord(previous);
        }
        self.counters.record(status);
        let combo_count = self.combo.register(Instant::now());
        self.undo_stack.push(UndoEntry {
            id,
            previous,
            status,
            at: Utc::now().timestamp(),
        });
        self.statuses.insert(id, status);

        self.dispatch_write(vec![WriteAction { id, seq, previous }], status, false);
        self.schedule_load_if_low();
        combo_count
    }

    fn apply_batch(&mut self, ids: Vec<PhotoId>, status: PhotoStatus) -> usize {
        let mut actions = Vec::with_capacity(ids.len());
        let mut seen = std::collections::HashSet::new();
        for id in ids {
            if !seen.insert(id) {
                continue;
            }
            let previous = self.known_status(id);
            let seq = self.next_seq();
            self.removal.insert(id, seq);
            if previous == PhotoStatus::Unclassified {
                self.immediate_classified += 1;
            } else {
                self.counters.unrecord(previous);
            }
            self.counters.record(status);
            self.statuses.insert(id, status);
            actions.push(WriteAction { id, seq, previous });
        }
        if actions.is_empty() {
            return 0;
        }
        self.combo.register(Instant::now());
        let applied = actions.len();
        self.dispatch_write(actions, status, false);
        self.schedule_load_if_low();
        applied
    }

    fn apply_undo(&mut self) -> Option<PhotoId> {
        let entry = self.undo_stack.pop()?;
        self.counters.unrecord(entry.status);
        if entry.previous == PhotoStatus::Unclassified {
            // reappears in the projection at its original sort position
            self.removal.remove(entry.id);
            self.immediate_classified = self.immediate_classified.saturating_sub(1);
            self.statuses.remove(&entry.id);
        } else {
            self.counters.record(entry.previous);
            self.statuses.insert(entry.id, entry.previous);
        }

        // Restore the old status in the store. No undo entry is pushed for
        // the reversal and the side-effect collaborators are not notified:
        // lifetime counters are never decremented.
        let seq = self.next_seq();
        self.dispatch_write(
            vec![WriteAction {
                id: entry.id,
                seq,
                previous: entry.status,
            }],
            entry.previous,
            true,
        );
        Some(entry.id)
    }

    fn dispatch_write(&mut self, actions: Vec<WriteAction>, status: PhotoStatus, undo: bool) {
        let Some(tx) = self.tx.upgrade() else {
            return;
        };
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
            let result = if actions.len() == 1 {
                store.set_status(actions[0].id, status)
            } else {
                let ids: Vec<PhotoId> = actions.iter().map(|a| a.id).collect();
                store.set_status_batch(&ids, status)
            };
            let result = result.map_err(|e| e.to_string());
            let _ = tx.send(Command::WriteDone {
                actions,
                status,
                undo,
                result,
            });
        });
    }

    fn on_write_done(
        &mut self,
        actions: Vec<WriteAction>,
        status: PhotoStatus,
        undo: bool,
        result: Result<(), String>,
    ) {
        match result {
            Ok(()) => {
                if !undo {
                    self.effects.lifetime_classified(actions.len(), status);
                    self.effects.record_action(status);
                    self.effects.refresh_widget();
                }
                debug!(count = actions.len(), status = status.as_str(), "write confirmed");
            }
            Err(message) if undo => {
                warn!(%message, "undo write failed");
                self.last_error = Some(format!("Failed to restore photo: {message}"));
                self.publish();
            }
            Err(message) => {
                warn!(%message, count = actions.len(), "write failed; rolling back");
                for action in &actions {
                    self.rollback_action(action, status);
                }
                self.last_error = Some(format!("Failed to save classification: {message}"));
                self.publish();
            }
        }
    }

    /// Reverse one optimistic effect, but only if it still owns the
    /// removal-tracker entry. A newer action on the same photo (or an
    /// undo) supersedes it, and a stale completion must not clobber that.
    fn rollback_action(&mut self, action: &WriteAction, status: PhotoStatus) {
        if !self.removal.owned_by(action.id, action.seq) {
            debug!(id = action.id, "skipping rollback of superseded action");
            return;
        }
        self.counters.unrecord(status);
        if action.previous == PhotoStatus::Unclassified {
            self.removal.remove(action.id);
            self.immediate_classified = self.immediate_classified.saturating_sub(1);
            self.statuses.remove(&action.id);
        } else {
            self.counters.record(action.previous);
            self.statuses.insert(action.id, action.previous);
        }
        self.undo_stack.remove_latest_for(action.id);
    }

    // ---- paging ----

    fn visible_len(&self) -> usize {
        match &self.session {
            Some(session) => session
                .loaded
                .iter()
                .filter(|p| !self.removal.contains(p.id))
                .count(),
            None => 0,
        }
    }

    fn schedule_load_if_low(&mut self) {
        if self.visible_len() < self.config.low_water_mark {
            self.schedule_load();
        }
    }

    fn schedule_load(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        if session.is_exhausted() || self.loading || self.reloading {
            return;
        }
        if self.load_deadline.is_none() {
            self.load_deadline = Some(Instant::now() + self.config.load_more_debounce);
        }
    }

    fn start_page_fetch(&mut self) {
        if self.loading || self.reloading {
            return;
        }
        let Some(session) = &self.session else {
            return;
        };
        let Some(request) = session.next_page_request(self.removal.len()) else {
            return;
        };
        let Some(tx) = self.tx.upgrade() else {
            return;
        };

        self.loading = true;
        let generation = self.generation;
        let criteria = session.criteria.clone();
        let order = session.order;
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
            let result = match request {
                PageRequest::ByIds(ids) => store.by_ids(&ids),
                PageRequest::Query { limit, offset } => {
                    store.page(&criteria, &order, limit, offset)
                }
            };
            let result = result.map_err(|e| e.to_string());
            let _ = tx.send(Command::PageLoaded { generation, result });
        });
        self.publish();
    }

    fn on_page_loaded(&mut self, generation: u64, result: Result<Vec<Photo>, String>) {
        if generation != self.generation {
            debug!("discarding page fetch for a superseded session");
            return;
        }
        self.loading = false;
        match result {
            Ok(photos) => {
                let fetched = photos.len();
                let added = match &mut self.session {
                    Some(session) => session.absorb_page(photos),
                    None => 0,
                };
                if fetched > 0 && added == 0 {
                    // every row was already loaded: offset drift has outrun
                    // the compensation, start the session over
                    warn!("page fetch returned only duplicates; rebuilding session");
                    self.start_rebuild();
                } else {
                    // keep prefetching if a classification burst drained the window
                    self.schedule_load_if_low();
                }
            }
            Err(message) => {
                // background prefetch: stay silent, the page index was not
                // advanced and the next trigger retries
                warn!(%message, "page fetch failed");
            }
        }
        self.publish();
    }

    // ---- session lifecycle ----

    fn start_rebuild(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        self.reloading = true;
        self.loading = false;
        self.load_deadline = None;

        let Some(tx) = self.tx.upgrade() else {
            return;
        };
        let criteria = resolve(
            &self.filter_mode,
            self.page_filter.as_ref(),
            self.session_filter.as_ref(),
            self.config.camera_album,
        );
        let order = self.order;
        let page_size = self.config.page_size;
        let threshold = self.config.windowed_threshold;
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
            let result = build_session(&*store, criteria, order, page_size, threshold)
                .map(|built| (built.session, built.total_unclassified))
                .map_err(|e| e.to_string());
            let _ = tx.send(Command::SessionBuilt { generation, result });
        });
    }

    fn on_session_built(&mut self, generation: u64, result: Result<(Session, u64), String>) {
        if generation != self.generation {
            debug!("discarding superseded session build");
            return;
        }
        self.reloading = false;
        match result {
            Ok((session, total)) => {
                info!(
                    total,
                    strategy = ?session.strategy(),
                    "triage session rebuilt"
                );
                // wholesale replacement: observers see either the old
                // session or the new one, never a half-updated mix
                self.session = Some(session);
                self.removal.clear();
                self.counters = SessionCounters::default();
                self.immediate_classified = 0;
                self.undo_stack.clear();
                self.statuses.clear();
                self.stabilizer.reset();
                self.stabilizer.observe(total, 0);
                self.last_error = None;
            }
            Err(message) => {
                warn!(%message, "session build failed");
                self.session = None;
                self.last_error = Some(format!("Failed to load photos: {message}"));
            }
        }
        self.publish();
    }

    fn persist_sort_order(&self, order: SortOrder) {
        let settings = Arc::clone(&self.settings);
        tokio::task::spawn_blocking(move || {
            if let Err(error) = settings.set_sort_order(order) {
                warn!(%error, "failed to persist sort order");
            }
        });
    }

    fn persist_session_filter(&self, filter: Option<SessionFilter>) {
        let settings = Arc::clone(&self.settings);
        tokio::task::spawn_blocking(move || {
            let result = match &filter {
                Some(filter) => settings.set_session_filter(filter),
                None => settings.clear_session_filter(),
            };
            if let Err(error) = result {
                warn!(%error, "failed to persist session filter");
            }
        });
    }

    fn publish(&mut self) {
        let visible: Vec<Photo> = match &self.session {
            Some(session) => session
                .loaded
                .iter()
                .filter(|p| !self.removal.contains(p.id))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        let snapshot = EngineSnapshot {
            visible,
            stable_total: self.stabilizer.current(),
            counters: self.counters,
            immediate_classified: self.immediate_classified,
            combo: self.combo.snapshot(),
            can_undo: !self.undo_stack.is_empty(),
            loading: self.loading,
            reloading: self.reloading,
            last_error: self.last_error.clone(),
        };
        let _ = self.snapshot_tx.send(snapshot);
    }
}
