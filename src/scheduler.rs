//! Work Scheduler: one worker thread serving a single work queue, plus a
//! debounced background save triggered by live index churn (§4.6).
//!
//! Grounded in the teacher's `watcher::events` channel-to-worker pattern
//! (generalised from filesystem events to arbitrary `Work` items) and in
//! `indexer::build::FlushSignal`'s `Mutex<FlushState> + Condvar` debounce,
//! replicated here in shape (1200 ms debounce / 20 s max delay) rather
//! than reused verbatim since that module itself didn't survive the
//! transform (see DESIGN.md).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};

use crate::cancel::CancellationToken;
use crate::entry::{PropertyFlags, SortProperty, SortType};
use crate::error::{FsIndexError, Result};
use crate::events::{Event, EventContext};
use crate::include::{Exclude, Include, VecExcludeManager, VecIncludeManager};
use crate::index::{DefaultWalker, ExternalWalker};
use crate::query::QueryMatcher;
use crate::search::{EntryInfo, EntryInfoFlags, SearchInfo, SearchViewRegistry, SelectionOp, ViewId};
use crate::codec;
use crate::store::IndexStore;

const FLUSH_DEBOUNCE: Duration = Duration::from_millis(1200);
const FLUSH_MAX_DELAY: Duration = Duration::from_secs(20);

/// The Store's coarse lifecycle, surfaced to observers as
/// `DatabaseInfo.state` (§4.6, mirroring the teacher's `indexer::build`
/// `Idle | Building | Ready | Error` states).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseState {
    Idle,
    Building,
    Ready,
    Error,
}

/// Snapshot counters reported alongside `*_FINISHED`/`DATABASE_CHANGED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseInfo {
    pub state: DatabaseState,
    pub num_files: usize,
    pub num_folders: usize,
    pub num_fast_sort_properties: usize,
}

impl DatabaseInfo {
    fn of(store: &IndexStore, state: DatabaseState) -> Self {
        Self {
            state,
            num_files: store.num_files(),
            num_folders: store.num_folders(),
            num_fast_sort_properties: store.num_fast_sort_properties(),
        }
    }
}

/// One queued command (§4.6). `Quit` drains the worker thread.
pub enum Work {
    Quit,
    LoadFromFile,
    SaveToFile,
    Scan {
        includes: Vec<Include>,
        excludes: Vec<Exclude>,
        flags: PropertyFlags,
        cancel: CancellationToken,
    },
    Rescan {
        cancel: CancellationToken,
    },
    Search {
        view_id: ViewId,
        sort_order: SortProperty,
        secondary_sort_order: SortProperty,
        sort_type: SortType,
        query: Arc<dyn QueryMatcher>,
    },
    Sort {
        view_id: ViewId,
        sort_order: SortProperty,
        secondary_sort_order: SortProperty,
        sort_type: SortType,
    },
    ModifySelection {
        view_id: ViewId,
        op: SelectionOp,
    },
    GetItemInfo {
        view_id: ViewId,
        idx: usize,
        flags: EntryInfoFlags,
    },
}

struct FlushState {
    dirty: bool,
    first_dirty_at: Option<Instant>,
    quit: bool,
}

/// Debounces repeated `mark_dirty` calls (one per applied index event)
/// into a single background save: waits for `FLUSH_DEBOUNCE` of quiet, or
/// `FLUSH_MAX_DELAY` since the first pending change, whichever comes
/// first.
struct FlushSignal {
    state: Mutex<FlushState>,
    condvar: Condvar,
}

impl FlushSignal {
    fn new() -> Self {
        Self {
            state: Mutex::new(FlushState {
                dirty: false,
                first_dirty_at: None,
                quit: false,
            }),
            condvar: Condvar::new(),
        }
    }

    fn mark_dirty(&self) {
        let mut state = self.state.lock();
        if !state.dirty {
            state.dirty = true;
            state.first_dirty_at = Some(Instant::now());
        }
        self.condvar.notify_all();
    }

    fn shutdown(&self) {
        let mut state = self.state.lock();
        state.quit = true;
        self.condvar.notify_all();
    }

    /// Blocks until a save should run, or returns `None` on shutdown.
    /// Waits out `FLUSH_DEBOUNCE` of quiescence after the last
    /// `mark_dirty`, capped at `FLUSH_MAX_DELAY` from the first one in
    /// the current burst.
    fn wait_for_flush(&self) -> bool {
        let mut state = self.state.lock();
        loop {
            if state.quit {
                return false;
            }
            if !state.dirty {
                self.condvar.wait(&mut state);
                continue;
            }

            let elapsed_since_first = state.first_dirty_at.map(Instant::elapsed).unwrap_or_default();
            if elapsed_since_first >= FLUSH_MAX_DELAY {
                state.dirty = false;
                state.first_dirty_at = None;
                return true;
            }

            let wait_budget = FLUSH_DEBOUNCE.min(FLUSH_MAX_DELAY - elapsed_since_first);
            let result = self.condvar.wait_for(&mut state, wait_budget);
            if result.timed_out() && state.dirty {
                // No further `mark_dirty` arrived during the debounce
                // window: the burst has settled, flush now.
                state.dirty = false;
                state.first_dirty_at = None;
                return true;
            }
            // Spurious wake or a fresh `mark_dirty` extended the window;
            // loop and re-evaluate.
        }
    }
}

struct Managers {
    includes: Vec<Include>,
    excludes: Vec<Exclude>,
    flags: PropertyFlags,
}

impl Managers {
    fn matches(&self, includes: &[Include], excludes: &[Exclude], flags: PropertyFlags) -> bool {
        self.includes == includes && self.excludes == excludes && self.flags == flags
    }
}

struct SchedulerState {
    store: Arc<IndexStore>,
    registry: Arc<SearchViewRegistry>,
    managers: Managers,
    lifecycle: DatabaseState,
}

/// One scheduler instance: a single work queue and a dedicated worker
/// thread (§4.6, §5). Callers interact through `submit`/`try_get_*`; the
/// `Arc<SchedulerHandle>` returned by `new` can be cloned freely.
pub struct WorkScheduler {
    sender: Sender<Work>,
    state: Arc<Mutex<SchedulerState>>,
    flush: Arc<FlushSignal>,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
    flush_handle: Mutex<Option<JoinHandle<()>>>,
    shutting_down: AtomicBool,
}

impl WorkScheduler {
    /// Boots an empty, not-yet-scanned Store and starts the worker and
    /// background-save threads. `snapshot_dir` is where `SaveToFile`/
    /// `LoadFromFile` look for `fsearch.db` (§6).
    /// As [`WorkScheduler::new`], but resolves `snapshot_dir` to the
    /// platform default (`<user-data-dir>/fsearch`, §6) rather than taking
    /// one explicitly. Returns `None` if the platform exposes no data
    /// directory.
    pub fn with_default_snapshot_dir(
        event_context: Arc<dyn EventContext>,
        event_sink: Arc<dyn Fn(Event) + Send + Sync>,
    ) -> Option<Arc<Self>> {
        let dir = crate::codec::default_snapshot_dir()?;
        Some(Self::new(dir, event_context, event_sink))
    }

    pub fn new(snapshot_dir: PathBuf, event_context: Arc<dyn EventContext>, event_sink: Arc<dyn Fn(Event) + Send + Sync>) -> Arc<Self> {
        let store = Arc::new(IndexStore::new(PropertyFlags::empty()));
        let registry = Arc::new(SearchViewRegistry::new(store.clone()));
        store.set_event_sink(registry.clone());

        let state = Arc::new(Mutex::new(SchedulerState {
            store,
            registry,
            managers: Managers {
                includes: Vec::new(),
                excludes: Vec::new(),
                flags: PropertyFlags::empty(),
            },
            lifecycle: DatabaseState::Idle,
        }));

        let (sender, receiver) = unbounded::<Work>();
        let flush = Arc::new(FlushSignal::new());

        let worker_state = state.clone();
        let worker_flush = flush.clone();
        let worker_dir = snapshot_dir.clone();
        let worker_context = event_context.clone();
        let worker_sink = event_sink.clone();
        let worker_handle = std::thread::spawn(move || {
            run_worker(receiver, worker_state, worker_flush, worker_dir, worker_context, worker_sink);
        });

        let flush_state = state.clone();
        let flush_signal = flush.clone();
        let flush_dir = snapshot_dir;
        let flush_handle = std::thread::spawn(move || {
            run_flush_loop(flush_state, flush_signal, flush_dir);
        });

        Arc::new(Self {
            sender,
            state,
            flush,
            worker_handle: Mutex::new(Some(worker_handle)),
            flush_handle: Mutex::new(Some(flush_handle)),
            shutting_down: AtomicBool::new(false),
        })
    }

    /// Enqueues `work`. The worker thread dequeues and dispatches it in
    /// order (§4.6's "single-consumer command pipeline").
    pub fn submit(&self, work: Work) {
        let _ = self.sender.send(work);
    }

    /// Signals shutdown: enqueues `Quit` and stops the debounced-save
    /// thread, joining both. Idempotent.
    pub fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.sender.send(Work::Quit);
        self.flush.shutdown();
        if let Some(handle) = self.worker_handle.lock().take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.flush_handle.lock().take() {
            let _ = handle.join();
        }
    }

    /// Non-blocking database info inquiry (§4.6 "try-get paths"): returns
    /// `Busy` rather than waiting if the Store mutex is currently held by
    /// the worker thread.
    pub fn try_get_database_info(&self) -> Result<DatabaseInfo> {
        let state = self.state.try_lock().ok_or(FsIndexError::Busy)?;
        Ok(DatabaseInfo::of(&state.store, state.lifecycle))
    }

    pub fn try_get_search_info(&self, view_id: ViewId) -> Result<SearchInfo> {
        let state = self.state.try_lock().ok_or(FsIndexError::Busy)?;
        state.registry.lookup(view_id).ok_or(FsIndexError::UnknownSearchView(view_id))
    }

    pub fn try_get_item_info(&self, view_id: ViewId, idx: usize, flags: EntryInfoFlags) -> Result<EntryInfo> {
        let state = self.state.try_lock().ok_or(FsIndexError::Busy)?;
        state
            .registry
            .item_info(view_id, idx, flags)
            .ok_or(FsIndexError::EntryNotFound)
    }
}

impl Drop for WorkScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    receiver: Receiver<Work>,
    state: Arc<Mutex<SchedulerState>>,
    flush: Arc<FlushSignal>,
    snapshot_dir: PathBuf,
    context: Arc<dyn EventContext>,
    sink: Arc<dyn Fn(Event) + Send + Sync>,
) {
    // `Receiver::recv()` blocks — the literal "blocking dequeue" (§4.6).
    for work in receiver.iter() {
        match work {
            Work::Quit => break,
            Work::LoadFromFile => dispatch_load(&state, &snapshot_dir, &context, &sink),
            Work::SaveToFile => dispatch_save(&state, &snapshot_dir, &context, &sink),
            Work::Scan { includes, excludes, flags, cancel } => {
                dispatch_scan(&state, &flush, includes, excludes, flags, cancel, &context, &sink)
            }
            Work::Rescan { cancel } => {
                let (includes, excludes, flags) = {
                    let state = state.lock();
                    (
                        state.managers.includes.clone(),
                        state.managers.excludes.clone(),
                        state.managers.flags,
                    )
                };
                dispatch_scan(&state, &flush, includes, excludes, flags, cancel, &context, &sink)
            }
            Work::Search { view_id, sort_order, secondary_sort_order, sort_type, query } => {
                context.post(Box::new({
                    let sink = sink.clone();
                    move || sink(Event::SearchStarted(view_id))
                }));
                let info = {
                    let state = state.lock();
                    state.registry.search(view_id, sort_order, secondary_sort_order, sort_type, query)
                };
                context.post(Box::new({
                    let sink = sink.clone();
                    move || sink(Event::SearchFinished(view_id, info))
                }));
            }
            Work::Sort { view_id, sort_order, secondary_sort_order, sort_type } => {
                context.post(Box::new({
                    let sink = sink.clone();
                    move || sink(Event::SortStarted(view_id))
                }));
                let info = {
                    let state = state.lock();
                    state.registry.sort(view_id, sort_order, secondary_sort_order, sort_type)
                };
                if let Some(info) = info {
                    context.post(Box::new(move || sink(Event::SortFinished(view_id, info))));
                }
            }
            Work::ModifySelection { view_id, op } => {
                let info = {
                    let state = state.lock();
                    state.registry.modify_selection(view_id, op)
                };
                if let Some(info) = info {
                    context.post(Box::new(move || sink(Event::SelectionChanged(view_id, info))));
                }
            }
            Work::GetItemInfo { view_id, idx, flags } => {
                let info = {
                    let state = state.lock();
                    state.registry.item_info(view_id, idx, flags)
                };
                if let Some(info) = info {
                    context.post(Box::new(move || sink(Event::ItemInfoReady(view_id, info))));
                }
            }
        }
    }
}

fn dispatch_scan(
    state: &Arc<Mutex<SchedulerState>>,
    flush: &Arc<FlushSignal>,
    includes: Vec<Include>,
    excludes: Vec<Exclude>,
    flags: PropertyFlags,
    cancel: CancellationToken,
    context: &Arc<dyn EventContext>,
    sink: &Arc<dyn Fn(Event) + Send + Sync>,
) {
    {
        let current = state.lock();
        if current.managers.matches(&includes, &excludes, flags) {
            return;
        }
    }

    context.post(Box::new({
        let sink = sink.clone();
        move || sink(Event::ScanStarted)
    }));

    // Built outside the scheduler's own lock (§4.6: "build a new Store
    // outside the lock, swap it in under the lock") so in-flight readers
    // of the old Store are never blocked on a fresh scan.
    let include_manager = VecIncludeManager::new(includes.clone());
    let exclude_manager = VecExcludeManager::new(excludes.clone());
    let new_store = Arc::new(IndexStore::new(flags));
    let ok = new_store.start(&include_manager, &exclude_manager, &DefaultWalker, cancel);

    let info = {
        let mut current = state.lock();
        if ok {
            let new_registry = Arc::new(SearchViewRegistry::new(new_store.clone()));
            new_store.set_event_sink(new_registry.clone());
            current.store = new_store;
            current.registry = new_registry;
            current.managers = Managers { includes, excludes, flags };
            current.lifecycle = DatabaseState::Ready;
        } else {
            current.lifecycle = DatabaseState::Error;
        }
        DatabaseInfo::of(&current.store, current.lifecycle)
    };

    // Memory trimming after a scan (§4.6: "request a malloc_trim-
    // equivalent... if available") has no portable stable-Rust
    // equivalent without an allocator-specific dependency this crate
    // doesn't carry, so this is intentionally a no-op hook.
    release_memory_if_available();

    flush.mark_dirty();
    context.post(Box::new({
        let sink = sink.clone();
        move || sink(Event::ScanFinished(info))
    }));
}

fn dispatch_load(
    state: &Arc<Mutex<SchedulerState>>,
    snapshot_dir: &std::path::Path,
    context: &Arc<dyn EventContext>,
    sink: &Arc<dyn Fn(Event) + Send + Sync>,
) {
    context.post(Box::new({
        let sink = sink.clone();
        move || sink(Event::LoadStarted)
    }));

    let includes = {
        let current = state.lock();
        current.managers.includes.clone()
    };
    let include_manager = VecIncludeManager::new(includes);

    let info = {
        let mut current = state.lock();
        let loaded_store = Arc::new(IndexStore::new(current.managers.flags));
        match codec::load(snapshot_dir, &include_manager, &loaded_store) {
            Ok(()) => {
                let new_registry = Arc::new(SearchViewRegistry::new(loaded_store.clone()));
                loaded_store.set_event_sink(new_registry.clone());
                current.store = loaded_store;
                current.registry = new_registry;
                current.lifecycle = DatabaseState::Ready;
            }
            Err(_) => {
                // On failure, install default-configured managers (§4.6)
                // rather than leaving the previous (possibly stale) Store.
                current.managers = Managers {
                    includes: Vec::new(),
                    excludes: Vec::new(),
                    flags: PropertyFlags::empty(),
                };
                current.lifecycle = DatabaseState::Error;
            }
        }
        DatabaseInfo::of(&current.store, current.lifecycle)
    };

    context.post(Box::new({
        let sink = sink.clone();
        move || sink(Event::LoadFinished(info))
    }));
}

fn dispatch_save(
    state: &Arc<Mutex<SchedulerState>>,
    snapshot_dir: &std::path::Path,
    context: &Arc<dyn EventContext>,
    sink: &Arc<dyn Fn(Event) + Send + Sync>,
) {
    context.post(Box::new({
        let sink = sink.clone();
        move || sink(Event::SaveStarted)
    }));

    let store = state.lock().store.clone();
    let _ = codec::save(&store, snapshot_dir);

    context.post(Box::new({
        let sink = sink.clone();
        move || sink(Event::SaveFinished)
    }));
}

fn run_flush_loop(state: Arc<Mutex<SchedulerState>>, flush: Arc<FlushSignal>, snapshot_dir: PathBuf) {
    while flush.wait_for_flush() {
        let store = state.lock().store.clone();
        let _ = codec::save(&store, &snapshot_dir);
    }
}

fn release_memory_if_available() {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::EverythingMatcher;
    use std::fs::{self, File};
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use tempfile::TempDir;

    fn context_and_collector() -> (Arc<dyn EventContext>, mpsc::Receiver<Event>, Arc<dyn Fn(Event) + Send + Sync>) {
        let context: Arc<dyn EventContext> = Arc::new(crate::events::ChannelEventContext::new());
        let (tx, rx) = mpsc::channel();
        let sink: Arc<dyn Fn(Event) + Send + Sync> = Arc::new(move |event| {
            let _ = tx.send(event);
        });
        (context, rx, sink)
    }

    fn recv_matching(rx: &mpsc::Receiver<Event>, mut pred: impl FnMut(&Event) -> bool) -> Event {
        loop {
            let event = rx.recv_timeout(Duration::from_secs(5)).expect("expected event");
            if pred(&event) {
                return event;
            }
        }
    }

    #[test]
    fn scan_then_search_reports_populated_info() {
        let temp = TempDir::new().unwrap();
        File::create(temp.path().join("a.txt")).unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();

        let snapshot_dir = TempDir::new().unwrap();
        let (context, rx, sink) = context_and_collector();
        let scheduler = WorkScheduler::new(snapshot_dir.path().to_path_buf(), context, sink);

        scheduler.submit(Work::Scan {
            includes: vec![Include::new(temp.path(), 0)],
            excludes: Vec::new(),
            flags: PropertyFlags::empty(),
            cancel: CancellationToken::noop(),
        });
        let scan_finished = recv_matching(&rx, |e| matches!(e, Event::ScanFinished(_)));
        let Event::ScanFinished(info) = scan_finished else { unreachable!() };
        assert_eq!(info.num_files, 1);
        assert_eq!(info.num_folders, 2);
        assert_eq!(info.state, DatabaseState::Ready);

        scheduler.submit(Work::Search {
            view_id: 1,
            sort_order: SortProperty::Name,
            secondary_sort_order: SortProperty::None,
            sort_type: SortType::Ascending,
            query: Arc::new(EverythingMatcher),
        });
        let search_finished = recv_matching(&rx, |e| matches!(e, Event::SearchFinished(1, _)));
        let Event::SearchFinished(_, search_info) = search_finished else { unreachable!() };
        assert_eq!(search_info.num_files, 1);

        let info = scheduler.try_get_database_info().unwrap();
        assert_eq!(info.num_files, 1);
        scheduler.shutdown();
    }

    #[test]
    fn rescan_with_unchanged_managers_is_a_noop() {
        let temp = TempDir::new().unwrap();
        File::create(temp.path().join("a.txt")).unwrap();

        let snapshot_dir = TempDir::new().unwrap();
        let (context, rx, sink) = context_and_collector();
        let scheduler = WorkScheduler::new(snapshot_dir.path().to_path_buf(), context, sink);

        scheduler.submit(Work::Scan {
            includes: vec![Include::new(temp.path(), 0)],
            excludes: Vec::new(),
            flags: PropertyFlags::empty(),
            cancel: CancellationToken::noop(),
        });
        recv_matching(&rx, |e| matches!(e, Event::ScanFinished(_)));

        scheduler.submit(Work::Rescan { cancel: CancellationToken::noop() });
        // A drained `Quit` only proves ordering once every prior item has
        // already been dispatched; since `Rescan` with identical managers
        // never posts another `ScanFinished`, observing none arrive before
        // shutdown confirms the no-op.
        scheduler.submit(Work::GetItemInfo {
            view_id: 999,
            idx: 0,
            flags: EntryInfoFlags::NAME,
        });
        // No view 999 exists, so no `ItemInfoReady` is posted either;
        // draining the queue to this point is enough to know no second
        // `ScanStarted` slipped in ahead of it.
        std::thread::sleep(Duration::from_millis(50));
        assert!(rx.try_recv().is_err());
        scheduler.shutdown();
    }

    #[test]
    fn try_get_item_info_reports_unknown_view() {
        let snapshot_dir = TempDir::new().unwrap();
        let (context, _rx, sink) = context_and_collector();
        let scheduler = WorkScheduler::new(snapshot_dir.path().to_path_buf(), context, sink);

        let result = scheduler.try_get_search_info(42);
        assert!(matches!(result, Err(FsIndexError::UnknownSearchView(42))));
        scheduler.shutdown();
    }

    #[test]
    fn flush_signal_wakes_once_after_debounce() {
        let flush = Arc::new(FlushSignal::new());
        let woken = Arc::new(AtomicUsize::new(0));
        let waiter_flush = flush.clone();
        let waiter_woken = woken.clone();
        let handle = std::thread::spawn(move || {
            if waiter_flush.wait_for_flush() {
                waiter_woken.fetch_add(1, Ordering::SeqCst);
            }
        });

        std::thread::sleep(Duration::from_millis(20));
        flush.mark_dirty();
        handle.join().unwrap();
        assert_eq!(woken.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let snapshot_dir = TempDir::new().unwrap();
        let (context, _rx, sink) = context_and_collector();
        let scheduler = WorkScheduler::new(snapshot_dir.path().to_path_buf(), context, sink);
        scheduler.shutdown();
        scheduler.shutdown();
    }
}
