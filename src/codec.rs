//! Binary Snapshot Codec (the "FSDB" format): writes and reads the
//! complete `IndexStore` snapshot to/from a single file.
//!
//! Grounded in the original implementation's `fsearch_database.c`
//! (`db_file_save`/`db_file_load`): magic `"FSDB"`, major/minor version
//! header, prefix-delta name compression, parent back-references, and a
//! trailing sorted-arrays section giving every tracked property's
//! permutation over the folder/file blocks. File locking and mmap'd
//! reads are not in the original (it uses plain `flock`/`fread`) — those
//! use this crate's own `fs2`/`memmap2` dependencies (see DESIGN.md).
//!
//! **Block order.** Entries are written in the primary-NAME container's
//! order (the file's one canonical order, §4.4), exactly as
//! `update_folder_indices`/`db_file_save` do in the original: every
//! folder is renumbered to its position in the NAME-sorted list *before*
//! any bytes are written, and a file's/folder's `parent_idx` is that
//! already-renumbered position — not necessarily an earlier byte offset
//! (an alphabetically-early child can sit under an alphabetically-late
//! parent, so forward parent references are normal, not an error). NAME
//! is therefore the base order the rest of the format is indexed against
//! and is never itself written as a stored permutation; loading resolves
//! parent links in two passes, mirroring the original's pre-sized folder
//! array (`load_folders`/`load_files` index into an array that already has
//! every slot allocated before any parent pointer is followed).

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;

use fs2::FileExt;
use memmap2::Mmap;

use crate::container::EntriesContainer;
use crate::entry::{
    sort_id_of, sort_property_of_id, DbIndex, EntryKind, EntryRef, PropertyFlags, SortProperty,
    ALL_SORT_PROPERTIES,
};
use crate::error::{FsIndexError, Result};
use crate::include::IncludeManager;
use crate::index::{Index, SnapshotFile, SnapshotFolder};
use crate::namepool::NamePool;
use crate::store::IndexStore;

const MAGIC: &[u8; 4] = b"FSDB";
const MAJOR_VERSION: u8 = 1;
const MINOR_VERSION: u8 = 0;

/// Default snapshot file name within the directory an application picks
/// (typically [`default_snapshot_dir`], §6).
pub const SNAPSHOT_FILE_NAME: &str = "fsearch.db";

/// Resolves `<user-data-dir>/fsearch` (§6's default snapshot location),
/// the directory `save`/`load` are pointed at absent an explicit override.
/// `None` if the platform exposes no data directory (e.g. a sandboxed or
/// headless environment with `$HOME` unset).
pub fn default_snapshot_dir() -> Option<std::path::PathBuf> {
    dirs::data_dir().map(|dir| dir.join("fsearch"))
}

fn common_prefix_len(old: &str, new: &str) -> u8 {
    old.bytes()
        .zip(new.bytes())
        .take(255)
        .take_while(|(a, b)| a == b)
        .count() as u8
}

struct NameDelta {
    offset: u8,
    suffix_len: u8,
}

fn name_delta(previous: &str, current: &str) -> NameDelta {
    let offset = common_prefix_len(previous, current);
    let suffix_len = (current.len() - offset as usize) as u8;
    NameDelta { offset, suffix_len }
}

/// Writes the complete snapshot for `store` to `<dir>/fsearch.db`,
/// locking and writing a temp file first and renaming it over the target
/// only once the write succeeds (§4.4 "atomic save").
pub fn save(store: &IndexStore, dir: &Path) -> Result<()> {
    let target = dir.join(SNAPSHOT_FILE_NAME);
    let temp_path = dir.join(format!("{SNAPSHOT_FILE_NAME}.tmp"));

    let file = File::create(&temp_path).map_err(FsIndexError::Io)?;
    file.try_lock_exclusive().map_err(|_| FsIndexError::Busy)?;

    let result = write_snapshot(store).and_then(|bytes| {
        let mut file = &file;
        file.write_all(&bytes).map_err(FsIndexError::Io)
    });
    let _ = FileExt::unlock(&file);
    drop(file);

    match result {
        Ok(()) => std::fs::rename(&temp_path, &target).map_err(FsIndexError::Io),
        Err(error) => {
            let _ = std::fs::remove_file(&temp_path);
            Err(error.into_public())
        }
    }
}

/// Properties that get a stored permutation in the sorted-arrays section.
/// NAME is excluded: it *is* the block order the rest of the format is
/// indexed against, not a permutation over itself (§4.4, and the
/// original's `save_sorted_arrays` loop starting at `id = 1`, skipping
/// `DATABASE_INDEX_PROPERTY_NAME`).
fn tracked_properties(flags: PropertyFlags) -> Vec<SortProperty> {
    ALL_SORT_PROPERTIES
        .into_iter()
        .filter(|&property| property != SortProperty::Name && flags.tracks(property))
        .collect()
}

fn write_snapshot(store: &IndexStore) -> Result<Vec<u8>> {
    store.with_snapshot_data(|indexes, folder_containers, file_containers| {
        let flags = store.flags();

        let folder_name_container = folder_containers
            .get(&SortProperty::Name)
            .expect("NAME folder container always present once the Store is running")
            .read();
        let file_name_container = file_containers
            .get(&SortProperty::Name)
            .expect("NAME file container always present once the Store is running")
            .read();

        let by_db_index = index_lookup(indexes);
        let (folder_block, folder_positions) =
            build_block(&by_db_index, &folder_name_container, EntryKind::Folder, flags, None)?;
        let (file_block, file_positions) =
            build_block(&by_db_index, &file_name_container, EntryKind::File, flags, Some(&folder_positions))?;

        let num_folders = folder_name_container.num_entries() as u32;
        let num_files = file_name_container.num_entries() as u32;

        let mut out = Vec::with_capacity(folder_block.len() + file_block.len() + 256);
        out.extend_from_slice(MAGIC);
        out.push(MAJOR_VERSION);
        out.push(MINOR_VERSION);
        out.extend_from_slice(&(flags.bits() as u64).to_le_bytes());
        out.extend_from_slice(&num_folders.to_le_bytes());
        out.extend_from_slice(&num_files.to_le_bytes());
        out.extend_from_slice(&(folder_block.len() as u64).to_le_bytes());
        out.extend_from_slice(&(file_block.len() as u64).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // NUM_INDEXES, reserved
        out.extend_from_slice(&0u32.to_le_bytes()); // NUM_EXCLUDES, reserved
        out.extend_from_slice(&folder_block);
        out.extend_from_slice(&file_block);

        let properties = tracked_properties(flags);
        out.extend_from_slice(&(properties.len() as u32).to_le_bytes());
        for property in properties {
            out.extend_from_slice(&sort_id_of(property).to_le_bytes());
            write_permutation(&mut out, folder_containers, property, &folder_positions)?;
            write_permutation(&mut out, file_containers, property, &file_positions)?;
        }

        Ok(out)
    })
}

fn index_lookup(indexes: &[Arc<Index>]) -> HashMap<DbIndex, &Arc<Index>> {
    indexes.iter().map(|index| (index.db_index(), index)).collect()
}

fn write_permutation(
    out: &mut Vec<u8>,
    containers: &HashMap<SortProperty, crate::store::SharedContainer>,
    property: SortProperty,
    positions: &HashMap<EntryRef, u32>,
) -> Result<()> {
    let Some(container) = containers.get(&property) else {
        return Ok(());
    };
    let container = container.read();
    for entry_ref in container.joined() {
        let position = positions.get(&entry_ref).copied().unwrap_or(0);
        out.extend_from_slice(&position.to_le_bytes());
    }
    Ok(())
}

/// Builds one block (folders or files) in the given `container`'s order —
/// the primary-NAME container, the file's one canonical order (§4.4).
///
/// Every entry is renumbered to its position in that order (mirroring
/// `update_folder_indices`) *before* any bytes are written: positions for
/// every entry in `container` are assigned in a first pass, so a parent
/// reference resolved in the second (byte-emitting) pass may point either
/// earlier or later in the block — NAME order has no reason to agree with
/// parent-before-child. Files resolve their parent against `folder_positions`
/// (a different, already-complete renumbering); folders resolve against
/// their own in-progress `positions` map, complete before emission starts.
fn build_block(
    by_db_index: &HashMap<DbIndex, &Arc<Index>>,
    container: &EntriesContainer,
    kind: EntryKind,
    flags: PropertyFlags,
    folder_positions: Option<&HashMap<EntryRef, u32>>,
) -> Result<(Vec<u8>, HashMap<EntryRef, u32>)> {
    let ordered: Vec<EntryRef> = container.joined().collect();

    let mut positions: HashMap<EntryRef, u32> = HashMap::with_capacity(ordered.len());
    for (position, &entry_ref) in ordered.iter().enumerate() {
        positions.insert(entry_ref, position as u32);
    }

    let mut buf = Vec::new();
    let mut previous_name = String::new();

    for (position, &entry_ref) in ordered.iter().enumerate() {
        let position = position as u32;
        let index = by_db_index
            .get(&entry_ref.db_index)
            .expect("container entry must belong to an admitted Index");
        let (name, size, mtime, parent) = index
            .raw_fields(entry_ref.idx)
            .expect("container entry must resolve in its owning Index");

        if kind == EntryKind::Folder {
            buf.extend_from_slice(&entry_ref.db_index.to_le_bytes());
        }

        let delta = name_delta(&previous_name, name);
        buf.push(delta.offset);
        buf.push(delta.suffix_len);
        buf.extend_from_slice(&name.as_bytes()[delta.offset as usize..]);
        previous_name = name.to_string();

        if flags.tracks(SortProperty::Size) {
            buf.extend_from_slice(&size.to_le_bytes());
        }
        if flags.tracks(SortProperty::Mtime) {
            buf.extend_from_slice(&mtime.to_le_bytes());
        }

        let parent_position = match kind {
            EntryKind::Folder => match parent {
                Some(parent_idx) => *positions
                    .get(&EntryRef::new(entry_ref.db_index, parent_idx))
                    .expect("a folder's parent must itself be in the folder container"),
                None => position,
            },
            EntryKind::File => {
                let parent_idx = parent.expect("a file always has a parent folder");
                *folder_positions
                    .expect("files resolve their parent against the folder block's positions")
                    .get(&EntryRef::new(entry_ref.db_index, parent_idx))
                    .expect("a file's parent must itself be in the folder container")
            }
        };
        buf.extend_from_slice(&parent_position.to_le_bytes());
    }

    Ok((buf, positions))
}

/// Reads `<dir>/fsearch.db`, rebuilding `store`'s full state from it.
/// `includes` supplies the root path for each decoded `db_index` (the
/// byte format itself carries no root paths, §4.4); a decoded Index whose
/// `db_index` has no matching `Include` is still installed, just without
/// a root, until a caller reassigns one.
pub fn load(dir: &Path, includes: &dyn IncludeManager, store: &IndexStore) -> Result<()> {
    let target = dir.join(SNAPSHOT_FILE_NAME);
    let file = File::open(&target).map_err(FsIndexError::Io)?;
    file.try_lock_exclusive().map_err(|_| FsIndexError::Busy)?;

    // SAFETY: the file is exclusively locked for the duration of the
    // mapping and not concurrently written to by this process.
    let mmap = unsafe { Mmap::map(&file) }.map_err(FsIndexError::Io)?;
    let result = parse_snapshot(&mmap, includes, store);
    let _ = FileExt::unlock(&file);
    result.map_err(FsIndexError::into_public)
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(FsIndexError::Truncated)?;
        let slice = self.bytes.get(self.pos..end).ok_or(FsIndexError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }
}

fn parse_snapshot(bytes: &[u8], includes: &dyn IncludeManager, store: &IndexStore) -> Result<()> {
    let mut cursor = Cursor::new(bytes);

    let magic = cursor.take(4)?;
    if magic != MAGIC {
        return Err(FsIndexError::MagicMismatch);
    }
    let major = cursor.u8()?;
    let minor = cursor.u8()?;
    if major != MAJOR_VERSION {
        return Err(FsIndexError::VersionMismatch {
            file_major: major as u16,
            crate_major: MAJOR_VERSION as u16,
        });
    }
    if minor > MINOR_VERSION {
        return Err(FsIndexError::VersionMismatch {
            file_major: major as u16,
            crate_major: MAJOR_VERSION as u16,
        });
    }

    let flags_bits = cursor.u64()?;
    let flags = PropertyFlags::from_bits_truncate(flags_bits as u32);
    let num_folders = cursor.u32()?;
    let num_files = cursor.u32()?;
    let folder_block_size = cursor.u64()? as usize;
    let file_block_size = cursor.u64()? as usize;
    let _num_indexes = cursor.u32()?;
    let _num_excludes = cursor.u32()?;

    let folder_block = cursor.take(folder_block_size)?;
    let file_block = cursor.take(file_block_size)?;

    let names = NamePool::new();
    let (folders_by_db_index, folder_positions) =
        decode_folder_block(folder_block, num_folders, flags, &names)?;
    let (files_by_db_index, file_positions) =
        decode_file_block(file_block, num_files, flags, &names, &folder_positions)?;

    let mut indexes: Vec<Arc<Index>> = Vec::new();
    let mut db_indices: Vec<DbIndex> = folders_by_db_index.keys().copied().collect();
    db_indices.sort_unstable();
    for db_index in db_indices {
        let folders = folders_by_db_index.get(&db_index).map(Vec::as_slice).unwrap_or(&[]);
        let files = files_by_db_index.get(&db_index).map(Vec::as_slice).unwrap_or(&[]);
        let mut index = Index::from_snapshot(db_index, folders, files);
        if let Some(include) = includes.includes().iter().find(|include| include.id == db_index) {
            index.set_root(include.path.clone());
        }
        indexes.push(Arc::new(index));
    }

    let resolver = crate::store::IndexSetResolver::new(&indexes);

    let folder_position_to_ref = invert_positions(&folder_positions);
    let file_position_to_ref = invert_positions(&file_positions);

    let mut folder_containers = HashMap::new();
    let mut file_containers = HashMap::new();

    // NAME is the block's own order (§4.4) and is never a stored
    // permutation; its containers are built directly from the decode
    // positions rather than read from the sorted-arrays section.
    let mut folder_name_container =
        crate::container::EntriesContainer::new(EntryKind::Folder, SortProperty::Name, SortProperty::None);
    for position in 0..num_folders {
        if let Some(&entry_ref) = folder_position_to_ref.get(&position) {
            force_insert(&mut folder_name_container, &resolver, entry_ref);
        }
    }
    folder_containers.insert(SortProperty::Name, Arc::new(parking_lot::RwLock::new(folder_name_container)));

    let mut file_name_container =
        crate::container::EntriesContainer::new(EntryKind::File, SortProperty::Name, SortProperty::None);
    for position in 0..num_files {
        if let Some(&entry_ref) = file_position_to_ref.get(&position) {
            force_insert(&mut file_name_container, &resolver, entry_ref);
        }
    }
    file_containers.insert(SortProperty::Name, Arc::new(parking_lot::RwLock::new(file_name_container)));

    let num_sorted_arrays = cursor.u32()?;
    for _ in 0..num_sorted_arrays {
        let sort_id = cursor.u32()?;
        let property = sort_property_of_id(sort_id).ok_or(FsIndexError::UnknownSortId(sort_id))?;

        let mut folder_container =
            crate::container::EntriesContainer::new(EntryKind::Folder, property, SortProperty::None);
        let folder_perm = read_permutation(&mut cursor, num_folders)?;
        for position in folder_perm {
            if let Some(&entry_ref) = folder_position_to_ref.get(&position) {
                force_insert(&mut folder_container, &resolver, entry_ref);
            }
        }
        folder_containers.insert(property, Arc::new(parking_lot::RwLock::new(folder_container)));

        let mut file_container =
            crate::container::EntriesContainer::new(EntryKind::File, property, SortProperty::None);
        let file_perm = read_permutation(&mut cursor, num_files)?;
        for position in file_perm {
            if let Some(&entry_ref) = file_position_to_ref.get(&position) {
                force_insert(&mut file_container, &resolver, entry_ref);
            }
        }
        file_containers.insert(property, Arc::new(parking_lot::RwLock::new(file_container)));
    }

    store.restore(indexes, folder_containers, file_containers);
    Ok(())
}

fn read_permutation(cursor: &mut Cursor<'_>, len: u32) -> Result<Vec<u32>> {
    (0..len).map(|_| cursor.u32()).collect()
}

fn invert_positions(positions: &HashMap<EntryRef, u32>) -> HashMap<u32, EntryRef> {
    positions.iter().map(|(&k, &v)| (v, k)).collect()
}

/// Inserts `entry_ref` into a freshly decoded container in the exact
/// order the sorted-arrays section already gives us. Recomputes real
/// sort keys through `resolver` (rather than trusting the file blindly)
/// so the container stays correctly searchable for later `insert`/
/// `steal` calls driven by live monitor events after load.
fn force_insert(
    container: &mut crate::container::EntriesContainer,
    resolver: &dyn crate::container::EntryResolver,
    entry_ref: EntryRef,
) {
    container.insert(resolver, entry_ref);
}

struct FolderRaw {
    db_index: DbIndex,
    name: &'static str,
    size: u64,
    mtime: u64,
    parent_global: u32,
}

/// Decodes the folder block in two passes. NAME order has no reason to
/// agree with parent-before-child (an alphabetically early folder can sit
/// under an alphabetically late one), so a `parent_global` may reference a
/// position later in the block than the child itself. The first pass only
/// assigns every position its final `(db_index, local bucket position)`;
/// the second resolves `local_parent` once that whole table is complete —
/// mirroring the original's pre-sized folder array, where `parent_idx` can
/// be followed regardless of load order because every slot already exists.
fn decode_folder_block(
    block: &[u8],
    num_folders: u32,
    flags: PropertyFlags,
    names: &NamePool,
) -> Result<(HashMap<DbIndex, Vec<SnapshotFolder>>, HashMap<EntryRef, u32>)> {
    let mut previous_name = String::new();
    let mut raw: Vec<FolderRaw> = Vec::with_capacity(num_folders as usize);
    let mut cursor = Cursor::new(block);

    for _ in 0..num_folders {
        let db_index = cursor.u16()?;
        let (name, new_previous) = decode_name(&mut cursor, &previous_name)?;
        previous_name = new_previous;
        let name = names.intern(&name);
        let size = if flags.tracks(SortProperty::Size) { cursor.u64()? } else { 0 };
        let mtime = if flags.tracks(SortProperty::Mtime) { cursor.u64()? } else { 0 };
        let parent_global = cursor.u32()?;
        raw.push(FolderRaw {
            db_index,
            name,
            size,
            mtime,
            parent_global,
        });
    }

    let mut by_db_index: HashMap<DbIndex, Vec<SnapshotFolder>> = HashMap::new();
    let mut local_index_of: HashMap<u32, (DbIndex, u32)> = HashMap::with_capacity(raw.len());
    for (position, entry) in raw.iter().enumerate() {
        let bucket = by_db_index.entry(entry.db_index).or_default();
        let local_position = bucket.len() as u32;
        bucket.push(SnapshotFolder {
            name: entry.name,
            size: entry.size,
            mtime: entry.mtime,
            local_parent: None,
        });
        local_index_of.insert(position as u32, (entry.db_index, local_position));
    }

    let mut global_to_ref: HashMap<EntryRef, u32> = HashMap::with_capacity(raw.len());
    for (position, entry) in raw.iter().enumerate() {
        let position = position as u32;
        let &(db_index, local_position) = local_index_of.get(&position).expect("every position was assigned above");
        let local_parent = if entry.parent_global == position {
            None
        } else {
            local_index_of.get(&entry.parent_global).map(|&(_, local)| local)
        };
        by_db_index.get_mut(&db_index).unwrap()[local_position as usize].local_parent = local_parent;
        global_to_ref.insert(
            EntryRef::new(db_index, crate::slab::SlabIndex::new(local_position as usize)),
            position,
        );
    }

    Ok((by_db_index, global_to_ref))
}

/// Decodes the file block, resolving each file's parent against the
/// already-complete `folder_positions` table (files never appear as a
/// parent, so no forward-reference issue arises here the way it does in
/// [`decode_folder_block`]). Also returns each file's own global NAME
/// position, so the sorted-arrays section's file permutations can be
/// resolved the same way the folder ones are.
fn decode_file_block(
    block: &[u8],
    num_files: u32,
    flags: PropertyFlags,
    names: &NamePool,
    folder_positions: &HashMap<EntryRef, u32>,
) -> Result<(HashMap<DbIndex, Vec<SnapshotFile>>, HashMap<EntryRef, u32>)> {
    // Map global folder position -> (db_index, local folder position),
    // the inverse of what `decode_folder_block` produced.
    let global_to_local: HashMap<u32, (DbIndex, u32)> = folder_positions
        .iter()
        .map(|(entry_ref, &global)| (global, (entry_ref.db_index, entry_ref.idx.get() as u32)))
        .collect();

    let mut previous_name = String::new();
    let mut by_db_index: HashMap<DbIndex, Vec<SnapshotFile>> = HashMap::new();
    let mut file_positions: HashMap<EntryRef, u32> = HashMap::with_capacity(num_files as usize);
    let mut cursor = Cursor::new(block);

    for position in 0..num_files {
        let (name, new_previous) = decode_name(&mut cursor, &previous_name)?;
        previous_name = new_previous;
        let name = names.intern(&name);
        let size = if flags.tracks(SortProperty::Size) { cursor.u64()? } else { 0 };
        let mtime = if flags.tracks(SortProperty::Mtime) { cursor.u64()? } else { 0 };
        let parent_global = cursor.u32()?;

        let Some(&(db_index, local_parent)) = global_to_local.get(&parent_global) else {
            return Err(FsIndexError::Truncated);
        };
        let bucket = by_db_index.entry(db_index).or_default();
        let local_position = bucket.len() as u32;
        bucket.push(SnapshotFile {
            name,
            size,
            mtime,
            local_parent,
        });
        file_positions.insert(
            EntryRef::new(db_index, crate::slab::SlabIndex::new(local_position as usize)),
            position,
        );
    }

    Ok((by_db_index, file_positions))
}

fn decode_name(cursor: &mut Cursor<'_>, previous: &str) -> Result<(String, String)> {
    let offset = cursor.u8()? as usize;
    let suffix_len = cursor.u8()? as usize;
    let suffix = cursor.take(suffix_len)?;
    let suffix = std::str::from_utf8(suffix).map_err(|_| FsIndexError::Truncated)?;

    let mut name = String::with_capacity(offset + suffix_len);
    name.push_str(previous.get(..offset).unwrap_or(previous));
    name.push_str(suffix);
    let new_previous = name.clone();
    Ok((name, new_previous))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::include::{Include, VecExcludeManager, VecIncludeManager};
    use crate::index::DefaultWalker;
    use crate::cancel::CancellationToken;
    use std::fs::{self, File as StdFile};
    use tempfile::TempDir;

    #[test]
    fn common_prefix_len_matches_shared_bytes() {
        assert_eq!(common_prefix_len("hello", "help"), 3);
        assert_eq!(common_prefix_len("", "abc"), 0);
        assert_eq!(common_prefix_len("abc", "abc"), 3);
    }

    #[test]
    fn round_trips_a_scanned_store() {
        let source = TempDir::new().unwrap();
        fs::create_dir(source.path().join("sub")).unwrap();
        StdFile::create(source.path().join("sub/a.txt")).unwrap();
        StdFile::create(source.path().join("b.txt")).unwrap();

        let includes = VecIncludeManager::new(vec![Include::new(source.path(), 7)]);
        let excludes = VecExcludeManager::default();
        let store = IndexStore::new(PropertyFlags::SIZE | PropertyFlags::MTIME);
        assert!(store.start(&includes, &excludes, &DefaultWalker, CancellationToken::noop()));

        let snapshot_dir = TempDir::new().unwrap();
        save(&store, snapshot_dir.path()).expect("save should succeed");

        let restored = IndexStore::new(PropertyFlags::SIZE | PropertyFlags::MTIME);
        load(snapshot_dir.path(), &includes, &restored).expect("load should succeed");

        assert_eq!(restored.num_files(), store.num_files());
        assert_eq!(restored.num_folders(), store.num_folders());
        assert_eq!(
            restored.get_files(SortProperty::Name).unwrap().read().num_entries(),
            store.get_files(SortProperty::Name).unwrap().read().num_entries()
        );
    }

    #[test]
    fn rejects_bad_magic() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(SNAPSHOT_FILE_NAME), b"nope").unwrap();
        let includes = VecIncludeManager::default();
        let store = IndexStore::new(PropertyFlags::empty());
        let result = load(dir.path(), &includes, &store);
        assert!(result.is_err());
    }
}
