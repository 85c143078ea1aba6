//! Entry records and the identity/sort-property types that index them.
//!
//! An `Entry` is a file or folder inside exactly one `Index`. It never
//! moves between Indices, and its `idx` (its `SlabIndex` in the owning
//! Index's pool) is stable only until the next rebuild of that Index.

use bitflags::bitflags;
use thin_vec::ThinVec;

use crate::slab::SlabIndex;

/// The owning Index's process-wide identifier.
pub type DbIndex = u16;

/// A back-reference to a Folder entry within the same Index.
pub type ParentRef = Option<SlabIndex>;

/// A tagged filesystem record: either a file or a folder.
///
/// Folders additionally carry the list of their direct children (scan
/// order) and are otherwise identical in shape to files.
#[derive(Debug, Clone)]
pub enum Entry {
    File(EntryData),
    Folder(EntryData, ThinVec<SlabIndex>),
}

/// Fields shared by both File and Folder entries.
#[derive(Debug, Clone)]
pub struct EntryData {
    /// Position within the owning Index's slab. Not stable across rebuilds.
    pub idx: SlabIndex,
    /// Leaf basename, interned in the global `NamePool`.
    pub name: &'static str,
    /// File size, or folders' aggregate size of contained entries.
    pub size: u64,
    /// Modification timestamp (Unix seconds).
    pub mtime: u64,
    /// Identifier of the owning Index root.
    pub db_index: DbIndex,
    /// Back-reference to the parent Folder. `None` only for a scan root.
    pub parent: ParentRef,
}

impl Entry {
    pub fn data(&self) -> &EntryData {
        match self {
            Entry::File(data) => data,
            Entry::Folder(data, _) => data,
        }
    }

    pub fn data_mut(&mut self) -> &mut EntryData {
        match self {
            Entry::File(data) => data,
            Entry::Folder(data, _) => data,
        }
    }

    pub fn idx(&self) -> SlabIndex {
        self.data().idx
    }

    pub fn name(&self) -> &'static str {
        self.data().name
    }

    pub fn size(&self) -> u64 {
        self.data().size
    }

    pub fn mtime(&self) -> u64 {
        self.data().mtime
    }

    pub fn db_index(&self) -> DbIndex {
        self.data().db_index
    }

    pub fn parent(&self) -> ParentRef {
        self.data().parent
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, Entry::Folder(..))
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Entry::File(..))
    }

    pub fn kind(&self) -> EntryKind {
        if self.is_folder() {
            EntryKind::Folder
        } else {
            EntryKind::File
        }
    }

    /// Direct children at scan time; empty for files.
    pub fn children(&self) -> &[SlabIndex] {
        match self {
            Entry::Folder(_, children) => children.as_slice(),
            Entry::File(_) => &[],
        }
    }

    pub fn add_child(&mut self, child: SlabIndex) {
        if let Entry::Folder(_, children) = self {
            children.push(child);
        }
    }

    /// Extension is the substring of `name` after the last `.`, or empty.
    ///
    /// Since `name` is interned in the `NamePool` (`'static`), the
    /// extension slice is itself `'static` and needs no allocation.
    pub fn extension(&self) -> &'static str {
        let name = self.name();
        match name.rfind('.') {
            Some(pos) if pos + 1 < name.len() => &name[pos + 1..],
            _ => "",
        }
    }
}

/// Which "kind" bucket an entry belongs to — files and folders are always
/// tracked in separate containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Folder,
}

/// An entry's process-wide identity: used for `steal`, selections, and the
/// shared-vs-private container identity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryRef {
    pub db_index: DbIndex,
    pub idx: SlabIndex,
}

impl EntryRef {
    pub fn new(db_index: DbIndex, idx: SlabIndex) -> Self {
        Self { db_index, idx }
    }
}

/// The properties a container (or a view) can be sorted by.
///
/// `NONE` is the sentinel used for "no secondary sort property".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortProperty {
    Name,
    Path,
    Size,
    Mtime,
    Extension,
    None,
}

/// Ascending or descending view-visible order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortType {
    Ascending,
    Descending,
}

bitflags! {
    /// Which per-entry properties the Store actually tracks.
    ///
    /// `NAME` has no bit: it is always tracked. Setting a bit here means
    /// the Store will build (and keep live) a fast-sort container pair
    /// for that property.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PropertyFlags: u32 {
        const SIZE      = 0b0001;
        const MTIME      = 0b0010;
        const EXTENSION = 0b0100;
        const PATH      = 0b1000;
    }
}

impl PropertyFlags {
    /// Returns whether `property` is tracked by this flag set. `NAME` is
    /// unconditionally tracked; `NONE` is never a tracked property.
    pub fn tracks(&self, property: SortProperty) -> bool {
        match property {
            SortProperty::Name => true,
            SortProperty::Size => self.contains(PropertyFlags::SIZE),
            SortProperty::Mtime => self.contains(PropertyFlags::MTIME),
            SortProperty::Extension => self.contains(PropertyFlags::EXTENSION),
            SortProperty::Path => self.contains(PropertyFlags::PATH),
            SortProperty::None => false,
        }
    }
}

/// All sort properties the Store might build containers for, in a fixed
/// enumeration order used by start-up and the codec's sorted-arrays
/// section.
pub const ALL_SORT_PROPERTIES: [SortProperty; 5] = [
    SortProperty::Name,
    SortProperty::Path,
    SortProperty::Size,
    SortProperty::Mtime,
    SortProperty::Extension,
];

/// Maps a sort property to its 1-based codec `sort_id` (0 is reserved/
/// unused so a 0 in a corrupt file is unambiguously invalid).
pub fn sort_id_of(property: SortProperty) -> u32 {
    match property {
        SortProperty::Name => 1,
        SortProperty::Path => 2,
        SortProperty::Size => 3,
        SortProperty::Mtime => 4,
        SortProperty::Extension => 5,
        SortProperty::None => 0,
    }
}

pub fn sort_property_of_id(id: u32) -> Option<SortProperty> {
    match id {
        1 => Some(SortProperty::Name),
        2 => Some(SortProperty::Path),
        3 => Some(SortProperty::Size),
        4 => Some(SortProperty::Mtime),
        5 => Some(SortProperty::Extension),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_extraction() {
        assert_eq!(
            Entry::File(EntryData {
                idx: SlabIndex::new(0),
                name: "archive.tar.gz",
                size: 0,
                mtime: 0,
                db_index: 0,
                parent: None,
            })
            .extension(),
            "gz"
        );
        // The spec defines extension as the literal suffix after the last
        // '.', with no special-casing for dotfiles.
        assert_eq!(
            Entry::File(EntryData {
                idx: SlabIndex::new(0),
                name: ".gitignore",
                size: 0,
                mtime: 0,
                db_index: 0,
                parent: None,
            })
            .extension(),
            "gitignore"
        );
        assert_eq!(
            Entry::File(EntryData {
                idx: SlabIndex::new(0),
                name: "trailing.",
                size: 0,
                mtime: 0,
                db_index: 0,
                parent: None,
            })
            .extension(),
            ""
        );
        assert_eq!(
            Entry::File(EntryData {
                idx: SlabIndex::new(0),
                name: "README",
                size: 0,
                mtime: 0,
                db_index: 0,
                parent: None,
            })
            .extension(),
            ""
        );
    }

    #[test]
    fn property_flags_name_always_tracked() {
        let flags = PropertyFlags::empty();
        assert!(flags.tracks(SortProperty::Name));
        assert!(!flags.tracks(SortProperty::Size));
        assert!(!flags.tracks(SortProperty::None));
    }

    #[test]
    fn sort_id_roundtrip() {
        for property in ALL_SORT_PROPERTIES {
            let id = sort_id_of(property);
            assert_eq!(sort_property_of_id(id), Some(property));
        }
    }
}
