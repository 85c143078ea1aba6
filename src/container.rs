//! Entries Container: an ordered sequence of entries of one kind, sorted
//! under a fixed `(primary, secondary)` sort-property schema.
//!
//! The container stores a flat sorted `Vec` of `(EntryRef, cached sort
//! keys)` — the teacher's `SortedSlabIndices` binary-search-insert idiom
//! (`storage::index_types`), generalised from a name-index bucket to a
//! container keyed by any property pair, with ties broken by entry
//! identity so the order is always total.

use std::cmp::Ordering;

use unicase::UniCase;

use crate::entry::{EntryKind, EntryRef, SortProperty};

/// A single property's sort key, cached in the container at insert time
/// so later comparisons never need to re-walk a parent chain or touch
/// the owning Index.
///
/// `Name` wraps its text in `UniCase` so ordering is a Unicode-aware,
/// case-folded collation (§4.1 "Name comparisons are locale-aware Unicode
/// collation") rather than a raw byte-wise `str` compare.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortKey {
    Name(UniCase<&'static str>),
    Path(String),
    Size(u64),
    Mtime(u64),
    Extension(&'static str),
    None,
}

/// Resolves an entry's kind and per-property sort key.
///
/// Implemented by `Index` (for a single root) and `IndexStore` (across
/// all roots), so a container never needs to know where its entries
/// actually live.
pub trait EntryResolver {
    fn entry_kind(&self, entry_ref: EntryRef) -> Option<EntryKind>;
    fn sort_key(&self, entry_ref: EntryRef, property: SortProperty) -> Option<SortKey>;
}

#[derive(Debug, Clone)]
struct ContainerItem {
    entry_ref: EntryRef,
    primary_key: SortKey,
    secondary_key: SortKey,
}

fn cmp_item_key(a: (&SortKey, &SortKey, &EntryRef), b: (&SortKey, &SortKey, &EntryRef)) -> Ordering {
    a.0.cmp(b.0).then_with(|| a.1.cmp(b.1)).then_with(|| a.2.cmp(b.2))
}

/// An ordered sequence of entries of one kind, under a fixed sort schema.
///
/// Schema (`kind`, `primary`, `secondary`) is immutable after construction;
/// re-sorting a view rebuilds a new container rather than mutating this
/// one's schema in place.
#[derive(Debug, Clone)]
pub struct EntriesContainer {
    kind: EntryKind,
    primary: SortProperty,
    secondary: SortProperty,
    items: Vec<ContainerItem>,
}

impl EntriesContainer {
    pub fn new(kind: EntryKind, primary: SortProperty, secondary: SortProperty) -> Self {
        Self {
            kind,
            primary,
            secondary,
            items: Vec::new(),
        }
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn primary(&self) -> SortProperty {
        self.primary
    }

    pub fn secondary(&self) -> SortProperty {
        self.secondary
    }

    fn secondary_key_for(
        &self,
        resolver: &dyn EntryResolver,
        entry_ref: EntryRef,
    ) -> SortKey {
        if self.secondary == SortProperty::None {
            SortKey::None
        } else {
            resolver
                .sort_key(entry_ref, self.secondary)
                .unwrap_or(SortKey::None)
        }
    }

    /// Inserts `entry_ref`, re-establishing sorted order. `entry_ref` must
    /// resolve to an entry of this container's `kind`. Returns `false`
    /// (no-op) if the entry is already present by identity.
    pub fn insert(&mut self, resolver: &dyn EntryResolver, entry_ref: EntryRef) -> bool {
        debug_assert_eq!(
            resolver.entry_kind(entry_ref),
            Some(self.kind),
            "inserted entry kind must match container kind"
        );
        let primary_key = resolver
            .sort_key(entry_ref, self.primary)
            .unwrap_or(SortKey::None);
        let secondary_key = self.secondary_key_for(resolver, entry_ref);

        let target = (&primary_key, &secondary_key, &entry_ref);
        match self.items.binary_search_by(|item| {
            cmp_item_key(
                (&item.primary_key, &item.secondary_key, &item.entry_ref),
                target,
            )
        }) {
            Ok(_) => false,
            Err(pos) => {
                self.items.insert(
                    pos,
                    ContainerItem {
                        entry_ref,
                        primary_key,
                        secondary_key,
                    },
                );
                true
            }
        }
    }

    /// Removes `entry_ref` by identity, returning `true` if it was
    /// present. The entry's memory is not freed — ownership stays with
    /// the Index's pool.
    pub fn steal(&mut self, resolver: &dyn EntryResolver, entry_ref: EntryRef) -> bool {
        if let Some(primary_key) = resolver.sort_key(entry_ref, self.primary) {
            let secondary_key = self.secondary_key_for(resolver, entry_ref);
            let target = (&primary_key, &secondary_key, &entry_ref);
            if let Ok(pos) = self.items.binary_search_by(|item| {
                cmp_item_key(
                    (&item.primary_key, &item.secondary_key, &item.entry_ref),
                    target,
                )
            }) {
                self.items.remove(pos);
                return true;
            }
        }
        // The resolver may no longer see the entry (e.g. it was already
        // removed from the owning Index's pool) — fall back to a linear
        // scan by identity so steal remains correct even then.
        if let Some(pos) = self.items.iter().position(|item| item.entry_ref == entry_ref) {
            self.items.remove(pos);
            true
        } else {
            false
        }
    }

    /// O(1) positional access; `None` if `i` is out of range.
    pub fn get_entry(&self, i: usize) -> Option<EntryRef> {
        self.items.get(i).map(|item| item.entry_ref)
    }

    pub fn num_entries(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// A flat sequence view, in sorted order, for serialisation and
    /// search input.
    pub fn joined(&self) -> impl Iterator<Item = EntryRef> + '_ {
        self.items.iter().map(|item| item.entry_ref)
    }

    /// Internal sub-containers of a multi-segment representation. This
    /// implementation is a single flat run, so it always yields one
    /// segment; callers that want zero-copy iteration over a
    /// multi-segment container can rely on this API remaining stable if
    /// the representation ever changes.
    pub fn containers(&self) -> impl Iterator<Item = &EntriesContainer> {
        std::iter::once(self)
    }

    /// Splits this container into two at position `at`: the receiver
    /// keeps `[0, at)`, the return value holds `[at, len)`. Both halves
    /// keep the same schema and remain internally sorted.
    pub fn split_off(&mut self, at: usize) -> EntriesContainer {
        let tail = self.items.split_off(at.min(self.items.len()));
        EntriesContainer {
            kind: self.kind,
            primary: self.primary,
            secondary: self.secondary,
            items: tail,
        }
    }

    /// Merges `other` (same schema) into this container, preserving
    /// sorted order. Entries present in both (by identity) are kept once.
    pub fn join(&mut self, other: EntriesContainer) {
        debug_assert_eq!(self.kind, other.kind);
        debug_assert_eq!(self.primary, other.primary);
        debug_assert_eq!(self.secondary, other.secondary);

        let mut merged = Vec::with_capacity(self.items.len() + other.items.len());
        let mut left = self.items.drain(..).peekable();
        let mut right = other.items.into_iter().peekable();
        loop {
            match (left.peek(), right.peek()) {
                (Some(l), Some(r)) => {
                    match cmp_item_key(
                        (&l.primary_key, &l.secondary_key, &l.entry_ref),
                        (&r.primary_key, &r.secondary_key, &r.entry_ref),
                    ) {
                        Ordering::Less => merged.push(left.next().unwrap()),
                        Ordering::Greater => merged.push(right.next().unwrap()),
                        Ordering::Equal => {
                            merged.push(left.next().unwrap());
                            right.next();
                        }
                    }
                }
                (Some(_), None) => merged.push(left.next().unwrap()),
                (None, Some(_)) => merged.push(right.next().unwrap()),
                (None, None) => break,
            }
        }
        self.items = merged;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slab::SlabIndex;

    struct FixedResolver {
        kind: EntryKind,
        names: Vec<(&'static str, &'static str)>,
    }

    impl EntryResolver for FixedResolver {
        fn entry_kind(&self, _entry_ref: EntryRef) -> Option<EntryKind> {
            Some(self.kind)
        }

        fn sort_key(&self, entry_ref: EntryRef, property: SortProperty) -> Option<SortKey> {
            let (name, ext) = self.names.get(entry_ref.idx.get())?;
            Some(match property {
                SortProperty::Name => SortKey::Name(UniCase::new(name)),
                SortProperty::Extension => SortKey::Extension(ext),
                _ => SortKey::None,
            })
        }
    }

    fn entry_ref(i: usize) -> EntryRef {
        EntryRef::new(0, SlabIndex::new(i))
    }

    #[test]
    fn insert_maintains_sorted_order() {
        let resolver = FixedResolver {
            kind: EntryKind::File,
            names: vec![("c", ""), ("a", ""), ("b", "")],
        };
        let mut container =
            EntriesContainer::new(EntryKind::File, SortProperty::Name, SortProperty::None);
        assert!(container.insert(&resolver, entry_ref(0)));
        assert!(container.insert(&resolver, entry_ref(1)));
        assert!(container.insert(&resolver, entry_ref(2)));

        let names: Vec<_> = container
            .joined()
            .map(|e| resolver.names[e.idx.get()].0)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn insert_rejects_duplicate_identity() {
        let resolver = FixedResolver {
            kind: EntryKind::File,
            names: vec![("a", "")],
        };
        let mut container =
            EntriesContainer::new(EntryKind::File, SortProperty::Name, SortProperty::None);
        assert!(container.insert(&resolver, entry_ref(0)));
        assert!(!container.insert(&resolver, entry_ref(0)));
        assert_eq!(container.num_entries(), 1);
    }

    #[test]
    fn steal_removes_by_identity() {
        let resolver = FixedResolver {
            kind: EntryKind::File,
            names: vec![("a", ""), ("b", "")],
        };
        let mut container =
            EntriesContainer::new(EntryKind::File, SortProperty::Name, SortProperty::None);
        container.insert(&resolver, entry_ref(0));
        container.insert(&resolver, entry_ref(1));

        assert!(container.steal(&resolver, entry_ref(0)));
        assert!(!container.steal(&resolver, entry_ref(0)));
        assert_eq!(container.num_entries(), 1);
        assert_eq!(container.get_entry(0), Some(entry_ref(1)));
    }

    #[test]
    fn join_merges_two_sorted_containers() {
        let resolver = FixedResolver {
            kind: EntryKind::File,
            names: vec![("a", ""), ("c", ""), ("b", ""), ("d", "")],
        };
        let mut left =
            EntriesContainer::new(EntryKind::File, SortProperty::Name, SortProperty::None);
        left.insert(&resolver, entry_ref(0));
        left.insert(&resolver, entry_ref(1));

        let mut right =
            EntriesContainer::new(EntryKind::File, SortProperty::Name, SortProperty::None);
        right.insert(&resolver, entry_ref(2));
        right.insert(&resolver, entry_ref(3));

        left.join(right);
        let names: Vec<_> = left
            .joined()
            .map(|e| resolver.names[e.idx.get()].0)
            .collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn split_off_preserves_schema() {
        let resolver = FixedResolver {
            kind: EntryKind::Folder,
            names: vec![("a", ""), ("b", ""), ("c", "")],
        };
        let mut container =
            EntriesContainer::new(EntryKind::Folder, SortProperty::Name, SortProperty::None);
        container.insert(&resolver, entry_ref(0));
        container.insert(&resolver, entry_ref(1));
        container.insert(&resolver, entry_ref(2));

        let tail = container.split_off(1);
        assert_eq!(container.num_entries(), 1);
        assert_eq!(tail.num_entries(), 2);
        assert_eq!(tail.kind(), EntryKind::Folder);
    }
}
