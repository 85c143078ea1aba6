//! Include/Exclude policy: which subtrees an `IndexStore` scans, and which
//! paths within them a walker should skip.
//!
//! `IncludeManager`/`ExcludeManager` are collaborator traits (§6); the
//! crate ships simple `Vec`-backed implementations so it runs standalone.
//! A real application can swap in one backed by its own config store —
//! `Include`/`Exclude` derive `serde::{Serialize, Deserialize}` so that
//! config layer can persist them without this crate knowing its format.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One configured scan root.
///
/// Equality is the tuple's equality (derived `PartialEq`), matching §6's
/// "equality is defined by the tuple" requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Include {
    pub path: PathBuf,
    /// Don't cross filesystem/device boundaries while walking.
    pub one_file_system: bool,
    /// Whether this root gets a live `ExternalMonitor` after scanning.
    pub monitored: bool,
    /// Whether this root is re-scanned immediately after a snapshot load.
    pub scan_after_load: bool,
    /// Stable identifier; becomes the Index's `db_index`.
    pub id: u16,
}

impl Include {
    pub fn new(path: impl Into<PathBuf>, id: u16) -> Self {
        Self {
            path: path.into(),
            one_file_system: false,
            monitored: true,
            scan_after_load: false,
            id,
        }
    }
}

/// A single should-skip rule evaluated against a path during a scan.
///
/// Equality is rule equivalence (§6), which for this simple representation
/// is the derived tuple equality over the rule's fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclude {
    /// Substring/glob-free match against the path as a string; kept
    /// deliberately simple since the real pattern language is an external
    /// walker concern (§1 Non-goals).
    pub pattern: String,
}

impl Exclude {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    fn matches(&self, path: &Path) -> bool {
        path.to_string_lossy().contains(self.pattern.as_str())
    }
}

/// Supplies the ordered list of configured scan roots.
pub trait IncludeManager: Send + Sync {
    fn includes(&self) -> &[Include];
}

/// Supplies should-skip predicates consulted by the walker during a scan.
pub trait ExcludeManager: Send + Sync {
    fn excludes(&self) -> &[Exclude];

    /// True if `path` should be skipped entirely (and, for a directory,
    /// its whole subtree with it).
    fn should_skip(&self, path: &Path) -> bool {
        self.excludes().iter().any(|exclude| exclude.matches(path))
    }
}

/// `Vec`-backed `IncludeManager`, preserving insertion order.
#[derive(Debug, Clone, Default)]
pub struct VecIncludeManager {
    includes: Vec<Include>,
}

impl VecIncludeManager {
    pub fn new(includes: Vec<Include>) -> Self {
        Self { includes }
    }

    pub fn push(&mut self, include: Include) {
        self.includes.push(include);
    }
}

impl IncludeManager for VecIncludeManager {
    fn includes(&self) -> &[Include] {
        &self.includes
    }
}

/// `Vec`-backed `ExcludeManager`.
#[derive(Debug, Clone, Default)]
pub struct VecExcludeManager {
    excludes: Vec<Exclude>,
}

impl VecExcludeManager {
    pub fn new(excludes: Vec<Exclude>) -> Self {
        Self { excludes }
    }

    pub fn push(&mut self, exclude: Exclude) {
        self.excludes.push(exclude);
    }
}

impl ExcludeManager for VecExcludeManager {
    fn excludes(&self) -> &[Exclude] {
        &self.excludes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn include_equality_is_tuple_equality() {
        let a = Include::new("/a", 1);
        let b = Include::new("/a", 1);
        let c = Include::new("/a", 2);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn include_manager_preserves_order() {
        let manager = VecIncludeManager::new(vec![Include::new("/a", 1), Include::new("/b", 2)]);
        let paths: Vec<_> = manager.includes().iter().map(|i| i.id).collect();
        assert_eq!(paths, vec![1, 2]);
    }

    #[test]
    fn exclude_manager_matches_substring() {
        let manager = VecExcludeManager::new(vec![Exclude::new("node_modules")]);
        assert!(manager.should_skip(Path::new("/a/node_modules/pkg")));
        assert!(!manager.should_skip(Path::new("/a/src/pkg")));
    }
}
