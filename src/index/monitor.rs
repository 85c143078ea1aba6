//! The default `ExternalMonitor`: a cross-platform `notify` backend
//! forwarding raw filesystem events over the Index's own event channel.
//!
//! Grounded in the teacher's `watcher::events::create_index_watcher` — the
//! `notify` branch only. The teacher's macOS FSEvents backend (history
//! replay, Finder-tag integration) is not carried forward: it is outside
//! this crate's scope (see DESIGN.md).

use std::fmt;
use std::path::{Path, PathBuf};

use crossbeam_channel::Sender;
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

/// A raw notification from an `ExternalMonitor`, before translation into
/// `IndexEvent`s by `Index::apply_monitor_event`.
#[derive(Debug)]
pub enum MonitorEvent {
    /// Incremental path changes to diff against the Index's current state.
    PathsChanged(Vec<PathBuf>),
    /// A full rescan is required (root itself changed, events dropped).
    RescanRequired,
    /// The monitor's backend failed.
    Error(String),
}

/// Keeps a monitor subscription alive; dropping it stops the watch.
pub trait MonitorHandle: Send + Sync {}

/// Starts watching one root, delivering raw events onto `tx`.
pub trait ExternalMonitor: Send + Sync {
    fn start(
        &self,
        root: &Path,
        root_is_dir: bool,
        tx: Sender<MonitorEvent>,
    ) -> std::io::Result<Box<dyn MonitorHandle>>;
}

struct NotifyHandle {
    _watcher: RecommendedWatcher,
}

impl fmt::Debug for NotifyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifyHandle").finish()
    }
}

impl MonitorHandle for NotifyHandle {}

/// The crate's built-in monitor, backed by `notify::RecommendedWatcher`.
#[derive(Debug, Default)]
pub struct NotifyMonitor;

impl ExternalMonitor for NotifyMonitor {
    fn start(
        &self,
        root: &Path,
        root_is_dir: bool,
        tx: Sender<MonitorEvent>,
    ) -> std::io::Result<Box<dyn MonitorHandle>> {
        let root_owned = root.to_path_buf();
        let mut watcher = recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Access(_)) {
                        return;
                    }
                    let raw = if event.paths.is_empty() {
                        MonitorEvent::RescanRequired
                    } else {
                        MonitorEvent::PathsChanged(event.paths)
                    };
                    let _ = tx.send(raw);
                }
                Err(error) => {
                    let _ = tx.send(MonitorEvent::Error(error.to_string()));
                }
            }
        })
        .map_err(std::io::Error::other)?;

        let (target, mode) = if root_is_dir {
            (root_owned.clone(), RecursiveMode::Recursive)
        } else {
            (
                root_owned
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or(root_owned),
                RecursiveMode::NonRecursive,
            )
        };
        watcher.watch(&target, mode).map_err(std::io::Error::other)?;

        Ok(Box::new(NotifyHandle { _watcher: watcher }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_monitor_can_watch_a_directory() {
        let temp = tempfile::TempDir::new().unwrap();
        let (tx, _rx) = crossbeam_channel::unbounded();
        let handle = NotifyMonitor.start(temp.path(), true, tx);
        assert!(handle.is_ok());
    }
}
