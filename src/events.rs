//! Event Bus: typed lifecycle events, delivered on the caller's own event
//! context rather than the worker thread (§4.7).
//!
//! Grounded in the teacher's `watcher::events` cross-thread delivery idiom
//! (a dedicated channel plus a drain thread), generalised here from a
//! fixed `WatcherEvent` payload to an arbitrary posted closure, since an
//! application's "idle callback of the main event context" is something
//! this crate can't know the shape of ahead of time.

use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Sender};

use crate::search::{EntryInfo, SearchInfo, ViewId};
use crate::scheduler::DatabaseInfo;

/// One typed lifecycle notification (§4.7). Each `_STARTED` event has no
/// payload; each `_FINISHED` event carries the snapshot its work produced.
#[derive(Debug, Clone)]
pub enum Event {
    LoadStarted,
    LoadFinished(DatabaseInfo),
    SaveStarted,
    SaveFinished,
    ScanStarted,
    ScanFinished(DatabaseInfo),
    SearchStarted(ViewId),
    SearchFinished(ViewId, SearchInfo),
    SortStarted(ViewId),
    SortFinished(ViewId, SearchInfo),
    SelectionChanged(ViewId, SearchInfo),
    DatabaseChanged(DatabaseInfo),
    ItemInfoReady(ViewId, EntryInfo),
}

/// The idle-callback delivery abstraction event kinds are posted through.
/// A real application implements this over its own main-thread event
/// loop (e.g. a GUI toolkit's `idle_add`); `ChannelEventContext` is the
/// default so the crate is runnable standalone.
pub trait EventContext: Send + Sync {
    fn post(&self, callback: Box<dyn FnOnce() + Send>);
}

/// Delivers posted callbacks on a dedicated drain thread via an unbounded
/// `crossbeam_channel`, the same pattern the teacher uses to forward
/// watcher events off the thread that produced them.
pub struct ChannelEventContext {
    sender: Sender<Box<dyn FnOnce() + Send>>,
    drain_handle: Option<JoinHandle<()>>,
}

impl ChannelEventContext {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded::<Box<dyn FnOnce() + Send>>();
        let drain_handle = std::thread::spawn(move || {
            for callback in receiver {
                callback();
            }
        });
        Self {
            sender,
            drain_handle: Some(drain_handle),
        }
    }
}

impl Default for ChannelEventContext {
    fn default() -> Self {
        Self::new()
    }
}

impl EventContext for ChannelEventContext {
    fn post(&self, callback: Box<dyn FnOnce() + Send>) {
        let _ = self.sender.send(callback);
    }
}

impl Drop for ChannelEventContext {
    /// Dropping the sender closes the channel, which lets the drain
    /// thread's `for callback in receiver` loop end on its own; we still
    /// join it so no callback is left in flight past this point.
    fn drop(&mut self) {
        if let Some(handle) = self.drain_handle.take() {
            let _ = handle.join();
        }
    }
}

/// Publishes one `event` through `context`, wrapping it in the single
/// posted closure the scheduler's dispatch loop calls after every work
/// item (§4.7: events run on the caller's event context, never inline on
/// the worker thread).
pub fn publish(context: &dyn EventContext, sink: std::sync::Arc<dyn Fn(Event) + Send + Sync>, event: Event) {
    context.post(Box::new(move || sink(event)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn channel_event_context_runs_posted_callbacks() {
        let context = ChannelEventContext::new();
        let count = Arc::new(AtomicUsize::new(0));
        let observed = count.clone();
        context.post(Box::new(move || {
            observed.fetch_add(1, Ordering::SeqCst);
        }));

        // Dropping blocks until the drain thread finishes every queued
        // callback, so this assertion is deterministic without a sleep.
        drop(context);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn publish_wraps_event_delivery_through_the_context() {
        let context = ChannelEventContext::new();
        let received = Arc::new(AtomicUsize::new(0));
        let observed = received.clone();
        let sink: Arc<dyn Fn(Event) + Send + Sync> = Arc::new(move |event| {
            if matches!(event, Event::ScanStarted) {
                observed.fetch_add(1, Ordering::SeqCst);
            }
        });

        publish(&context, sink, Event::ScanStarted);
        drop(context);
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }
}
