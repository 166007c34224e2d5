//! View sink trait and bundled implementations.

use crate::collection::KeyedStore;
use crate::types::{DiffKind, DisplayFields, EntityKey, ViewDiff};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

/// Consumer of reconciled diffs.
pub trait ViewSink: Send {
    /// Apply the diffs produced by one event.
    fn apply(&mut self, diffs: &[ViewDiff]);

    /// Replace the whole view with `snapshot`, a list of `Added` diffs in
    /// view order.
    ///
    /// Called after a failed batch so that diffs lost to the failure do not
    /// linger. The default applies the snapshot over the current view, which
    /// refreshes every live entity but cannot delete stale ones; sinks that
    /// hold state should clear it first.
    fn resync(&mut self, snapshot: &[ViewDiff]) {
        self.apply(snapshot);
    }
}

impl<F> ViewSink for F
where
    F: FnMut(&[ViewDiff]) + Send,
{
    fn apply(&mut self, diffs: &[ViewDiff]) {
        self(diffs)
    }
}

/// Discards every diff.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl ViewSink for NullSink {
    fn apply(&mut self, _diffs: &[ViewDiff]) {}
}

/// A message delivered by [`ChannelSink`].
#[derive(Clone, Debug, PartialEq)]
pub enum ViewBatch {
    /// Diffs of one event, to be applied by key.
    Diffs(Vec<ViewDiff>),

    /// The full view; everything not listed must be dropped.
    Resync(Vec<ViewDiff>),
}

/// Forwards each diff batch to a rendering thread.
///
/// Sending never blocks. Once the receiver is gone, batches are discarded.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    sender: Sender<ViewBatch>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<ViewBatch>) {
        let (sender, receiver) = unbounded();
        (Self { sender }, receiver)
    }

    fn send(&self, batch: ViewBatch, count: usize) {
        if self.sender.send(batch).is_err() {
            trace!(count, "view receiver gone, diffs discarded");
        }
    }
}

impl ViewSink for ChannelSink {
    fn apply(&mut self, diffs: &[ViewDiff]) {
        if diffs.is_empty() {
            return;
        }
        self.send(ViewBatch::Diffs(diffs.to_vec()), diffs.len());
    }

    fn resync(&mut self, snapshot: &[ViewDiff]) {
        // Sent even when empty: an empty view still clears the renderer.
        self.send(ViewBatch::Resync(snapshot.to_vec()), snapshot.len());
    }
}

/// Applies diffs by key into a keyed mirror of the rendered view.
///
/// Clones share the same mirror, so a test or renderer can keep one handle
/// while the dispatch queue owns the other.
#[derive(Clone, Debug, Default)]
pub struct MirrorSink {
    view: Arc<Mutex<KeyedStore<EntityKey, DisplayFields>>>,
}

impl MirrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current mirrored entities in view order.
    pub fn entries(&self) -> Vec<(EntityKey, DisplayFields)> {
        self.view
            .lock()
            .iter()
            .map(|(key, fields)| (key.clone(), fields.clone()))
            .collect()
    }

    pub fn get(&self, key: &EntityKey) -> Option<DisplayFields> {
        self.view.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.view.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.view.lock().is_empty()
    }
}

impl MirrorSink {
    fn apply_locked(view: &mut KeyedStore<EntityKey, DisplayFields>, diffs: &[ViewDiff]) {
        for diff in diffs {
            match (diff.kind, &diff.fields) {
                (DiffKind::Added | DiffKind::Updated, Some(fields)) => {
                    view.upsert(diff.key.clone(), fields.clone());
                }
                (DiffKind::Removed, _) => {
                    view.remove(&diff.key);
                }
                (_, None) => trace!(key = %diff.key, "diff without fields ignored"),
            }
        }
    }
}

impl ViewSink for MirrorSink {
    fn apply(&mut self, diffs: &[ViewDiff]) {
        Self::apply_locked(&mut self.view.lock(), diffs);
    }

    fn resync(&mut self, snapshot: &[ViewDiff]) {
        let mut view = self.view.lock();
        view.clear();
        Self::apply_locked(&mut view, snapshot);
    }
}
