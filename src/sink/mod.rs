//! View sinks: where reconciled diffs are published.
//!
//! The rendering surface is an external collaborator. It receives each
//! event's diffs as a read-only batch and must apply them by key:
//! `Added`/`Updated` create-or-replace, `Removed` delete-if-present.
//! [`MirrorSink`] is the reference implementation of that contract.
//!
//! If a batch fails to apply, the consumer follows it with
//! [`ViewSink::resync`] carrying the full current view.
//!
//! Sinks run on the dispatch consumer thread and must return quickly;
//! expensive rendering belongs on another thread (see [`ChannelSink`]).

mod sinks;

pub use sinks::{ChannelSink, MirrorSink, NullSink, ViewBatch, ViewSink};
