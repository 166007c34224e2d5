//! Dispatch queue: the single serialization point between bus callbacks
//! and the reconciler.
//!
//! Producers on arbitrary threads call [`EventProducer::enqueue`], which
//! never blocks. One consumer thread pops events in arrival order, applies
//! each to the [`Reconciler`](crate::Reconciler) and hands the diffs to the
//! [`ViewSink`](crate::ViewSink). Events from one producer keep their order;
//! nothing is promised across producers.
//!
//! A panic while applying one event is contained: the event is counted as
//! failed and the loop moves on.
//!
//! # Example
//!
//! ```ignore
//! let handle = DispatchQueue::spawn(reconciler, MirrorSink::new(), None)?;
//! let producer = handle.producer();
//! std::thread::spawn(move || producer.enqueue(event));
//! handle.stop()?;
//! ```

mod queue;

pub use queue::{DispatchHandle, DispatchQueue, EventProducer};
