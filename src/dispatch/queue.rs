//! Channel-backed dispatch queue with a single consumer thread.

use crate::error::{Result, ViewError};
use crate::reconcile::Reconciler;
use crate::sink::ViewSink;
use crate::types::BusEvent;
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender, TrySendError};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Name of the consumer thread.
const CONSUMER_THREAD_NAME: &str = "systemview-dispatch";

/// State shared between producers, the consumer and the handle.
#[derive(Debug, Default)]
struct Shared {
    /// Set once shutdown begins; no event is applied after this.
    halted: AtomicBool,
    running: AtomicBool,
    applied: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    resynced: AtomicU64,
}

/// Cloneable, non-blocking entry point for bus callbacks.
#[derive(Clone, Debug)]
pub struct EventProducer {
    sender: Sender<BusEvent>,
    shared: Arc<Shared>,
}

impl EventProducer {
    /// Hand an event to the consumer without waiting for it to be applied.
    ///
    /// Fails with `QueueClosed` once shutdown has begun, and with `QueueFull`
    /// when a bounded queue is at capacity (the event is dropped).
    pub fn enqueue(&self, event: BusEvent) -> Result<()> {
        if self.shared.halted.load(Ordering::Acquire) {
            return Err(ViewError::QueueClosed);
        }

        match self.sender.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(event)) => {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(kind = ?event.kind(), "dispatch queue full, event dropped");
                Err(ViewError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => Err(ViewError::QueueClosed),
        }
    }

    /// Whether the queue still accepts events.
    pub fn is_open(&self) -> bool {
        !self.shared.halted.load(Ordering::Acquire)
    }
}

/// Spawns the consumer for a reconciler/sink pair.
#[derive(Debug)]
pub struct DispatchQueue;

impl DispatchQueue {
    /// Start the consumer thread. `capacity` bounds the queue (None = unbounded).
    pub fn spawn<S>(
        reconciler: Reconciler,
        sink: S,
        capacity: Option<usize>,
    ) -> Result<DispatchHandle>
    where
        S: ViewSink + 'static,
    {
        let (sender, events) = match capacity {
            Some(0) => {
                return Err(ViewError::InvalidConfig(
                    "queue capacity must be at least 1".to_string(),
                ))
            }
            Some(cap) => bounded(cap),
            None => unbounded(),
        };
        let (shutdown, shutdown_rx) = bounded::<()>(0);
        let shared = Arc::new(Shared::default());
        shared.running.store(true, Ordering::Release);

        let consumer = Consumer {
            reconciler,
            sink,
            events,
            shutdown: shutdown_rx,
            shared: Arc::clone(&shared),
            needs_resync: false,
        };

        let thread = thread::Builder::new()
            .name(CONSUMER_THREAD_NAME.to_string())
            .spawn(move || consumer.run())?;

        Ok(DispatchHandle {
            producer: EventProducer { sender, shared },
            shutdown: Some(shutdown),
            thread: Some(thread),
        })
    }
}

struct Consumer<S> {
    reconciler: Reconciler,
    sink: S,
    events: Receiver<BusEvent>,
    shutdown: Receiver<()>,
    shared: Arc<Shared>,
    /// Set when the sink may have missed diffs; cleared by a good resync.
    needs_resync: bool,
}

impl<S: ViewSink> Consumer<S> {
    fn run(mut self) -> Reconciler {
        debug!("dispatch consumer started");
        let events = self.events.clone();
        let shutdown = self.shutdown.clone();

        loop {
            select! {
                recv(shutdown) -> _ => break,
                recv(events) -> msg => match msg {
                    Ok(event) => {
                        // Shutdown may have begun while we were parked.
                        if self.shared.halted.load(Ordering::Acquire) {
                            break;
                        }
                        self.apply_isolated(event);
                    }
                    Err(_) => break,
                },
            }
        }

        let pending = events.len();
        if pending > 0 {
            debug!(pending, "discarding queued events at shutdown");
        }
        self.shared.running.store(false, Ordering::Release);
        debug!(
            applied = self.shared.applied.load(Ordering::Relaxed),
            "dispatch consumer stopped"
        );
        self.reconciler
    }

    fn apply_isolated(&mut self, event: BusEvent) {
        if self.needs_resync {
            self.resync_isolated();
        }

        let kind = event.kind();
        let reconciler = &mut self.reconciler;
        let sink = &mut self.sink;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let diffs = reconciler.apply(event);
            sink.apply(&diffs);
        }));

        match outcome {
            Ok(()) => {
                self.shared.applied.fetch_add(1, Ordering::AcqRel);
            }
            Err(cause) => {
                self.shared.failed.fetch_add(1, Ordering::AcqRel);
                warn!(
                    ?kind,
                    reason = %panic_reason(&*cause),
                    "event application failed, continuing"
                );
                self.needs_resync = true;
                self.resync_isolated();
            }
        }
    }

    /// Hand the sink the full current view. Retried before the next event
    /// if it fails too.
    fn resync_isolated(&mut self) {
        let reconciler = &self.reconciler;
        let sink = &mut self.sink;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let snapshot = reconciler.snapshot();
            sink.resync(&snapshot);
            snapshot.len()
        }));

        match outcome {
            Ok(entities) => {
                self.needs_resync = false;
                self.shared.resynced.fetch_add(1, Ordering::AcqRel);
                debug!(entities, "view resynchronized");
            }
            Err(cause) => {
                warn!(reason = %panic_reason(&*cause), "view resync failed, will retry");
            }
        }
    }
}

fn panic_reason(cause: &(dyn Any + Send)) -> String {
    cause
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| cause.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Owner of a running dispatch queue.
///
/// Dropping the handle stops the consumer.
#[derive(Debug)]
pub struct DispatchHandle {
    producer: EventProducer,
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<Reconciler>>,
}

impl DispatchHandle {
    /// A new producer for this queue.
    pub fn producer(&self) -> EventProducer {
        self.producer.clone()
    }

    /// Events fully applied (reconciler and sink both returned).
    ///
    /// Unlike [`Reconciler::applied_events`], an event whose sink panicked
    /// after the stores changed is counted in [`failed_count`] instead.
    ///
    /// [`failed_count`]: DispatchHandle::failed_count
    pub fn applied_count(&self) -> u64 {
        self.producer.shared.applied.load(Ordering::Acquire)
    }

    /// Events whose application panicked.
    pub fn failed_count(&self) -> u64 {
        self.producer.shared.failed.load(Ordering::Acquire)
    }

    /// Full-view resyncs the sink accepted after a failed batch.
    pub fn resync_count(&self) -> u64 {
        self.producer.shared.resynced.load(Ordering::Acquire)
    }

    /// Events rejected by a full bounded queue.
    pub fn dropped_count(&self) -> u64 {
        self.producer.shared.dropped.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.producer.shared.running.load(Ordering::Acquire)
    }

    /// Stop applying events. Returns immediately; an event already being
    /// applied finishes, nothing queued after it is applied.
    pub fn halt(&self) {
        self.producer.shared.halted.store(true, Ordering::Release);
    }

    /// Halt and wait for the consumer to exit.
    pub fn stop(&mut self) -> Result<()> {
        self.shutdown().map(|_| ())
    }

    /// Stop and take back the reconciler with its final state.
    pub fn into_reconciler(mut self) -> Result<Reconciler> {
        self.shutdown()?.ok_or(ViewError::NotStarted)
    }

    fn shutdown(&mut self) -> Result<Option<Reconciler>> {
        self.halt();
        // Disconnecting the shutdown channel wakes a parked consumer.
        drop(self.shutdown.take());

        match self.thread.take() {
            Some(thread) => {
                let reconciler = thread.join().map_err(|_| ViewError::ConsumerPanicked)?;
                info!(
                    applied = self.applied_count(),
                    failed = self.failed_count(),
                    "dispatch queue stopped"
                );
                Ok(Some(reconciler))
            }
            None => Ok(None),
        }
    }
}

impl Drop for DispatchHandle {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "dispatch queue did not stop cleanly");
        }
    }
}
