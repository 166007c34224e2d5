//! Lifecycle control: bus registration, startup and orderly shutdown.
//!
//! Startup spawns the dispatch queue, subscribes the queue's producer to
//! every dashboard message kind, then announces this client to the
//! subscription service. Any failure there is returned to the caller.
//!
//! Shutdown halts the queue first (nothing further is applied), then
//! deregisters from the bus, waits for the consumer to finish the event it
//! may be applying, and only then closes the transport. Deregistration runs
//! even when a later step fails.

mod controller;
mod loopback;

pub use controller::{LifecycleController, ServiceBus};
pub use loopback::LoopbackBus;
