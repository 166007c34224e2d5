//! # System View
//!
//! A live view-model engine for a service-bus dashboard. It consumes three
//! independent event streams (subscription topology, endpoint health and
//! timeout lifecycle) and keeps an eventually-consistent view of each,
//! publishing a minimal diff per event to a rendering surface.
//!
//! ## Core Concepts
//!
//! - **Keyed stores**: insertion-ordered maps holding the known-good state
//! - **Reconciler**: turns each bus event into store operations and diffs
//! - **Dispatch queue**: serializes events from any number of producer
//!   threads onto one consumer
//! - **View sinks**: where diffs go; the renderer applies them by key
//! - **Lifecycle controller**: bus registration and orderly shutdown
//!
//! ## Example
//!
//! ```ignore
//! use systemview::{DashboardConfig, LifecycleController, LoopbackBus, MirrorSink};
//!
//! let bus = LoopbackBus::new("loopback://dashboard");
//! let view = MirrorSink::new();
//!
//! let mut dashboard = LifecycleController::new(DashboardConfig::default(), bus.clone());
//! dashboard.start(view.clone())?;
//!
//! bus.publish(BusEvent::AddSubscription {
//!     subscription: Subscription::new("loopback://orders", "MyApp.Messages.OrderPlaced, MyApp"),
//! })?;
//!
//! dashboard.stop()?;
//! ```

pub mod collection;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod reconcile;
pub mod sink;
pub mod types;

// Re-exports
pub use collection::{KeyedStore, Removal, Upsert};
pub use config::DashboardConfig;
pub use dispatch::{DispatchHandle, DispatchQueue, EventProducer};
pub use error::{Result, ViewError};
pub use lifecycle::{LifecycleController, LoopbackBus, ServiceBus};
pub use reconcile::{describe_message, display_time, is_system_message, to_local, Reconciler};
pub use sink::{ChannelSink, MirrorSink, NullSink, ViewBatch, ViewSink};
pub use types::*;
