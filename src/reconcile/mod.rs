//! Event reconciliation.
//!
//! Translates each bus event into keyed-store operations and the diffs the
//! view must apply. Every event is total: an event that does not match the
//! current state (a remove for an unknown key, an expiry before its
//! schedule) is absorbed as a no-op, since the bus guarantees neither order
//! nor delivery.
//!
//! | Event                      | Store        | Operation                         |
//! |----------------------------|--------------|-----------------------------------|
//! | `AddSubscription`          | subscription | upsert                            |
//! | `RemoveSubscription`       | subscription | remove                            |
//! | `SubscriptionRefresh`      | subscription | full-set reconcile, then upsert   |
//! | `HealthUpdate`             | health       | full-set reconcile, then upsert   |
//! | `TimeoutScheduled`         | timeout      | upsert                            |
//! | `TimeoutRescheduled`       | timeout      | upsert                            |
//! | `TimeoutExpired`           | timeout      | remove                            |

mod label;
mod reconciler;
mod time;

pub use label::{describe_message, is_system_message};
pub use reconciler::Reconciler;
pub use time::{display_time, to_local};
