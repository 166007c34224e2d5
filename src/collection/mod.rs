//! Keyed collection storage.
//!
//! Holds the current known-good state for one entity kind. Entries keep
//! their first-insertion position for enumeration, which mirrors how the
//! view orders its nodes; updating an entry never moves it.

mod store;

pub use store::{KeyedStore, Removal, Upsert};
