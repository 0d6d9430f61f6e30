//! # shopsync state
//!
//! Synchronous, side-effect free reducers holding the client-side copies of
//! server state:
//!
//! - [`CollectionStore`]: one cart or wishlist, with totals derived from the
//!   items on every change.
//! - [`CounterStore`]: unread counts per chat channel plus their sum.
//!
//! Neither store performs I/O. The dispatcher and realtime channel in
//! `shopsync_client` drive them through a shared [`StoreHandle`].

mod collection;
mod counter;
mod handle;

pub use collection::{CollectionAction, CollectionStore, CollectionTotals};
pub use counter::{CounterAction, CounterStore};
pub use handle::StoreHandle;
