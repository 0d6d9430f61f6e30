//! # shopsync client
//!
//! Keeps client-side collections (cart, wishlist) and unread-message counters
//! convergent with an authoritative server, while letting the UI render every
//! change immediately.
//!
//! Local state is a cache; truth is the server.
//!
//! ## Collections
//!
//! [`OptimisticMutationDispatcher`] applies each user intent to a
//! [`CollectionStore`] straight away, then calls the [`RemoteSyncClient`] and
//! replaces the store with the server's snapshot. When the call fails the
//! error is recorded and the whole collection is reloaded.
//!
//! ```rust,ignore
//! use std::rc::Rc;
//! use shopsync_client::{OptimisticMutationDispatcher, SyncSettings};
//! use shopsync_common::{CollectionKind, NewItem, Price};
//! use shopsync_state::{CollectionStore, StoreHandle};
//!
//! let cart = StoreHandle::new(CollectionStore::new(CollectionKind::Cart));
//! let dispatcher = OptimisticMutationDispatcher::new(session, cart.clone(), remote, &SyncSettings::default());
//!
//! dispatcher.add(NewItem::new("p1", "Desk lamp", Price::from_minor(1999)), 1).await;
//! println!("{} items", cart.read(|c| c.total_quantity()));
//! ```
//!
//! ## Unread counters
//!
//! [`RealtimeEventChannel`] owns the push connection of one session. It seeds
//! a [`CounterStore`] from the REST summaries and applies `new_message` /
//! `messages_read` pushes to it.
//!
//! ```rust,ignore
//! let counters = StoreHandle::new(CounterStore::new());
//! let mut channel = RealtimeEventChannel::new(session, counters.clone(), remote, Box::new(transport), &settings);
//! let handle = channel.handle();
//!
//! channel.activate().await?;
//! // elsewhere: handle.join("chat-42")?;
//! channel.run().await?;
//! channel.deactivate().await; // logout
//! ```

mod dispatcher;
mod error;
mod realtime;
mod settings;
mod traits;

pub use dispatcher::{MutationKind, MutationOutcome, OptimisticMutationDispatcher};
pub use error::{RemoteError, SyncError};
pub use realtime::{ConnectionState, RealtimeEventChannel, RealtimeHandle};
pub use settings::{ReconcilePolicy, SeedOrdering, SyncSettings};
pub use traits::{EventSink, EventSource, RealtimeConnection, RealtimeTransport, RemoteSyncClient};

// Re-export the stores for convenience
pub use shopsync_state::{CollectionStore, CounterStore, StoreHandle};

// Re-export transport errors for implementors of the transport traits
pub use shopsync_common::error::TransportError;
