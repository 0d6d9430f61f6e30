use async_trait::async_trait;

use shopsync_common::error::TransportError;
use shopsync_common::{
    ChannelSummary, ClientEvent, CollectionKind, CollectionSnapshot, ItemId, NewItem, ServerEvent, Session,
};

use crate::error::RemoteError;

/// REST endpoints the sync core consumes.
///
/// Implementations attach `session.token` as a bearer credential to every
/// call. The core runs on a single-threaded event loop, so neither the trait
/// nor its futures are required to be `Send`.
#[async_trait(?Send)]
pub trait RemoteSyncClient {
    /// Current canonical state of a collection.
    async fn fetch_collection(
        &self,
        session: &Session,
        kind: CollectionKind,
    ) -> Result<CollectionSnapshot, RemoteError>;

    /// Add `quantity` units of a product; returns the resulting collection.
    async fn add_to_collection(
        &self,
        session: &Session,
        kind: CollectionKind,
        item: &NewItem,
        quantity: u32,
    ) -> Result<CollectionSnapshot, RemoteError>;

    /// Remove up to `quantity` units of an entry; returns the resulting collection.
    async fn remove_from_collection(
        &self,
        session: &Session,
        kind: CollectionKind,
        item_id: &ItemId,
        quantity: u32,
    ) -> Result<CollectionSnapshot, RemoteError>;

    /// Empty a collection. No snapshot is returned.
    async fn clear_collection(&self, session: &Session, kind: CollectionKind) -> Result<(), RemoteError>;

    /// Unread counts for every channel of the user.
    async fn fetch_channel_summaries(&self, session: &Session) -> Result<Vec<ChannelSummary>, RemoteError>;
}

/// Writing half of a realtime connection.
#[async_trait(?Send)]
pub trait EventSink {
    async fn send(&mut self, event: &ClientEvent) -> Result<(), TransportError>;

    /// Close the connection gracefully.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Reading half of a realtime connection.
#[async_trait(?Send)]
pub trait EventSource {
    /// Next batch of events. `None` once the connection is gone.
    ///
    /// Must be cancel-safe: the channel drops a pending `recv` whenever an
    /// outbound intent or the bulk seed completes first.
    async fn recv(&mut self) -> Option<Result<Vec<ServerEvent>, TransportError>>;
}

/// A live connection, already split into its two halves.
pub struct RealtimeConnection {
    pub sink: Box<dyn EventSink>,
    pub source: Box<dyn EventSource>,
}

impl RealtimeConnection {
    pub fn new(sink: impl EventSink + 'static, source: impl EventSource + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            source: Box::new(source),
        }
    }
}

/// Something that can open a push connection for a session.
///
/// The session's credential must be attached to the handshake.
#[async_trait(?Send)]
pub trait RealtimeTransport {
    /// Name used in logs, e.g. "WebSocket".
    fn name(&self) -> &'static str;

    async fn connect(&self, session: &Session) -> Result<RealtimeConnection, TransportError>;
}
