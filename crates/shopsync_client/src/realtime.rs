use std::collections::VecDeque;
use std::rc::Rc;

use async_channel::{Receiver, Sender, TrySendError};
use futures::future::{Fuse, FusedFuture, FutureExt, LocalBoxFuture};
use futures::{pin_mut, select};
use shopsync_common::error::TransportError;
use shopsync_common::{ChannelId, ChannelSummary, ClientEvent, ServerEvent, Session};
use shopsync_state::{CounterStore, StoreHandle};
use tracing::{debug, info, trace, warn};

use crate::error::{RemoteError, SyncError};
use crate::settings::{SeedOrdering, SyncSettings};
use crate::traits::{RealtimeConnection, RealtimeTransport, RemoteSyncClient};

/// Lifecycle of the push connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Handshake done, subscribe intent sent.
    Connected,
    /// The server acknowledged channel membership.
    Subscribed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SeedState {
    /// No session is active.
    Idle,
    Pending,
    Done,
    Failed,
}

#[derive(Debug)]
enum Intent {
    Send(ClientEvent),
    Disconnect,
}

enum Step {
    Seeded(Result<Vec<ChannelSummary>, RemoteError>),
    Inbound(Option<Result<Vec<ServerEvent>, TransportError>>),
    Intent(Option<Intent>),
}

type SeedFuture = Fuse<LocalBoxFuture<'static, Result<Vec<ChannelSummary>, RemoteError>>>;

/// Cloneable way to reach a running [`RealtimeEventChannel`].
///
/// While [`RealtimeEventChannel::run`] owns the connection, intents go
/// through a bounded queue that the run loop drains.
#[derive(Clone, Debug)]
pub struct RealtimeHandle {
    intents: Sender<Intent>,
}

impl RealtimeHandle {
    /// Ask the server to add this session to a channel.
    pub fn join(&self, channel_id: impl Into<ChannelId>) -> Result<(), SyncError> {
        self.push(Intent::Send(ClientEvent::Join {
            channel_id: channel_id.into(),
        }))
    }

    /// Close the connection; `run` returns once it is released.
    pub fn disconnect(&self) -> Result<(), SyncError> {
        self.push(Intent::Disconnect)
    }

    fn push(&self, intent: Intent) -> Result<(), SyncError> {
        match self.intents.try_send(intent) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(intent)) => {
                warn!("intent queue full, dropping {:?}", intent);
                Err(SyncError::Transport(TransportError::Send("intent queue is full".into())))
            }
            Err(TrySendError::Closed(_)) => Err(SyncError::NotConnected),
        }
    }
}

/// Keeps the unread counters of one session in step with the server.
///
/// Owns the push connection for the lifetime of the session: [`activate`]
/// opens it and sends the subscribe intent, [`run`] processes pushes and
/// performs the bulk seed, [`deactivate`] releases it on logout. Dropping the
/// channel also releases the connection.
///
/// [`activate`]: Self::activate
/// [`run`]: Self::run
/// [`deactivate`]: Self::deactivate
pub struct RealtimeEventChannel {
    session: Rc<Session>,
    counters: StoreHandle<CounterStore>,
    remote: Rc<dyn RemoteSyncClient>,
    transport: Box<dyn RealtimeTransport>,
    seed_ordering: SeedOrdering,
    state: ConnectionState,
    connection: Option<RealtimeConnection>,
    subscribed_channels: Vec<ChannelId>,
    last_error: Option<String>,
    seed: SeedState,
    buffered: VecDeque<ServerEvent>,
    intents_tx: Sender<Intent>,
    intents_rx: Receiver<Intent>,
}

impl RealtimeEventChannel {
    pub fn new(
        session: Rc<Session>,
        counters: StoreHandle<CounterStore>,
        remote: Rc<dyn RemoteSyncClient>,
        transport: Box<dyn RealtimeTransport>,
        settings: &SyncSettings,
    ) -> Self {
        let (intents_tx, intents_rx) = async_channel::bounded(settings.intent_capacity.max(1));
        Self {
            session,
            counters,
            remote,
            transport,
            seed_ordering: settings.seed_ordering,
            state: ConnectionState::Disconnected,
            connection: None,
            subscribed_channels: Vec::new(),
            last_error: None,
            seed: SeedState::Idle,
            buffered: VecDeque::new(),
            intents_tx,
            intents_rx,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn subscribed_channels(&self) -> &[ChannelId] {
        &self.subscribed_channels
    }

    pub fn is_seeded(&self) -> bool {
        self.seed == SeedState::Done
    }

    pub fn counters(&self) -> &StoreHandle<CounterStore> {
        &self.counters
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn handle(&self) -> RealtimeHandle {
        RealtimeHandle {
            intents: self.intents_tx.clone(),
        }
    }

    /// Open the connection and send the subscribe intent.
    ///
    /// The bulk seed starts with the next call to [`run`](Self::run).
    pub async fn activate(&mut self) -> Result<(), SyncError> {
        if self.state != ConnectionState::Disconnected {
            return Err(SyncError::AlreadyActive(self.state));
        }

        self.set_state(ConnectionState::Connecting);
        let mut connection = match self.transport.connect(&self.session).await {
            Ok(connection) => connection,
            Err(err) => {
                warn!(
                    "[{}] could not connect for {}: {}",
                    self.transport.name(),
                    self.session.user_id,
                    err
                );
                self.last_error = Some(err.to_string());
                self.set_state(ConnectionState::Disconnected);
                return Err(err.into());
            }
        };
        self.set_state(ConnectionState::Connected);

        let subscribe = ClientEvent::Subscribe {
            user_id: self.session.user_id.clone(),
        };
        if let Err(err) = connection.sink.send(&subscribe).await {
            warn!("[{}] subscribe intent failed: {}", self.transport.name(), err);
            self.last_error = Some(err.to_string());
            // Best effort; the connection is unusable either way.
            let _ = connection.sink.close().await;
            self.set_state(ConnectionState::Disconnected);
            return Err(err.into());
        }

        self.connection = Some(connection);
        self.last_error = None;
        self.seed = SeedState::Pending;
        self.buffered.clear();
        Ok(())
    }

    /// [`activate`](Self::activate) then [`run`](Self::run).
    pub async fn run_session(&mut self) -> Result<(), SyncError> {
        self.activate().await?;
        self.run().await
    }

    /// Drive the connection until it closes.
    ///
    /// Runs the bulk seed concurrently with push processing, forwards intents
    /// queued through [`RealtimeHandle`], and returns `Ok` once the
    /// connection is gone. Counter state is left as is; call
    /// [`deactivate`](Self::deactivate) on logout.
    pub async fn run(&mut self) -> Result<(), SyncError> {
        if self.connection.is_none() {
            return Err(SyncError::NotConnected);
        }

        let mut seed: SeedFuture = if self.seed == SeedState::Pending {
            let remote = Rc::clone(&self.remote);
            let session = Rc::clone(&self.session);
            let fetch: LocalBoxFuture<'static, _> =
                Box::pin(async move { remote.fetch_channel_summaries(&session).await });
            fetch.fuse()
        } else {
            Fuse::terminated()
        };

        loop {
            let step = {
                let Some(connection) = self.connection.as_mut() else {
                    break;
                };
                let inbound = connection.source.recv().fuse();
                let intent = self.intents_rx.recv().fuse();
                pin_mut!(inbound, intent);

                select! {
                    summaries = seed => Step::Seeded(summaries),
                    frame = inbound => Step::Inbound(frame),
                    intent = intent => Step::Intent(intent.ok()),
                }
            };

            match step {
                Step::Seeded(result) => self.apply_seed(result),
                Step::Inbound(Some(Ok(events))) => {
                    for event in events {
                        self.handle_event(event);
                    }
                }
                Step::Inbound(Some(Err(TransportError::Codec(err)))) => {
                    debug!("[{}] skipping undecodable frame: {}", self.transport.name(), err);
                }
                Step::Inbound(Some(Err(err))) => {
                    warn!("[{}] transport failure: {}", self.transport.name(), err);
                    self.last_error = Some(err.to_string());
                    self.release_connection(false).await;
                }
                Step::Inbound(None) => {
                    info!("[{}] connection closed by server", self.transport.name());
                    self.release_connection(false).await;
                }
                Step::Intent(Some(Intent::Send(event))) => {
                    if let Err(err) = self.send(&event).await {
                        warn!("[{}] could not send {}: {}", self.transport.name(), event.name(), err);
                        self.last_error = Some(err.to_string());
                    }
                }
                Step::Intent(Some(Intent::Disconnect)) => {
                    self.release_connection(true).await;
                }
                Step::Intent(None) => break,
            }
        }

        if !seed.is_terminated() {
            debug!("seed abandoned with the connection");
        }
        Ok(())
    }

    /// Send a join intent directly (when no run loop owns the channel).
    pub async fn join(&mut self, channel_id: impl Into<ChannelId>) -> Result<(), SyncError> {
        let event = ClientEvent::Join {
            channel_id: channel_id.into(),
        };
        Ok(self.send(&event).await?)
    }

    /// Fetch fresh unread counts and overwrite the seeded channels.
    pub async fn reseed(&mut self) -> Result<(), SyncError> {
        match self.remote.fetch_channel_summaries(&self.session).await {
            Ok(summaries) => {
                self.bulk_set(summaries);
                Ok(())
            }
            Err(err) => {
                self.last_error = Some(err.to_string());
                Err(err.into())
            }
        }
    }

    /// End of session: release the connection and forget all counts.
    pub async fn deactivate(&mut self) {
        self.release_connection(true).await;
        self.counters.update(CounterStore::reset_all);
        while self.intents_rx.try_recv().is_ok() {}
        info!("realtime channel for {} deactivated", self.session.user_id);
    }

    /// Apply one inbound event.
    ///
    /// Counter events that arrive while the bulk seed is still pending are
    /// queued when [`SeedOrdering::BufferUntilSeeded`] is selected.
    pub fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Subscribed { channel_ids } => {
                info!("subscribed to {} channels", channel_ids.len());
                self.subscribed_channels = channel_ids;
                if self.state == ConnectionState::Connected {
                    self.set_state(ConnectionState::Subscribed);
                }
            }
            ServerEvent::Error { message } => {
                warn!("realtime server reported: {}", message);
                self.last_error = Some(message);
            }
            counter_event => {
                if self.seed == SeedState::Pending && self.seed_ordering == SeedOrdering::BufferUntilSeeded {
                    if let Some(channel_id) = counter_event.counter_channel() {
                        trace!("buffering {} for {} until seeded", counter_event.name(), channel_id);
                    }
                    self.buffered.push_back(counter_event);
                } else {
                    self.apply_counter_event(counter_event);
                }
            }
        }
    }

    fn apply_counter_event(&self, event: ServerEvent) {
        match event {
            ServerEvent::NewMessage { channel_id, message } => {
                if self.session.is_self(&message.sender_id) {
                    trace!("ignoring own message in {}", channel_id);
                    return;
                }
                self.counters.update(|counters| counters.increment(channel_id, 1));
            }
            ServerEvent::MessagesRead { channel_id } => {
                self.counters.update(|counters| counters.clear(&channel_id));
            }
            ServerEvent::ChannelDeleted { channel_id } => {
                self.counters.update(|counters| counters.remove(&channel_id));
            }
            ServerEvent::Subscribed { .. } | ServerEvent::Error { .. } => {}
        }
    }

    fn apply_seed(&mut self, result: Result<Vec<ChannelSummary>, RemoteError>) {
        match result {
            Ok(summaries) => {
                info!("seeded unread counts for {} channels", summaries.len());
                self.bulk_set(summaries);
                self.seed = SeedState::Done;
            }
            Err(err) => {
                warn!("bulk seed failed: {}", err);
                self.last_error = Some(err.to_string());
                self.seed = SeedState::Failed;
            }
        }

        if !self.buffered.is_empty() {
            debug!("replaying {} buffered events", self.buffered.len());
        }
        while let Some(event) = self.buffered.pop_front() {
            self.apply_counter_event(event);
        }
    }

    fn bulk_set(&self, summaries: Vec<ChannelSummary>) {
        self.counters.update(|counters| {
            counters.bulk_set(
                summaries
                    .into_iter()
                    .map(|summary| (summary.channel_id, summary.unread_count)),
            )
        });
    }

    async fn send(&mut self, event: &ClientEvent) -> Result<(), TransportError> {
        let Some(connection) = self.connection.as_mut() else {
            return Err(TransportError::Closed);
        };
        trace!("sending {}", event.name());
        connection.sink.send(event).await
    }

    async fn release_connection(&mut self, graceful: bool) {
        if let Some(mut connection) = self.connection.take() {
            if graceful {
                if let Err(err) = connection.sink.close().await {
                    debug!("[{}] close failed: {}", self.transport.name(), err);
                }
            }
        }
        if !self.buffered.is_empty() {
            debug!("discarding {} buffered events", self.buffered.len());
            self.buffered.clear();
        }
        self.seed = SeedState::Idle;
        self.subscribed_channels.clear();
        self.set_state(ConnectionState::Disconnected);
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            info!(
                "[{}] {} -> {:?} ({:?})",
                self.transport.name(),
                self.session.user_id,
                state,
                self.state
            );
            self.state = state;
        }
    }
}

impl Drop for RealtimeEventChannel {
    fn drop(&mut self) {
        if self.connection.take().is_some() {
            debug!(
                "[{}] releasing live connection for {} on drop",
                self.transport.name(),
                self.session.user_id
            );
        }
    }
}
