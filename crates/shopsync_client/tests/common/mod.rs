#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::channel::oneshot;
use shopsync_client::{
    EventSink, EventSource, RealtimeConnection, RealtimeTransport, RemoteError, RemoteSyncClient, TransportError,
};
use shopsync_common::{
    AuthToken, ChannelSummary, ClientEvent, CollectionItem, CollectionKind, CollectionSnapshot, ItemId, NewItem,
    Price, ProductId, ServerEvent, Session,
};

pub fn session(user: &str) -> Rc<Session> {
    Rc::new(Session::new(user, AuthToken::new(format!("token-{user}")), format!("User {user}")))
}

pub fn product(id: &str, price: u64) -> NewItem {
    NewItem::new(id, format!("Product {id}"), Price::from_minor(price))
}

pub fn item(id: &str, product: &str, price: u64, quantity: u32) -> CollectionItem {
    CollectionItem {
        id: ItemId::new(id),
        product_id: ProductId::new(product),
        title: format!("Product {product}"),
        unit_price: Price::from_minor(price),
        quantity,
        service: None,
    }
}

pub fn snapshot(items: Vec<CollectionItem>) -> CollectionSnapshot {
    CollectionSnapshot::from_items(items)
}

/// Returns `Pending` once, waking itself, so other futures in a `join!` get polled.
pub async fn yield_once() {
    struct YieldOnce(bool);

    impl Future for YieldOnce {
        type Output = ();

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
            if self.0 {
                return Poll::Ready(());
            }
            self.0 = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }

    YieldOnce(false).await
}

#[derive(Debug)]
pub enum Reply {
    Snapshot(CollectionSnapshot),
    Cleared,
    Summaries(Vec<ChannelSummary>),
    Fail(RemoteError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Fetch(CollectionKind),
    Add { product: ProductId, quantity: u32 },
    Remove { item: ItemId, quantity: u32 },
    Clear(CollectionKind),
    Summaries,
}

struct Scripted {
    reply: Reply,
    gate: Option<oneshot::Receiver<()>>,
}

/// Remote that answers from a script, in call order.
///
/// Gated replies are held back until the returned sender fires, which lets a
/// test choose the order in which concurrent requests complete.
#[derive(Default)]
pub struct FakeRemote {
    script: RefCell<VecDeque<Scripted>>,
    calls: RefCell<Vec<Call>>,
    tokens: RefCell<Vec<String>>,
}

impl FakeRemote {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn reply(&self, reply: Reply) {
        self.script.borrow_mut().push_back(Scripted { reply, gate: None });
    }

    pub fn reply_gated(&self, reply: Reply) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.script.borrow_mut().push_back(Scripted {
            reply,
            gate: Some(rx),
        });
        tx
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.tokens.borrow().clone()
    }

    async fn answer(&self, session: &Session, call: Call) -> Reply {
        self.tokens.borrow_mut().push(session.token.bearer());
        self.calls.borrow_mut().push(call.clone());
        let scripted = self
            .script
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| panic!("unscripted call {call:?}"));
        if let Some(gate) = scripted.gate {
            gate.await.expect("gate dropped");
        }
        scripted.reply
    }

    fn snapshot(reply: Reply) -> Result<CollectionSnapshot, RemoteError> {
        match reply {
            Reply::Snapshot(snapshot) => Ok(snapshot),
            Reply::Fail(err) => Err(err),
            other => panic!("expected a snapshot reply, got {other:?}"),
        }
    }
}

#[async_trait(?Send)]
impl RemoteSyncClient for FakeRemote {
    async fn fetch_collection(
        &self,
        session: &Session,
        kind: CollectionKind,
    ) -> Result<CollectionSnapshot, RemoteError> {
        Self::snapshot(self.answer(session, Call::Fetch(kind)).await)
    }

    async fn add_to_collection(
        &self,
        session: &Session,
        _kind: CollectionKind,
        item: &NewItem,
        quantity: u32,
    ) -> Result<CollectionSnapshot, RemoteError> {
        let call = Call::Add {
            product: item.product_id.clone(),
            quantity,
        };
        Self::snapshot(self.answer(session, call).await)
    }

    async fn remove_from_collection(
        &self,
        session: &Session,
        _kind: CollectionKind,
        item_id: &ItemId,
        quantity: u32,
    ) -> Result<CollectionSnapshot, RemoteError> {
        let call = Call::Remove {
            item: item_id.clone(),
            quantity,
        };
        Self::snapshot(self.answer(session, call).await)
    }

    async fn clear_collection(&self, session: &Session, kind: CollectionKind) -> Result<(), RemoteError> {
        match self.answer(session, Call::Clear(kind)).await {
            Reply::Cleared => Ok(()),
            Reply::Fail(err) => Err(err),
            other => panic!("expected a clear reply, got {other:?}"),
        }
    }

    async fn fetch_channel_summaries(&self, session: &Session) -> Result<Vec<ChannelSummary>, RemoteError> {
        match self.answer(session, Call::Summaries).await {
            Reply::Summaries(summaries) => Ok(summaries),
            Reply::Fail(err) => Err(err),
            other => panic!("expected summaries, got {other:?}"),
        }
    }
}

type Frame = Result<Vec<ServerEvent>, TransportError>;

#[derive(Default)]
struct Wire {
    sent: RefCell<Vec<ClientEvent>>,
    closed: Cell<bool>,
    handshake_tokens: RefCell<Vec<String>>,
}

/// Server side of an in-memory connection.
pub struct FakeServer {
    tx: RefCell<Option<async_channel::Sender<Frame>>>,
    wire: Rc<Wire>,
}

impl FakeServer {
    pub fn push(&self, events: Vec<ServerEvent>) {
        self.send_frame(Ok(events));
    }

    pub fn push_error(&self, err: TransportError) {
        self.send_frame(Err(err));
    }

    /// Drop the server end; the client sees the stream end.
    pub fn hang_up(&self) {
        self.tx.borrow_mut().take();
    }

    pub fn sent(&self) -> Vec<ClientEvent> {
        self.wire.sent.borrow().clone()
    }

    pub fn client_closed(&self) -> bool {
        self.wire.closed.get()
    }

    pub fn handshake_tokens(&self) -> Vec<String> {
        self.wire.handshake_tokens.borrow().clone()
    }

    fn send_frame(&self, frame: Frame) {
        let tx = self.tx.borrow();
        let tx = tx.as_ref().expect("server already hung up");
        tx.try_send(frame).expect("fake wire is unbounded");
    }
}

/// Transport handing out a single in-memory connection.
pub struct FakeTransport {
    rx: RefCell<Option<async_channel::Receiver<Frame>>>,
    wire: Rc<Wire>,
    refuse: bool,
}

impl FakeTransport {
    pub fn new() -> (Self, FakeServer) {
        let (tx, rx) = async_channel::unbounded();
        let wire = Rc::new(Wire::default());
        (
            Self {
                rx: RefCell::new(Some(rx)),
                wire: Rc::clone(&wire),
                refuse: false,
            },
            FakeServer {
                tx: RefCell::new(Some(tx)),
                wire,
            },
        )
    }

    pub fn refusing() -> Self {
        let (mut transport, _server) = Self::new();
        transport.refuse = true;
        transport
    }
}

struct FakeSink(Rc<Wire>);

#[async_trait(?Send)]
impl EventSink for FakeSink {
    async fn send(&mut self, event: &ClientEvent) -> Result<(), TransportError> {
        if self.0.closed.get() {
            return Err(TransportError::Closed);
        }
        self.0.sent.borrow_mut().push(event.clone());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.0.closed.set(true);
        Ok(())
    }
}

struct FakeSource(async_channel::Receiver<Frame>);

#[async_trait(?Send)]
impl EventSource for FakeSource {
    async fn recv(&mut self) -> Option<Result<Vec<ServerEvent>, TransportError>> {
        self.0.recv().await.ok()
    }
}

#[async_trait(?Send)]
impl RealtimeTransport for FakeTransport {
    fn name(&self) -> &'static str {
        "Fake"
    }

    async fn connect(&self, session: &Session) -> Result<RealtimeConnection, TransportError> {
        if self.refuse {
            return Err(TransportError::Connect("connection refused".into()));
        }
        self.wire.handshake_tokens.borrow_mut().push(session.token.bearer());
        let rx = self
            .rx
            .borrow_mut()
            .take()
            .ok_or_else(|| TransportError::Connect("fake transport already used".into()))?;
        Ok(RealtimeConnection::new(FakeSink(Rc::clone(&self.wire)), FakeSource(rx)))
    }
}
