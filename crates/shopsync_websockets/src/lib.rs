//! A WebSocket [`RealtimeTransport`] for shopsync.
//!
//! Frames are text JSON envelopes (`{"event": ..., "data": ...}`), possibly
//! batched in an array. The session's bearer credential is attached to the
//! handshake request.
//!
//! ```rust,ignore
//! let transport = WebSocketTransport::parse("ws://localhost:3000/chat", WebSocketSettings::default())?;
//! let channel = RealtimeEventChannel::new(session, counters, remote, Box::new(transport), &settings);
//! ```

use async_trait::async_trait;
use async_tungstenite::WebSocketStream;
use async_tungstenite::async_std::{ConnectStream, connect_async_with_config};
use async_tungstenite::tungstenite::client::IntoClientRequest;
use async_tungstenite::tungstenite::handshake::client::Request;
use async_tungstenite::tungstenite::http::HeaderValue;
use async_tungstenite::tungstenite::http::header::AUTHORIZATION;
use async_tungstenite::tungstenite::protocol::WebSocketConfig;
use async_tungstenite::tungstenite::{Error as WsError, Message};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use shopsync_client::{EventSink, EventSource, RealtimeConnection, RealtimeTransport};
use shopsync_common::codec::{decode_frame, encode_event};
use shopsync_common::error::{CodecError, TransportError};
use shopsync_common::{ClientEvent, ServerEvent, Session};
use tracing::{debug, info, trace, warn};
use url::Url;

type Socket = WebSocketStream<ConnectStream>;

#[derive(Clone, Debug)]
#[allow(missing_copy_implementations)]
/// Settings to configure the websocket connection
pub struct WebSocketSettings {
    pub websocket_config: WebSocketConfig,
    /// Largest inbound frame accepted, in bytes (default: 1 MiB)
    ///
    /// Larger frames are skipped rather than decoded.
    pub max_message_size: usize,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            websocket_config: WebSocketConfig::default(),
            max_message_size: 1 << 20,
        }
    }
}

/// Opens push connections over WebSockets
#[derive(Clone, Debug)]
pub struct WebSocketTransport {
    url: Url,
    settings: WebSocketSettings,
}

impl WebSocketTransport {
    pub fn new(url: Url, settings: WebSocketSettings) -> Self {
        Self { url, settings }
    }

    pub fn parse(url: &str, settings: WebSocketSettings) -> Result<Self, TransportError> {
        let url = Url::parse(url).map_err(|err| TransportError::Connect(format!("Url Error: {}", err)))?;
        Ok(Self::new(url, settings))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait(?Send)]
impl RealtimeTransport for WebSocketTransport {
    fn name(&self) -> &'static str {
        "WebSocket"
    }

    async fn connect(&self, session: &Session) -> Result<RealtimeConnection, TransportError> {
        info!("Beginning connection to {} for {}", self.url, session.user_id);
        match self.url.scheme() {
            "ws" => {}
            "wss" => {
                return Err(TransportError::Connect(
                    "WSS connections need async-tungstenite built with a TLS feature".to_string(),
                ));
            }
            other => {
                return Err(TransportError::Connect(format!("unsupported scheme `{}`", other)));
            }
        }

        let request = handshake_request(&self.url, session)?;
        let (socket, response) = connect_async_with_config(request, Some(self.settings.websocket_config))
            .await
            .map_err(connect_error)?;
        debug!("Handshake answered with {}", response.status());
        info!("Connected!");

        let (sink, stream) = socket.split();
        Ok(RealtimeConnection::new(
            WebSocketSink { sink },
            WebSocketSource {
                stream,
                max_message_size: self.settings.max_message_size,
            },
        ))
    }
}

struct WebSocketSink {
    sink: SplitSink<Socket, Message>,
}

#[async_trait(?Send)]
impl EventSink for WebSocketSink {
    async fn send(&mut self, event: &ClientEvent) -> Result<(), TransportError> {
        let text = encode_event(event)?;
        trace!("Sending {} ({} bytes)", event.name(), text.len());
        self.sink.send(Message::text(text)).await.map_err(send_error)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        debug!("Closing websocket");
        match self.sink.close().await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(err) => Err(send_error(err)),
        }
    }
}

struct WebSocketSource {
    stream: SplitStream<Socket>,
    max_message_size: usize,
}

#[async_trait(?Send)]
impl EventSource for WebSocketSource {
    async fn recv(&mut self) -> Option<Result<Vec<ServerEvent>, TransportError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(err) => return receive_error(err).map(Err),
            };

            match read_message(message, self.max_message_size) {
                Inbound::Events(events) => return Some(Ok(events)),
                Inbound::Skip => continue,
                Inbound::Closed => return None,
                Inbound::Invalid(err) => return Some(Err(err.into())),
            }
        }
    }
}

#[derive(Debug)]
enum Inbound {
    Events(Vec<ServerEvent>),
    /// Control frames and frames whose envelopes were all unknown.
    Skip,
    Closed,
    Invalid(CodecError),
}

fn read_message(message: Message, limit: usize) -> Inbound {
    match message {
        Message::Text(text) => decode_text(text.as_str(), limit),
        Message::Binary(bytes) => {
            if bytes.len() > limit {
                return Inbound::Invalid(CodecError::TooLarge {
                    size: bytes.len(),
                    limit,
                });
            }
            decode_text(&String::from_utf8_lossy(&bytes), limit)
        }
        Message::Close(frame) => {
            info!("Server closed the connection: {:?}", frame);
            Inbound::Closed
        }
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Inbound::Skip,
    }
}

fn decode_text(text: &str, limit: usize) -> Inbound {
    if text.len() > limit {
        warn!("Received too large frame: {} > {}", text.len(), limit);
        return Inbound::Invalid(CodecError::TooLarge {
            size: text.len(),
            limit,
        });
    }

    match decode_frame(text) {
        Ok(decoded) => {
            for err in &decoded.skipped {
                debug!("Skipping envelope: {}", err);
            }
            if decoded.events.is_empty() {
                Inbound::Skip
            } else {
                Inbound::Events(decoded.events)
            }
        }
        Err(err) => Inbound::Invalid(err),
    }
}

fn handshake_request(url: &Url, session: &Session) -> Result<Request, TransportError> {
    let mut request = url.as_str().into_client_request().map_err(connect_error)?;
    let bearer = HeaderValue::from_str(&session.token.bearer())
        .map_err(|_| TransportError::Connect("credential is not a valid header value".to_string()))?;
    request.headers_mut().insert(AUTHORIZATION, bearer);
    Ok(request)
}

fn connect_error(error: WsError) -> TransportError {
    let reason = match error {
        WsError::Http(response) if response.status().as_u16() == 401 => {
            String::from("credential rejected by server")
        }
        WsError::Http(response) => format!("HTTP Error: {}", response.status()),
        WsError::HttpFormat(http_format) => format!("HTTP Format Error: {}", http_format),
        WsError::Url(url) => format!("Url Error: {}", url),
        WsError::Io(io_error) => format!("Io Error: {}", io_error),
        WsError::Protocol(proto) => format!("Protocol Error: {}", proto),
        other => other.to_string(),
    };
    TransportError::Connect(reason)
}

fn send_error(error: WsError) -> TransportError {
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
        WsError::Io(io_error) => TransportError::Send(format!("Io Error: {}", io_error)),
        WsError::WriteBufferFull(_) => TransportError::Send(String::from("Write Buffer Full")),
        other => TransportError::Send(other.to_string()),
    }
}

/// `None` for a regular close.
fn receive_error(error: WsError) -> Option<TransportError> {
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => None,
        WsError::Io(io_error) => Some(TransportError::Receive(format!("Io Error: {}", io_error))),
        WsError::Capacity(cap) => Some(TransportError::Receive(format!("Capacity Error: {}", cap))),
        WsError::Protocol(proto) => Some(TransportError::Receive(format!("Protocol Error: {}", proto))),
        other => Some(TransportError::Receive(other.to_string())),
    }
}
