use thiserror::Error;

use shopsync_common::error::TransportError;

use crate::realtime::ConnectionState;

/// Failures reported by a [`RemoteSyncClient`](crate::RemoteSyncClient).
///
/// The `Display` text is what ends up in a store's error field, so it is
/// written for people rather than for logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The request never got an answer (offline, DNS, timeout...).
    #[error("network error: {0}")]
    Network(String),

    /// The credential was rejected.
    #[error("your session has expired, please sign in again")]
    Unauthorized,

    /// The server answered with a non-success status.
    #[error("server responded with {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Body or reason phrase returned by the server
        message: String,
    },

    /// The response body did not have the expected shape.
    #[error("unexpected response from server: {0}")]
    Decode(String),
}

/// Errors that can occur when using the shopsync_client library.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The realtime channel has no live connection.
    #[error("not connected to the realtime server")]
    NotConnected,

    /// `activate` was called on a channel that is not disconnected.
    #[error("realtime channel is already active ({0:?})")]
    AlreadyActive(ConnectionState),

    /// A REST call failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The socket failed.
    #[error("realtime connection error: {0}")]
    Transport(#[from] TransportError),
}
