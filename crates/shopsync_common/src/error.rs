use thiserror::Error;

/// Failures turning frames into events and back.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown event `{0}`")]
    UnknownEvent(String),

    #[error("frame carried no events")]
    EmptyFrame,

    #[error("frame of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },
}

/// Failures of the realtime transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("could not connect: {0}")]
    Connect(String),

    #[error("connection closed")]
    Closed,

    #[error("send failed: {0}")]
    Send(String),

    #[error("receive failed: {0}")]
    Receive(String),

    #[error(transparent)]
    Codec(#[from] CodecError),
}
