//! Frame codec for the realtime push channel.

mod json;

pub use json::{decode_frame, encode_event, DecodedFrame};
