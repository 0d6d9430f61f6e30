use serde::Deserialize;
use serde_json::Value;

use crate::error::CodecError;
use crate::{ClientEvent, ServerEvent};

/// Events recovered from one text frame.
///
/// The server may batch several envelopes into a single frame as a JSON
/// array. Envelopes that cannot be decoded are reported in `skipped` and do
/// not prevent the rest of the batch from being delivered.
#[derive(Debug, Default)]
pub struct DecodedFrame {
    pub events: Vec<ServerEvent>,
    pub skipped: Vec<CodecError>,
}

#[derive(Deserialize)]
struct EnvelopeHeader {
    event: String,
}

/// Encode an outbound intent as a single envelope.
pub fn encode_event(event: &ClientEvent) -> Result<String, CodecError> {
    Ok(serde_json::to_string(event)?)
}

/// Decode a text frame holding one envelope or an array of envelopes.
pub fn decode_frame(frame: &str) -> Result<DecodedFrame, CodecError> {
    let value: Value = serde_json::from_str(frame)?;

    let envelopes = match value {
        Value::Array(envelopes) => envelopes,
        single => vec![single],
    };

    if envelopes.is_empty() {
        return Err(CodecError::EmptyFrame);
    }

    let mut decoded = DecodedFrame::default();
    for envelope in envelopes {
        match decode_envelope(envelope) {
            Ok(event) => decoded.events.push(event),
            Err(err) => decoded.skipped.push(err),
        }
    }

    // A frame where nothing at all could be read is treated as malformed.
    if decoded.events.is_empty() && decoded.skipped.len() == 1 {
        if let Some(err) = decoded.skipped.pop() {
            return Err(err);
        }
    }

    Ok(decoded)
}

fn decode_envelope(envelope: Value) -> Result<ServerEvent, CodecError> {
    let header = EnvelopeHeader::deserialize(&envelope)?;
    if !ServerEvent::NAMES.contains(&header.event.as_str()) {
        return Err(CodecError::UnknownEvent(header.event));
    }
    Ok(serde_json::from_value(envelope)?)
}
