//! Share codec — the whole machine state as a URL-safe token.
//!
//! The payload is plain JSON (schema below, camelCase on the wire) run
//! through unpadded URL-safe base64 so it can ride in a query-string
//! parameter untouched. Decoding is strict: bad base64, bad JSON, a
//! mismatched schema or an unknown version tag all come back as a
//! [`DecodeError`] and leave the caller's state alone.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, ShareError};
use crate::looper::{Layer, LayerId};
use crate::recorder::NoteEvent;

/// The payload format this build reads and writes.
pub const SHARE_VERSION: &str = "1.0";

/// A layer as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSnapshot {
    pub id: LayerId,
    pub notes: Vec<NoteEvent>,
    pub active: bool,
}

impl From<&Layer> for LayerSnapshot {
    fn from(layer: &Layer) -> Self {
        LayerSnapshot {
            id: layer.id,
            notes: layer.notes.clone(),
            active: layer.active,
        }
    }
}

impl From<LayerSnapshot> for Layer {
    fn from(snapshot: LayerSnapshot) -> Self {
        Layer {
            id: snapshot.id,
            notes: snapshot.notes,
            active: snapshot.active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareMetadata {
    /// Host-supplied creation time, epoch milliseconds.
    #[serde(rename = "createdAt")]
    pub created_at_ms: u64,
    #[serde(rename = "loopCycleMillis")]
    pub loop_cycle_ms: u64,
}

/// Everything a share token carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharePayload {
    pub version: String,
    #[serde(rename = "recordedNotes")]
    pub recorded_notes: Vec<NoteEvent>,
    #[serde(rename = "loopLayers")]
    pub loop_layers: Vec<LayerSnapshot>,
    pub metadata: ShareMetadata,
}

/// Serialize the current state into a share token.
///
/// Refuses with [`ShareError::NothingRecorded`] when there is no recording
/// and no layers; an empty link is never produced.
pub fn encode(
    recorded_notes: &[NoteEvent],
    layers: &[LayerSnapshot],
    created_at_ms: u64,
    loop_cycle_ms: u64,
) -> Result<String, ShareError> {
    if recorded_notes.is_empty() && layers.is_empty() {
        return Err(ShareError::NothingRecorded);
    }
    let payload = SharePayload {
        version: SHARE_VERSION.to_string(),
        recorded_notes: recorded_notes.to_vec(),
        loop_layers: layers.to_vec(),
        metadata: ShareMetadata {
            created_at_ms,
            loop_cycle_ms,
        },
    };
    let json = serde_json::to_string(&payload).map_err(|e| ShareError::Serialize(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json.as_bytes()))
}

/// Decode a share token back into its payload.
pub fn decode(token: &str) -> Result<SharePayload, DecodeError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token.trim())
        .map_err(|_| DecodeError::MalformedToken)?;
    let json = String::from_utf8(bytes).map_err(|_| DecodeError::MalformedToken)?;
    let payload: SharePayload =
        serde_json::from_str(&json).map_err(|e| DecodeError::InvalidPayload(e.to_string()))?;
    if payload.version != SHARE_VERSION {
        return Err(DecodeError::UnsupportedVersion(payload.version));
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Key;

    fn sample_state() -> (Vec<NoteEvent>, Vec<LayerSnapshot>) {
        let recorded = vec![NoteEvent {
            key: Key::F,
            offset_ms: 50,
        }];
        let layers = vec![LayerSnapshot {
            id: 0,
            notes: vec![NoteEvent {
                key: Key::Q,
                offset_ms: 0,
            }],
            active: true,
        }];
        (recorded, layers)
    }

    #[test]
    fn round_trip_preserves_everything() {
        let (recorded, layers) = sample_state();
        let token = encode(&recorded, &layers, 1_700_000_000_000, 4000).unwrap();
        let payload = decode(&token).unwrap();

        assert_eq!(payload.version, SHARE_VERSION);
        assert_eq!(payload.recorded_notes, recorded);
        assert_eq!(payload.loop_layers, layers);
        assert_eq!(payload.metadata.created_at_ms, 1_700_000_000_000);
        assert_eq!(payload.metadata.loop_cycle_ms, 4000);
    }

    #[test]
    fn token_is_url_safe() {
        let (recorded, layers) = sample_state();
        let token = encode(&recorded, &layers, 0, 4000).unwrap();
        assert!(
            token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "token must need no URI escaping: {token}"
        );
    }

    #[test]
    fn empty_state_is_refused() {
        assert_eq!(encode(&[], &[], 0, 4000), Err(ShareError::NothingRecorded));
    }

    #[test]
    fn layers_alone_are_enough_to_share() {
        let (_, layers) = sample_state();
        assert!(encode(&[], &layers, 0, 4000).is_ok());
    }

    #[test]
    fn garbage_token_is_malformed() {
        assert_eq!(decode("!!not base64!!"), Err(DecodeError::MalformedToken));
    }

    #[test]
    fn corrupted_payload_reports_invalid() {
        let json = r#"{"version":"1.0","recordedNotes":"oops"}"#;
        let token = URL_SAFE_NO_PAD.encode(json);
        assert!(matches!(
            decode(&token),
            Err(DecodeError::InvalidPayload(_))
        ));
    }

    #[test]
    fn truncated_token_fails_without_panicking() {
        let (recorded, layers) = sample_state();
        let token = encode(&recorded, &layers, 0, 4000).unwrap();
        let truncated = &token[..token.len() / 2];
        assert!(decode(truncated).is_err());
    }

    #[test]
    fn future_version_is_rejected_by_tag() {
        let json = r#"{"version":"2.0","recordedNotes":[],"loopLayers":[],"metadata":{"createdAt":0,"loopCycleMillis":4000}}"#;
        let token = URL_SAFE_NO_PAD.encode(json);
        assert_eq!(
            decode(&token),
            Err(DecodeError::UnsupportedVersion("2.0".to_string()))
        );
    }

    #[test]
    fn wire_field_names_are_camel_case() {
        let (recorded, layers) = sample_state();
        let token = encode(&recorded, &layers, 7, 4000).unwrap();
        let json = String::from_utf8(URL_SAFE_NO_PAD.decode(token).unwrap()).unwrap();
        for field in ["recordedNotes", "loopLayers", "offsetMillis", "createdAt"] {
            assert!(json.contains(field), "wire JSON should contain {field}: {json}");
        }
    }
}
