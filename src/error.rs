use std::fmt;

/// Failure to produce a share token.
#[derive(Debug, PartialEq)]
pub enum ShareError {
    /// Nothing recorded and no loop layers; there is no state to share.
    NothingRecorded,
    /// The payload could not be serialized.
    Serialize(String),
}

/// Failure to decode a share token back into a payload.
///
/// Decoding never panics and never mutates existing state; callers fall
/// back to their current (or empty) state on any of these.
#[derive(Debug, PartialEq)]
pub enum DecodeError {
    /// The token is not valid base64 or not valid UTF-8 underneath.
    MalformedToken,
    /// The JSON structure does not match the payload schema.
    InvalidPayload(String),
    /// The payload carries a version tag this build does not understand.
    UnsupportedVersion(String),
}

/// Failure to export rendered audio.
#[derive(Debug, PartialEq)]
pub enum ExportError {
    /// None of the requested container formats has a compiled-in encoder.
    NoSupportedFormat,
    /// There is no audio to export.
    NothingToExport,
}

impl fmt::Display for ShareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShareError::NothingRecorded => {
                write!(f, "nothing recorded — record notes or a loop layer first")
            }
            ShareError::Serialize(msg) => write!(f, "could not serialize share payload: {msg}"),
        }
    }
}

impl std::error::Error for ShareError {}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::MalformedToken => write!(f, "share token is not valid base64"),
            DecodeError::InvalidPayload(msg) => write!(f, "share payload is corrupt: {msg}"),
            DecodeError::UnsupportedVersion(tag) => {
                write!(f, "unsupported share version '{tag}'")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::NoSupportedFormat => {
                write!(f, "no requested audio format has an available encoder")
            }
            ExportError::NothingToExport => write!(f, "nothing to export"),
        }
    }
}

impl std::error::Error for ExportError {}
