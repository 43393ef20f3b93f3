//! Error types for the voice/presence stack

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Presence error: {0}")]
    Presence(#[from] PresenceError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio subsystem errors
///
/// These surface synchronously at the call that required the resource
/// (device open, stream start); they are never deferred into a stream.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("cpal error: {0}")]
    CpalError(String),
}

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Encoder initialization failed: {0}")]
    EncoderInit(String),

    #[error("Decoder initialization failed: {0}")]
    DecoderInit(String),

    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Decoding failed: {0}")]
    DecodingFailed(String),

    #[error("Invalid frame size: {0}")]
    InvalidFrameSize(usize),

    #[error("An encode/decode request is already outstanding")]
    Busy,

    #[error("Codec instance was closed")]
    Closed,
}

/// Transport boundary errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Broadcast not found: {0}")]
    NotFound(String),

    #[error("Track reset mid-stream")]
    Reset,

    #[error("Track closed")]
    Closed,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Announce stream ended")]
    AnnounceEnded,
}

impl TransportError {
    /// Transient errors are retried with backoff; the rest tear the
    /// subscription down immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Reset | TransportError::SendFailed(_))
    }
}

/// Presence protocol errors
#[derive(Error, Debug)]
pub enum PresenceError {
    #[error("Retry budget exhausted for {path} after {attempts} attempts")]
    RetriesExhausted { path: String, attempts: u32 },

    #[error("Session is shutting down")]
    SessionClosed,
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
