//! Plain-text codec for PeriSwitch command frames.
//!
//! Wire format:
//! ```text
//! TOKEN                 bare command (the common case)
//! TOKEN "\n" PAYLOAD    command with a UTF-8 payload
//! ```
//! One frame is the entire content of one TCP exchange direction; there is no
//! length prefix because the writer shuts down its half of the connection
//! after the frame.  Frames larger than [`MAX_FRAME_SIZE`] are rejected.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::peripheral::Peripheral;
use crate::protocol::command::Command;

/// Upper bound for a single encoded frame, header token included.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Separator between the token and an optional payload.
const PAYLOAD_SEPARATOR: char = '\n';

/// Errors that can occur while encoding or decoding a frame.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// Nothing was received.
    #[error("empty frame")]
    Empty,

    /// The bytes are not valid UTF-8.
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,

    /// The token is not part of the command vocabulary.
    #[error("unknown command token: {0:?}")]
    UnknownCommand(String),

    /// The frame exceeds [`MAX_FRAME_SIZE`].
    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },

    /// The command requires a payload that is missing.
    #[error("{0} frame carries no payload")]
    MissingPayload(Command),

    /// The payload could not be parsed.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// One decoded request or reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub payload: Option<String>,
}

/// Payload of a `NOTIFICATION` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
}

impl Frame {
    /// A frame consisting of the token only.
    pub fn bare(command: Command) -> Self {
        Self {
            command,
            payload: None,
        }
    }

    /// A frame with a raw text payload.
    pub fn with_payload(command: Command, payload: impl Into<String>) -> Self {
        Self {
            command,
            payload: Some(payload.into()),
        }
    }

    /// Builds a `NOTIFICATION` frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedPayload`] if JSON encoding fails.
    pub fn notification(title: &str, body: &str) -> Result<Self, ProtocolError> {
        let payload = NotificationPayload {
            title: title.to_string(),
            body: body.to_string(),
        };
        let json = serde_json::to_string(&payload)
            .map_err(|e| ProtocolError::MalformedPayload(e.to_string()))?;
        Ok(Self::with_payload(Command::Notification, json))
    }

    /// Builds a `PERIPHERAL_DATA` frame carrying `peripherals`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedPayload`] if JSON encoding fails.
    pub fn peripheral_data(peripherals: &[Peripheral]) -> Result<Self, ProtocolError> {
        let json = serde_json::to_string(peripherals)
            .map_err(|e| ProtocolError::MalformedPayload(e.to_string()))?;
        Ok(Self::with_payload(Command::PeripheralData, json))
    }

    /// Parses the payload of a `NOTIFICATION` frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MissingPayload`] or
    /// [`ProtocolError::MalformedPayload`].
    pub fn notification_payload(&self) -> Result<NotificationPayload, ProtocolError> {
        self.json_payload()
    }

    /// Parses the payload of a `PERIPHERAL_DATA` frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MissingPayload`] or
    /// [`ProtocolError::MalformedPayload`].
    pub fn peripherals(&self) -> Result<Vec<Peripheral>, ProtocolError> {
        self.json_payload()
    }

    fn json_payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, ProtocolError> {
        let payload = self
            .payload
            .as_deref()
            .ok_or(ProtocolError::MissingPayload(self.command))?;
        serde_json::from_str(payload).map_err(|e| ProtocolError::MalformedPayload(e.to_string()))
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes `frame` into its wire bytes.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] if the result would exceed
/// [`MAX_FRAME_SIZE`].
///
/// # Examples
///
/// ```rust
/// use periswitch_core::protocol::{encode_frame, Command, Frame};
///
/// let bytes = encode_frame(&Frame::bare(Command::ConnectAll)).unwrap();
/// assert_eq!(bytes, b"CONNECT_ALL");
/// ```
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, ProtocolError> {
    let token = frame.command.as_token();
    let len = token.len() + frame.payload.as_ref().map_or(0, |p| p.len() + 1);
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut buf = Vec::with_capacity(len);
    buf.extend_from_slice(token.as_bytes());
    if let Some(payload) = &frame.payload {
        buf.push(PAYLOAD_SEPARATOR as u8);
        buf.extend_from_slice(payload.as_bytes());
    }
    Ok(buf)
}

/// Decodes one frame from `bytes`.
///
/// Trailing line terminators after a bare token are ignored so that a peer
/// typing into `nc` is understood.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the bytes are empty, oversized, not UTF-8, or
/// start with an unknown token.
///
/// # Examples
///
/// ```rust
/// use periswitch_core::protocol::{decode_frame, Command};
///
/// let frame = decode_frame(b"OP_SUCCESS").unwrap();
/// assert_eq!(frame.command, Command::OpSuccess);
/// assert!(frame.payload.is_none());
/// ```
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, ProtocolError> {
    if bytes.is_empty() {
        return Err(ProtocolError::Empty);
    }
    if bytes.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            len: bytes.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)?;
    let (token, payload) = match text.split_once(PAYLOAD_SEPARATOR) {
        Some((token, rest)) => {
            let rest = rest.trim_end_matches(['\r', '\n']);
            (token, (!rest.is_empty()).then(|| rest.to_string()))
        }
        None => (text, None),
    };

    let token = token.trim_end_matches('\r');
    if token.is_empty() {
        return Err(ProtocolError::Empty);
    }
    let command = token
        .parse::<Command>()
        .map_err(|e| ProtocolError::UnknownCommand(e.0))?;

    Ok(Frame { command, payload })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
