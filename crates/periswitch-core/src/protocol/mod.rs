//! Protocol module containing the command vocabulary and the frame codec.

pub mod codec;
pub mod command;

pub use codec::{decode_frame, encode_frame, Frame, NotificationPayload, ProtocolError, MAX_FRAME_SIZE};
pub use command::{Command, UnknownCommand};
