//! Network infrastructure for the agent.
//!
//! # Sub-modules
//!
//! - **`health`** – TCP liveness probe against the peer's listener.
//! - **`command_channel`** – Client side of the one-shot command exchange.
//! - **`listener`** – Server side: accepts peer commands and hands them to
//!   `CommandHandler`.
//! - **`discovery`** – mDNS advertisement and browsing for peer hosts.

pub mod command_channel;
pub mod discovery;
pub mod health;
pub mod listener;

use periswitch_core::protocol::MAX_FRAME_SIZE;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Reads until EOF, stopping one byte past the frame limit so oversized
/// frames are rejected by the decoder instead of buffered whole.
pub(crate) async fn read_frame_bytes<R>(reader: &mut R) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    reader
        .take(MAX_FRAME_SIZE as u64 + 1)
        .read_to_end(&mut buf)
        .await?;
    Ok(buf)
}
