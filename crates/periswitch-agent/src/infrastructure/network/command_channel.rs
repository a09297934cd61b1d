//! Client side of the peer command protocol.
//!
//! Each exchange is a fresh TCP connection:
//!
//! ```text
//! connect ──► write frame ──► shutdown(write) ──► read reply to EOF ──► close
//! ```
//!
//! Half-closing the write side marks the end of the request, so a frame never
//! has to be split or length-prefixed.  Connecting and the rest of the
//! exchange each have their own bound.

use std::time::Duration;

use async_trait::async_trait;
use periswitch_core::{decode_frame, encode_frame, Command, Frame, PeerHost, Peripheral};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use super::read_frame_bytes;
use crate::application::handoff::{ChannelError, CommandTransport};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TcpCommandChannel {
    connect_timeout: Duration,
    reply_timeout: Duration,
}

impl Default for TcpCommandChannel {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT, DEFAULT_REPLY_TIMEOUT)
    }
}

impl TcpCommandChannel {
    pub fn new(connect_timeout: Duration, reply_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            reply_timeout,
        }
    }

    /// Runs one request/reply exchange with `peer`.
    ///
    /// # Errors
    ///
    /// [`ChannelError::Connect`] or [`ChannelError::Timeout`] if the peer
    /// cannot be reached in time, [`ChannelError::Io`] for socket failures, and
    /// [`ChannelError::Protocol`] if either frame is invalid.
    pub async fn exchange(&self, frame: &Frame, peer: &PeerHost) -> Result<Frame, ChannelError> {
        let endpoint = peer.endpoint();
        let request = encode_frame(frame)?;

        let mut stream =
            match tokio::time::timeout(self.connect_timeout, TcpStream::connect(endpoint.as_str()))
                .await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    return Err(ChannelError::Connect {
                        endpoint,
                        reason: e.to_string(),
                    })
                }
                Err(_) => return Err(ChannelError::Timeout { endpoint }),
            };

        let exchange = async {
            stream.write_all(&request).await?;
            stream.shutdown().await?;
            read_frame_bytes(&mut stream).await
        };
        let reply = match tokio::time::timeout(self.reply_timeout, exchange).await {
            Ok(bytes) => bytes?,
            Err(_) => return Err(ChannelError::Timeout { endpoint }),
        };

        let reply = decode_frame(&reply)?;
        debug!(%endpoint, request = %frame.command, reply = %reply.command, "exchange complete");
        Ok(reply)
    }

    /// Pushes this host's peripheral list to the peer, which replaces its own.
    ///
    /// # Errors
    ///
    /// Transport errors, or [`ChannelError::Rejected`] if the peer does not
    /// answer `OP_SUCCESS`.
    pub async fn push_peripherals(
        &self,
        peripherals: &[Peripheral],
        peer: &PeerHost,
    ) -> Result<(), ChannelError> {
        let reply = self
            .exchange(&Frame::peripheral_data(peripherals)?, peer)
            .await?;
        expect_success(reply)
    }

    /// Fetches the peer's peripheral list.
    ///
    /// # Errors
    ///
    /// Transport errors, or [`ChannelError::Rejected`] if the peer answers
    /// anything other than `PERIPHERAL_DATA`.
    pub async fn pull_peripherals(&self, peer: &PeerHost) -> Result<Vec<Peripheral>, ChannelError> {
        let reply = self
            .exchange(&Frame::bare(Command::SyncPeripherals), peer)
            .await?;
        if reply.command != Command::PeripheralData {
            return Err(ChannelError::Rejected(reply.command));
        }
        Ok(reply.peripherals()?)
    }

    /// Asks the peer to show a notification.
    ///
    /// # Errors
    ///
    /// Transport errors, or [`ChannelError::Rejected`] if the peer does not
    /// answer `OP_SUCCESS`.
    pub async fn notify(&self, title: &str, body: &str, peer: &PeerHost) -> Result<(), ChannelError> {
        let reply = self.exchange(&Frame::notification(title, body)?, peer).await?;
        expect_success(reply)
    }
}

fn expect_success(reply: Frame) -> Result<(), ChannelError> {
    match reply.command {
        Command::OpSuccess => Ok(()),
        other => Err(ChannelError::Rejected(other)),
    }
}

#[async_trait]
impl CommandTransport for TcpCommandChannel {
    async fn send(&self, command: Command, peer: &PeerHost) -> bool {
        match self.exchange(&Frame::bare(command), peer).await {
            Ok(reply) if reply.command == Command::OpSuccess => true,
            Ok(reply) => {
                warn!(%command, reply = %reply.command, peer = %peer.name, "peer refused command");
                false
            }
            Err(e) => {
                warn!(%command, peer = %peer.name, error = %e, "command exchange failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Accepts one connection, records the request, answers `reply`.
    async fn one_shot_peer(reply: &'static [u8]) -> (PeerHost, JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let task = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            socket.read_to_end(&mut request).await.unwrap();
            socket.write_all(reply).await.unwrap();
            socket.shutdown().await.unwrap();
            request
        });
        (PeerHost::new("desk", "desk", "127.0.0.1", port), task)
    }

    #[tokio::test]
    async fn test_send_writes_bare_token_and_reads_success() {
        // Arrange
        let (peer, server) = one_shot_peer(b"OP_SUCCESS").await;

        // Act
        let ok = TcpCommandChannel::default().send(Command::ConnectAll, &peer).await;

        // Assert
        assert!(ok);
        assert_eq!(server.await.unwrap(), b"CONNECT_ALL".to_vec());
    }

    #[tokio::test]
    async fn test_send_maps_op_failed_to_false() {
        let (peer, _server) = one_shot_peer(b"OP_FAILED").await;
        assert!(!TcpCommandChannel::default().send(Command::UnregisterAll, &peer).await);
    }

    #[tokio::test]
    async fn test_send_to_unreachable_peer_is_false() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let peer = PeerHost::new("desk", "desk", "127.0.0.1", port);

        assert!(!TcpCommandChannel::default().send(Command::HealthCheck, &peer).await);
    }

    #[tokio::test]
    async fn test_silent_peer_hits_reply_timeout() {
        // Arrange: accepts but never answers.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });
        let peer = PeerHost::new("desk", "desk", "127.0.0.1", port);
        let channel = TcpCommandChannel::new(DEFAULT_CONNECT_TIMEOUT, Duration::from_millis(200));

        // Act
        let result = channel.exchange(&Frame::bare(Command::HealthCheck), &peer).await;

        // Assert
        assert!(matches!(result, Err(ChannelError::Timeout { .. })), "got {result:?}");
    }

    #[tokio::test]
    async fn test_pull_peripherals_decodes_payload() {
        let (peer, server) =
            one_shot_peer(b"PERIPHERAL_DATA\n[{\"id\":\"kb\",\"name\":\"Keyboard\"}]").await;

        let list = TcpCommandChannel::default().pull_peripherals(&peer).await.unwrap();

        assert_eq!(list, vec![Peripheral::new("kb", "Keyboard")]);
        assert_eq!(server.await.unwrap(), b"SYNC_PERIPHERALS".to_vec());
    }

    #[tokio::test]
    async fn test_push_peripherals_rejected_by_peer() {
        let (peer, _server) = one_shot_peer(b"OP_FAILED").await;

        let result = TcpCommandChannel::default()
            .push_peripherals(&[Peripheral::new("kb", "Keyboard")], &peer)
            .await;

        assert!(matches!(result, Err(ChannelError::Rejected(Command::OpFailed))));
    }

    #[tokio::test]
    async fn test_garbage_reply_is_protocol_error() {
        let (peer, _server) = one_shot_peer(b"WHATEVER").await;

        let result = TcpCommandChannel::default()
            .exchange(&Frame::bare(Command::HealthCheck), &peer)
            .await;

        assert!(matches!(result, Err(ChannelError::Protocol(_))));
    }
}
