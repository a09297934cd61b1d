//! Server side of the peer command protocol.
//!
//! Binds the command port and serves each inbound connection on its own task:
//!
//! 1. Read the request until the client half-closes, a complete bare token has
//!    arrived, or the read timeout fires.  Bytes received before the timeout
//!    are kept, so a client that never half-closes (plain `nc`) still gets an
//!    answer.
//! 2. Zero bytes means a liveness probe; close without replying.
//! 3. Otherwise decode, dispatch to [`CommandHandler`], write the reply frame,
//!    and close.  Undecodable requests are answered with `OP_FAILED`.
//!
//! The accept loop stops when the shutdown `watch` flips to `true` (or its
//! sender is dropped).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use periswitch_core::protocol::MAX_FRAME_SIZE;
use periswitch_core::{decode_frame, encode_frame, Command, Frame};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::command_handler::CommandHandler;

/// How long a connection may take to deliver its request.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Error type for the command listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The TCP listener could not be bound.
    #[error("failed to bind command listener on {addr}: {source}")]
    BindFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

pub struct CommandListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    handler: Arc<CommandHandler>,
    read_timeout: Duration,
}

impl CommandListener {
    /// Binds `bind_address:port`.  Port `0` picks an ephemeral port; see
    /// [`CommandListener::local_port`].
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::BindFailed`] if the address cannot be bound.
    pub async fn bind(
        bind_address: &str,
        port: u16,
        handler: Arc<CommandHandler>,
    ) -> Result<Self, ListenerError> {
        let addr = if bind_address.contains(':') {
            format!("[{bind_address}]:{port}")
        } else {
            format!("{bind_address}:{port}")
        };
        let bind_err = |source| ListenerError::BindFailed {
            addr: addr.clone(),
            source,
        };
        let listener = TcpListener::bind(addr.as_str()).await.map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;
        info!(%local_addr, "command listener bound");

        Ok(Self {
            listener,
            local_addr,
            handler,
            read_timeout: DEFAULT_READ_TIMEOUT,
        })
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn local_port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Runs the accept loop on a new task.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Accepts connections until shutdown is signalled.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        let handler = Arc::clone(&self.handler);
                        let read_timeout = self.read_timeout;
                        tokio::spawn(serve_connection(stream, peer_addr, handler, read_timeout));
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
            }
        }
        info!(local_addr = %self.local_addr, "command listener stopped");
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<CommandHandler>,
    read_timeout: Duration,
) {
    let request = match read_request(&mut stream, read_timeout).await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(%peer_addr, error = %e, "read failed");
            return;
        }
    };

    if request.is_empty() {
        debug!(%peer_addr, "liveness probe");
        return;
    }

    let reply = match decode_frame(&request) {
        Ok(frame) => handler.handle(frame).await,
        Err(e) => {
            warn!(%peer_addr, error = %e, "undecodable request");
            Frame::bare(Command::OpFailed)
        }
    };

    let bytes = match encode_frame(&reply) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(%peer_addr, error = %e, "reply does not fit in a frame");
            Command::OpFailed.as_token().as_bytes().to_vec()
        }
    };
    if let Err(e) = stream.write_all(&bytes).await {
        debug!(%peer_addr, error = %e, "could not write reply");
        return;
    }
    let _ = stream.shutdown().await;
}

/// Reads one request.
///
/// Stops at EOF, as soon as the buffer holds a bare token that takes no
/// payload, one byte past [`MAX_FRAME_SIZE`], or when `read_timeout` expires.
/// Whatever arrived before the deadline is returned.
async fn read_request<R>(reader: &mut R, read_timeout: Duration) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let deadline = tokio::time::Instant::now() + read_timeout;
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    while buf.len() <= MAX_FRAME_SIZE && !is_complete_bare_token(&buf) {
        match tokio::time::timeout_at(deadline, reader.read(&mut chunk)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => buf.extend_from_slice(&chunk[..n]),
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                if !buf.is_empty() {
                    debug!(len = buf.len(), "read timeout; using the bytes received so far");
                }
                break;
            }
        }
    }
    Ok(buf)
}

/// `true` if `buf` is exactly one payload-less token, optionally followed by a
/// line terminator.
fn is_complete_bare_token(buf: &[u8]) -> bool {
    std::str::from_utf8(buf)
        .ok()
        .map(|text| text.trim_end_matches(['\r', '\n']))
        .and_then(|token| token.parse::<Command>().ok())
        .is_some_and(|command| !command.takes_payload())
}
