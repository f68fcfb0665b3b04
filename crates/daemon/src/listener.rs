// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for handling socket I/O.
//!
//! The listener accepts connections and spawns a task per client. Each
//! connection task reads framed requests in arrival order, forwards them
//! to the manager loop, and writes the reply back — one request at a
//! time, so replies are FIFO per client. Connection tasks never touch
//! the ledger.

use tokio::net::{unix::OwnedWriteHalf, UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::manager::Envelope;
use crate::protocol::{self, ProtocolError, Reply, Request};

/// Listener task for accepting socket connections.
pub(crate) struct Listener {
    socket: UnixListener,
    requests: mpsc::Sender<Envelope>,
    cancel: CancellationToken,
}

impl Listener {
    pub(crate) fn new(
        socket: UnixListener,
        requests: mpsc::Sender<Envelope>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            socket,
            requests,
            cancel,
        }
    }

    /// Accept connections until cancelled, spawning a task per client.
    pub(crate) async fn run(self) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,

                accepted = self.socket.accept() => match accepted {
                    Ok((stream, _)) => {
                        let requests = self.requests.clone();
                        tokio::spawn(async move {
                            match handle_connection(stream, requests).await {
                                Ok(()) => debug!("client disconnected"),
                                Err(e) => error!("connection error: {}", e),
                            }
                        });
                    }
                    Err(e) => error!("accept error: {}", e),
                },
            }
        }

        debug!("listener stopped");
    }
}

/// Serve one client: read request, forward, reply, repeat until EOF.
async fn handle_connection(
    stream: UnixStream,
    requests: mpsc::Sender<Envelope>,
) -> Result<(), ProtocolError> {
    let (mut reader, mut writer) = stream.into_split();

    loop {
        let bytes = match protocol::read_message(&mut reader).await {
            Ok(bytes) => bytes,
            Err(ProtocolError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e),
        };

        let reply = match protocol::decode::<Request>(&bytes) {
            Ok(request) => {
                debug!(request = ?request, "received request");
                let (reply_tx, reply_rx) = oneshot::channel();
                if requests
                    .send(Envelope { request, reply_tx })
                    .await
                    .is_err()
                {
                    // Manager stopped; drop the connection
                    return Ok(());
                }
                match reply_rx.await {
                    Ok(reply) => reply,
                    Err(_) => return Ok(()),
                }
            }
            Err(e) => {
                warn!(error = %e, "malformed request");
                Reply::Error {
                    message: format!("malformed request: {e}"),
                }
            }
        };

        write_reply(&mut writer, &reply).await?;
    }
}

async fn write_reply(writer: &mut OwnedWriteHalf, reply: &Reply) -> Result<(), ProtocolError> {
    let data = protocol::encode(reply)?;
    protocol::write_message(writer, &data).await
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
