//! Connection manager: one persistent, message-oriented websocket per
//! authenticated identity. Inbound frames are parsed and forwarded into the
//! session's single input queue; outbound commands are serialized by a writer
//! task that owns the sink. There is no automatic reconnection — a closed
//! connection stays closed until the user authenticates again, which creates
//! a new connection.

use futures::{SinkExt, StreamExt};
use shared::protocol::{ClientCommand, ServerEvent};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use crate::{error::ClientError, session::SessionInput};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connected,
    Error,
}

pub struct Connection {
    outbound_tx: mpsc::UnboundedSender<ClientCommand>,
    status_tx: watch::Sender<ConnectionStatus>,
    status_rx: watch::Receiver<ConnectionStatus>,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl Connection {
    /// Opens the per-identity game socket at `<ws-url>/ws/<username>` and
    /// spawns the reader/writer tasks. Parsed server events are pushed into
    /// `inbound` in arrival order.
    pub async fn open(
        server_url: &str,
        username: &str,
        inbound: mpsc::UnboundedSender<SessionInput>,
    ) -> Result<Self, ClientError> {
        let ws_url = if let Some(rest) = server_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = server_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            return Err(ClientError::InvalidServerUrl(server_url.to_string()));
        };
        let ws_url = format!("{}/ws/{username}", ws_url.trim_end_matches('/'));

        let (ws_stream, _) = connect_async(&ws_url).await?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connected);
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ClientCommand>();

        let reader_status = status_tx.clone();
        let reader_task = tokio::spawn(async move {
            while let Some(frame) = ws_reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            if inbound.send(SessionInput::Server(event)).is_err() {
                                break;
                            }
                        }
                        // Malformed payloads are dropped without tearing the
                        // session down.
                        Err(err) => {
                            warn!(error = %err, "dropping malformed server payload");
                        }
                    },
                    Ok(Message::Close(_)) => {
                        reader_status.send_replace(ConnectionStatus::Disconnected);
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "websocket receive failed");
                        reader_status.send_replace(ConnectionStatus::Error);
                        break;
                    }
                }
            }
            if *reader_status.borrow() == ConnectionStatus::Connected {
                reader_status.send_replace(ConnectionStatus::Disconnected);
            }
        });

        let writer_status = status_tx.clone();
        let writer_task = tokio::spawn(async move {
            while let Some(command) = outbound_rx.recv().await {
                let text = match serde_json::to_string(&command) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(error = %err, "failed to encode outbound command");
                        continue;
                    }
                };
                if let Err(err) = ws_writer.send(Message::Text(text)).await {
                    warn!(error = %err, "websocket send failed");
                    writer_status.send_replace(ConnectionStatus::Error);
                    break;
                }
            }
        });

        Ok(Self {
            outbound_tx,
            status_tx,
            status_rx,
            reader_task,
            writer_task,
        })
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Hands a command to the writer task. Dropped with a warning when the
    /// connection is not currently open; outbound messages are never queued
    /// for a later reconnect.
    pub fn send(&self, command: ClientCommand) {
        if self.status() != ConnectionStatus::Connected {
            warn!(?command, "dropping outbound command while disconnected");
            return;
        }
        if self.outbound_tx.send(command).is_err() {
            debug!("writer task already gone, outbound command dropped");
        }
    }

    /// Tears the socket tasks down. Terminal: a new connection requires a
    /// fresh authentication.
    pub fn close(&self) {
        self.reader_task.abort();
        self.writer_task.abort();
        if *self.status_tx.borrow() == ConnectionStatus::Connected {
            self.status_tx.send_replace(ConnectionStatus::Disconnected);
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}
