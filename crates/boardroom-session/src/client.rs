//! WebSocket protocol client.
//!
//! Maintains exactly one logical connection to the backend. The controller
//! drives it over a command channel (`Connect` with an optional delay,
//! `Shutdown`), pushes outbound control/audio frames over a second channel,
//! and receives connection lifecycle plus parsed inbound messages back through
//! the shared session event queue.
//!
//! Every connection attempt fetches a fresh credential from the
//! `CredentialSource` collaborator and appends it to the handshake URL, since
//! tokens may have expired between reconnects.

use crate::auth::CredentialSource;
use crate::event::{NetEvent, SessionEvent};
use crate::protocol::{ClientMessage, ServerMessage};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Directives from the controller.
#[derive(Debug)]
pub enum ClientCommand {
    /// Dial the backend after `delay` (zero for an immediate attempt).
    Connect { delay: Duration },
    Shutdown,
}

/// One outbound wire frame.
#[derive(Debug)]
pub enum OutboundFrame {
    Control(ClientMessage),
    /// Encoded utterance audio; ownership of the bytes ends here.
    Audio(Vec<u8>),
}

/// Owns the connection to the remote boardroom.
pub struct ProtocolClient {
    url: String,
    credentials: Arc<dyn CredentialSource>,
    commands: mpsc::UnboundedReceiver<ClientCommand>,
    outbound: mpsc::UnboundedReceiver<OutboundFrame>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl ProtocolClient {
    pub fn new(
        url: String,
        credentials: Arc<dyn CredentialSource>,
        commands: mpsc::UnboundedReceiver<ClientCommand>,
        outbound: mpsc::UnboundedReceiver<OutboundFrame>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            url,
            credentials,
            commands,
            outbound,
            events,
        }
    }

    /// Run until `Shutdown` or until the controller goes away.
    pub async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                ClientCommand::Shutdown => break,
                ClientCommand::Connect { delay } => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    self.connect_once().await;
                }
            }
        }
        debug!("protocol client stopped");
    }

    fn emit(&self, event: NetEvent) {
        let _ = self.events.send(SessionEvent::Net(event));
    }

    async fn connect_once(&mut self) {
        let token = match self.credentials.fresh_token().await {
            Ok(t) => t,
            Err(e) => {
                self.emit(NetEvent::AuthFailed(e.to_string()));
                return;
            }
        };
        let url = format!("{}?token={}", self.url, token);

        info!(url = %self.url, "connecting to backend");
        let ws = match connect_async(url.as_str()).await {
            Ok((stream, _response)) => stream,
            Err(e) => {
                warn!("connection failed: {e}");
                self.emit(NetEvent::Closed {
                    error: Some(e.to_string()),
                });
                return;
            }
        };
        info!("connected");
        self.emit(NetEvent::Opened);

        let (mut sink, mut stream) = ws.split();
        loop {
            tokio::select! {
                frame = self.outbound.recv() => {
                    let frame = match frame {
                        Some(f) => f,
                        // controller gone: close and stop
                        None => {
                            let _ = sink.close().await;
                            return;
                        }
                    };
                    let message = match frame {
                        OutboundFrame::Control(msg) => {
                            match serde_json::to_string(&msg) {
                                Ok(json) => Message::Text(json.into()),
                                Err(e) => {
                                    warn!("unserializable control message dropped: {e}");
                                    continue;
                                }
                            }
                        }
                        OutboundFrame::Audio(bytes) => Message::Binary(bytes.into()),
                    };
                    if let Err(e) = sink.send(message).await {
                        warn!("send failed: {e}");
                        break;
                    }
                }
                inbound = stream.next() => {
                    match inbound {
                        Some(Ok(Message::Text(text))) => self.dispatch(&text),
                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "server closed the connection");
                            break;
                        }
                        // pings are answered by the stream itself
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("websocket error: {e}");
                            break;
                        }
                        None => break,
                    }
                }
            }
        }

        self.emit(NetEvent::Closed { error: None });
    }

    /// Parse one inbound text frame and hand it to the controller. Unknown or
    /// malformed messages are logged and dropped.
    fn dispatch(&self, text: &str) {
        match serde_json::from_str::<ServerMessage>(text) {
            Ok(ServerMessage::Unknown) => {
                debug!("unrecognized message type ignored");
            }
            Ok(message) => self.emit(NetEvent::Inbound(message)),
            Err(e) => {
                debug!("malformed message ignored: {e}");
            }
        }
    }
}
