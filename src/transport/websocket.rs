//! Reference `Transport` binding over `tokio-tungstenite`, JSON-encoded
//! frames. Gated behind the `websocket-transport` feature so
//! consumers that bring their own transport don't pay for this dependency.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{info, warn};

use super::Transport;
use crate::config::Config;
use crate::protocol::validate_json;
use crate::room::RoomManager;
use crate::session::Session;

/// A `Transport` over a plain-TCP WebSocket. TLS termination, if needed, is
/// expected to happen in front of this (load balancer, reverse proxy); this
/// crate only speaks plain WebSocket frames.
pub struct WebSocketTransport {
    socket: WebSocketStream<TcpStream>,
}

impl WebSocketTransport {
    pub fn new(socket: WebSocketStream<TcpStream>) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send_text(&mut self, text: String) -> std::io::Result<()> {
        self.socket
            .send(Message::Text(text))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::BrokenPipe, e))
    }

    async fn recv_text(&mut self) -> Option<std::io::Result<String>> {
        loop {
            match self.socket.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => {
                    return Some(String::from_utf8(bytes).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e)));
                }
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue, // ping/pong/frame: tungstenite answers inbound pings itself
                Err(e) => return Some(Err(std::io::Error::new(std::io::ErrorKind::Other, e))),
            }
        }
    }

    async fn send_ping(&mut self) -> std::io::Result<()> {
        self.socket
            .send(Message::Ping(Vec::new()))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::BrokenPipe, e))
    }
}

/// Binds a listener and hands every accepted connection to
/// [`serve_connection`] on its own task. Runs until the listener errors.
pub async fn serve(addr: &str, rooms: Arc<RoomManager>, config: Arc<Config>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "websocket transport listening");
    loop {
        let (stream, peer) = listener.accept().await?;
        let rooms = rooms.clone();
        let config = config.clone();
        tokio::spawn(async move {
            match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => {
                    let client_id = uuid::Uuid::new_v4().to_string();
                    serve_connection(WebSocketTransport::new(ws), client_id, rooms, config).await;
                }
                Err(e) => warn!(%peer, error = %e, "websocket handshake failed"),
            }
        });
    }
}

/// Drives one connection end to end: decode -> validate -> `Session::handle`
/// -> encode, while a second future drains the session's outbound queue
/// (populated directly by the `RoomManager` for ACKs/broadcasts). Pings the
/// client after `idle_timeout` of inbound silence; closes after a second
/// ping goes unanswered by any frame. Also watches for the Room Manager
/// evicting this session on its own (e.g. a full outbound queue) and tears
/// the connection down the moment that happens, rather than leaving the loop
/// running unaware the session is no longer registered.
pub async fn serve_connection(mut transport: impl Transport, client_id: String, rooms: Arc<RoomManager>, config: Arc<Config>) {
    let (mut session, mut outbound) = Session::new(client_id, config.send_queue_cap);
    let mut missed_pings = 0u32;

    loop {
        tokio::select! {
            inbound = transport.recv_text() => {
                match inbound {
                    None => break,
                    Some(Err(e)) => {
                        warn!(error = %e, "transport read error");
                        break;
                    }
                    Some(Ok(text)) => {
                        missed_pings = 0;
                        let now_ts = chrono::Utc::now().timestamp_millis();
                        let reply = match validate_json(&text, &config) {
                            Ok(frame) => session.handle(frame, &rooms, now_ts).await,
                            Err(e) => Some(crate::protocol::ServerFrame::error(
                                crate::error::ErrorCode::ValidationError,
                                e.message,
                                None,
                                Some(session.client_id().to_string()),
                                now_ts,
                            )),
                        };
                        if let Some(frame) = reply {
                            if send_frame(&mut transport, &frame).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
            pushed = outbound.recv() => {
                match pushed {
                    Some(frame) => {
                        if send_frame(&mut transport, &frame).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = tokio::time::sleep(config.idle_timeout) => {
                if transport.send_ping().await.is_err() {
                    break;
                }
                missed_pings += 1;
                if missed_pings >= 2 {
                    break;
                }
            }
            _ = session.wait_evicted() => {
                warn!("session evicted by room manager, closing connection");
                break;
            }
        }
    }

    session.close(&rooms);
}

async fn send_frame(transport: &mut impl Transport, frame: &crate::protocol::ServerFrame) -> Result<(), ()> {
    let text = serde_json::to_string(frame).map_err(|_| ())?;
    transport.send_text(text).await.map_err(|_| ())
}
