//! Transport port: a narrow, encoding-agnostic frame channel.
//! The core only depends on [`Transport`]; [`websocket`] is one concrete,
//! feature-gated binding over JSON + WebSocket.

use async_trait::async_trait;

/// A bidirectional, frame-oriented channel with one client. The reference
/// JSON encoding is what [`websocket::WebSocketTransport`]
/// speaks, but the core is encoding-agnostic: any `Transport` that can move
/// opaque text frames works.
#[async_trait]
pub trait Transport: Send {
    /// Sends one already-encoded frame. `Err` means the connection is dead.
    async fn send_text(&mut self, text: String) -> std::io::Result<()>;

    /// Waits for the next inbound frame. `None` signals the peer closed the
    /// connection; `Some(Err(_))` signals a transport-level read error.
    async fn recv_text(&mut self) -> Option<std::io::Result<String>>;

    /// Sends a transport-level liveness probe on inbound idleness. `Err`
    /// means the connection is dead. Transports with no native ping frame
    /// can leave this at its default no-op.
    async fn send_ping(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(feature = "websocket-transport")]
pub mod websocket;
