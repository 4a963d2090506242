//! WebSocket upgrade handshake and socket handlers

use crate::app::{Locals, Request, Response};
use crate::error::{TrellisError, TrellisResult};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use hyper::header::{
    HeaderMap, HeaderValue, CONNECTION, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY,
    SEC_WEBSOCKET_VERSION, UPGRADE,
};
use hyper::upgrade::{OnUpgrade, Upgraded};
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::debug;

/// A server-side WebSocket over an upgraded HTTP connection
pub type WebSocket = WebSocketStream<Upgraded>;

/// Handles accepted WebSocket connections
#[async_trait]
pub trait SocketHandler: Send + Sync {
    async fn handle(&self, socket: WebSocket, request: Request, locals: Locals);
}

/// Sends every text and binary message straight back
pub struct EchoSocketHandler;

#[async_trait]
impl SocketHandler for EchoSocketHandler {
    async fn handle(&self, mut socket: WebSocket, request: Request, _locals: Locals) {
        while let Some(message) = socket.next().await {
            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    debug!("WebSocket on {} closed: {}", request.path(), e);
                    return;
                }
            };

            match message {
                Message::Text(_) | Message::Binary(_) => {
                    if let Err(e) = socket.send(message).await {
                        debug!("WebSocket send on {} failed: {}", request.path(), e);
                        return;
                    }
                }
                Message::Close(_) => return,
                _ => {}
            }
        }
    }
}

/// Connection that becomes a WebSocket once the 101 response is written
pub struct DeferredSocket {
    on_upgrade: OnUpgrade,
}

impl DeferredSocket {
    /// Wait for the transport to hand over the connection
    pub async fn accept(self) -> TrellisResult<WebSocket> {
        let upgraded = self.on_upgrade.await?;
        Ok(WebSocketStream::from_raw_socket(upgraded, Role::Server, None).await)
    }
}

fn header_has_token(headers: &HeaderMap, name: hyper::header::HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|part| part.trim().eq_ignore_ascii_case(token))
}

/// Validate a WebSocket handshake and claim the connection.
///
/// Returns the socket to accept once the response has been sent, and the
/// sentinel response carrying the handshake headers.
pub fn upgrade_websocket(request: &Request) -> TrellisResult<(DeferredSocket, Response)> {
    let headers = &request.headers;
    let reject = |reason: &str| Err(TrellisError::UpgradeRejected(reason.to_string()));

    if !header_has_token(headers, UPGRADE, "websocket") {
        return reject("missing Upgrade: websocket header");
    }
    if !header_has_token(headers, CONNECTION, "upgrade") {
        return reject("missing Connection: upgrade header");
    }
    if headers.get(SEC_WEBSOCKET_VERSION).map(HeaderValue::as_bytes) != Some(b"13") {
        return reject("unsupported Sec-WebSocket-Version");
    }
    let Some(key) = headers.get(SEC_WEBSOCKET_KEY) else {
        return reject("missing Sec-WebSocket-Key header");
    };

    let accept = HeaderValue::from_str(&derive_accept_key(key.as_bytes()))
        .map_err(|e| TrellisError::Internal(format!("invalid accept key: {}", e)))?;

    let Some(on_upgrade) = request.take_upgrade() else {
        return reject("connection cannot be upgraded");
    };

    let mut response = Response::upgrade_sentinel();
    response
        .headers
        .insert(UPGRADE, HeaderValue::from_static("websocket"));
    response
        .headers
        .insert(CONNECTION, HeaderValue::from_static("Upgrade"));
    response.headers.insert(SEC_WEBSOCKET_ACCEPT, accept);

    Ok((DeferredSocket { on_upgrade }, response))
}
