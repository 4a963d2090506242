//! HTTP transport and WebSocket upgrades

pub mod server;
pub mod upgrade;

pub use server::{error_response, handle, into_hyper, Server};
pub use upgrade::{upgrade_websocket, DeferredSocket, EchoSocketHandler, SocketHandler, WebSocket};
