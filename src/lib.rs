#![deny(clippy::expect_used, clippy::unwrap_used)]

//! The root of the event-stream RPC client library.
//! 事件流RPC客户端库的根。
//!
//! A [`ClientConnection`] performs the connect/acknowledge handshake over a
//! [`TransportConnection`] and hands out [`Operation`]s, each bound to one
//! multiplexed stream. The [`operations`] module layers typed request/response
//! and streaming operations on top.
//!
//! [`ClientConnection`] 在 [`TransportConnection`] 之上执行连接/确认握手，
//! 并分配 [`Operation`]，每个操作绑定到一个多路复用流。
//! [`operations`] 模块在其之上提供有类型的请求/响应和流式操作。

pub mod config;
pub mod core;
pub mod error;
pub mod operations;
pub mod protocol;
pub mod transport;

pub use crate::config::ClientConnectionConfig;
pub use crate::core::{
    ClientConnection, ConnectionState, DisconnectReason, Disconnection, EventListener, Operation,
    OperationEnded, OperationId, OperationState,
};
pub use crate::error::{BoxError, Result, RpcError, RpcErrorKind, TransportError};
pub use crate::protocol::{Header, HeaderValue, Message, MessageFlags, MessageType};
pub use crate::transport::{
    ConnectionBuilder, StreamEnd, TransportConnection, TransportDisconnect, TransportStream,
};
