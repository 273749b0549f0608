//! Transport layer abstraction consumed by the client.
//!
//! This module describes the already-connected transport primitives the
//! client is layered on: a connection that carries protocol messages and
//! hands out multiplexed streams, and the streams themselves. Framing,
//! sockets and TLS live behind these traits.
//!
//! 客户端所使用的传输层抽象。
//!
//! 此模块描述客户端所依赖的传输原语：一个承载协议消息并分配多路复用流的连接，
//! 以及流本身。帧编码、套接字和TLS都隐藏在这些trait之后。

use crate::{config::TransportOptions, error::TransportError, protocol::Message};
use async_trait::async_trait;
use tokio::sync::watch;

/// Raised by a transport connection when it goes away.
/// 传输连接断开时发出。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportDisconnect {
    /// Zero when the disconnect carries no error.
    /// 断开不携带错误时为零。
    pub error_code: i32,
}

/// Raised by a transport stream when it has ended.
/// 传输流结束时发出。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamEnd {
    /// Zero when the stream ended cleanly.
    /// 流正常结束时为零。
    pub error_code: i32,
}

/// A transport connection to an event-stream RPC server.
///
/// 到事件流RPC服务器的传输连接。
#[async_trait]
pub trait TransportConnection: Send + Sync + 'static {
    /// The stream type handed out by [`TransportConnection::new_stream`].
    type Stream: TransportStream;

    /// Opens the underlying connection.
    /// 打开底层连接。
    async fn connect(&self) -> Result<(), TransportError>;

    /// Sends a connection-level protocol message.
    /// 发送一条连接级协议消息。
    async fn send_protocol_message(&self, message: Message) -> Result<(), TransportError>;

    /// Waits for the next connection-level protocol message.
    /// 等待下一条连接级协议消息。
    async fn next_protocol_message(&self) -> Result<Message, TransportError>;

    /// Allocates a new multiplexed stream.
    /// 分配一个新的多路复用流。
    fn new_stream(&self) -> Result<Self::Stream, TransportError>;

    /// Subscribes to the disconnect notification. The slot holds `Some` once
    /// the connection has gone away.
    ///
    /// 订阅断开通知。连接断开后槽位中为 `Some`。
    fn disconnections(&self) -> watch::Receiver<Option<TransportDisconnect>>;

    /// Releases the connection.
    /// 释放连接。
    fn close(&self);
}

/// A single multiplexed stream on a transport connection.
///
/// 传输连接上的单个多路复用流。
#[async_trait]
pub trait TransportStream: Send + Sync + 'static {
    /// Starts the stream by sending the first message for `operation`.
    /// 通过为 `operation` 发送第一条消息来启动流。
    async fn activate(&self, operation: &str, message: Message) -> Result<(), TransportError>;

    /// Sends a message on an active stream.
    /// 在活动流上发送消息。
    async fn send_message(&self, message: Message) -> Result<(), TransportError>;

    /// Waits for the next inbound message. `None` once the stream has ended.
    /// 等待下一条入站消息。流结束后返回 `None`。
    async fn next_message(&self) -> Option<Message>;

    /// Subscribes to the end-of-stream notification.
    /// 订阅流结束通知。
    fn ended(&self) -> watch::Receiver<Option<StreamEnd>>;

    /// Releases the stream.
    /// 释放流。
    fn close(&self);
}

/// Creates transport connections from configuration.
///
/// 根据配置创建传输连接。
pub trait ConnectionBuilder {
    type Connection: TransportConnection;

    fn build(&self, options: &TransportOptions) -> Result<Self::Connection, TransportError>;
}
