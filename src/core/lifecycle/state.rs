//! Defines the lifecycle states of the connection manager and of operations.
//!
//! 定义连接管理器和操作的生命周期状态。

/// The state of a client connection.
/// 客户端连接的状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// `connect()` has not been called yet.
    /// 尚未调用 `connect()`。
    None,
    /// The handshake is in flight.
    /// 握手进行中。
    Connecting,
    /// The handshake succeeded and operations may be created.
    /// 握手成功，可以创建操作。
    Connected,
    /// The handshake failed; a close is pending.
    /// 握手失败，等待关闭。
    Finished,
    /// All resources have been released. Terminal.
    /// 所有资源已释放。终态。
    Closed,
}

/// The state of an operation.
/// 操作的状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationState {
    /// `activate()` has not been called yet.
    /// 尚未调用 `activate()`。
    None,
    /// `activate()` has been called and the stream may carry messages.
    /// 已调用 `activate()`，流可以承载消息。
    Activated,
    /// The stream ended, or its activation failed.
    /// 流已结束，或其激活失败。
    Ended,
    /// The stream has been released. Terminal.
    /// 流已释放。终态。
    Closed,
}
