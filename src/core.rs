//! The session-layer core: the connection manager and its operations.
//! 会话层核心：连接管理器及其操作。

pub mod connection;
pub mod lifecycle;
pub mod notify;
pub mod operation;

pub use connection::{ClientConnection, DisconnectReason, Disconnection};
pub use lifecycle::{ConnectionState, OperationState};
pub use notify::EventListener;
pub use operation::{Operation, OperationEnded, OperationId};

#[cfg(test)]
pub mod test_utils;
