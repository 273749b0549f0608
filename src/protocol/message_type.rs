//! 定义协议的所有消息类型和消息标志。
//! Defines all message types and message flags of the protocol.

use std::fmt;
use std::ops::BitOr;

/// The type of a message.
/// 消息类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageType {
    /// (Stream) Application data, including requests, responses and stream events.
    /// (流) 应用数据，包括请求、响应和流事件。
    ApplicationMessage = 0,
    /// (Stream) A modeled service error.
    /// (流) 已建模的服务错误。
    ApplicationError = 1,
    /// (Connection) Keep-alive probe.
    /// (连接) 保活探测。
    Ping = 2,
    /// (Connection) Reply to a keep-alive probe.
    /// (连接) 保活探测的回复。
    PingResponse = 3,
    /// (Connection) Connection request sent by the client during the handshake.
    /// (连接) 握手期间客户端发送的连接请求。
    Connect = 4,
    /// (Connection) The server's answer to `Connect`.
    /// (连接) 服务器对 `Connect` 的应答。
    ConnectAck = 5,
    /// (Connection) The peer rejected a message as malformed.
    /// (连接) 对端认为某条消息格式错误。
    ProtocolError = 6,
    /// (Connection) The peer hit an internal failure.
    /// (连接) 对端发生内部故障。
    InternalError = 7,
}

impl MessageType {
    /// 从一个整数尝试转换成 `MessageType`。
    /// Tries to convert an integer into a `MessageType`.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(MessageType::ApplicationMessage),
            1 => Some(MessageType::ApplicationError),
            2 => Some(MessageType::Ping),
            3 => Some(MessageType::PingResponse),
            4 => Some(MessageType::Connect),
            5 => Some(MessageType::ConnectAck),
            6 => Some(MessageType::ProtocolError),
            7 => Some(MessageType::InternalError),
            _ => None,
        }
    }

    /// 检查消息是否属于连接级别（不属于任何流）。
    /// Checks if the message belongs to the connection rather than to a stream.
    pub fn is_connection_level(&self) -> bool {
        !matches!(
            self,
            MessageType::ApplicationMessage | MessageType::ApplicationError
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageType::ApplicationMessage => "APPLICATION_MESSAGE",
            MessageType::ApplicationError => "APPLICATION_ERROR",
            MessageType::Ping => "PING",
            MessageType::PingResponse => "PING_RESPONSE",
            MessageType::Connect => "CONNECT",
            MessageType::ConnectAck => "CONNECT_ACK",
            MessageType::ProtocolError => "PROTOCOL_ERROR",
            MessageType::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{}", s)
    }
}

/// Bit flags carried by a message.
/// 消息携带的位标志。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MessageFlags(u32);

impl MessageFlags {
    pub const NONE: MessageFlags = MessageFlags(0);
    /// Set on a `ConnectAck` when the server accepted the connection.
    /// 当服务器接受连接时在 `ConnectAck` 上设置。
    pub const CONNECTION_ACCEPTED: MessageFlags = MessageFlags(0x1);
    /// Set on the last message of a stream.
    /// 在流的最后一条消息上设置。
    pub const TERMINATE_STREAM: MessageFlags = MessageFlags(0x2);

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: MessageFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: MessageFlags) {
        self.0 |= other.0;
    }
}

impl BitOr for MessageFlags {
    type Output = MessageFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        MessageFlags(self.0 | rhs.0)
    }
}
