//! 定义事件流消息。
//! Defines an event-stream message.

use super::{
    header::{Header, HeaderValue},
    message_type::{MessageFlags, MessageType},
};
use bytes::Bytes;

/// A single protocol message, either on the connection or on a stream.
///
/// 单个协议消息，位于连接上或流上。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub message_type: MessageType,
    pub flags: MessageFlags,
    pub headers: Vec<Header>,
    pub payload: Bytes,
}

impl Message {
    /// Creates an empty message of the given type.
    /// 创建给定类型的空消息。
    pub fn new(message_type: MessageType) -> Self {
        Self {
            message_type,
            flags: MessageFlags::NONE,
            headers: Vec::new(),
            payload: Bytes::new(),
        }
    }

    /// The handshake request. Transforms may add headers (for example a
    /// protocol version) or an authentication payload before it is sent.
    ///
    /// 握手请求。转换函数可以在发送前添加消息头（例如协议版本）或认证载荷。
    pub fn connect() -> Self {
        Self::new(MessageType::Connect)
    }

    /// The handshake response.
    /// 握手响应。
    pub fn connect_ack(accepted: bool) -> Self {
        let mut message = Self::new(MessageType::ConnectAck);
        if accepted {
            message.flags.insert(MessageFlags::CONNECTION_ACCEPTED);
        }
        message
    }

    /// The empty application message that gracefully terminates a stream.
    /// 优雅终止流的空应用消息。
    pub fn terminate_stream() -> Self {
        let mut message = Self::new(MessageType::ApplicationMessage);
        message.flags.insert(MessageFlags::TERMINATE_STREAM);
        message
    }

    pub fn application(payload: impl Into<Bytes>) -> Self {
        Self::new(MessageType::ApplicationMessage).with_payload(payload)
    }

    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_flags(mut self, flags: MessageFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Appends a header, replacing an existing header of the same name.
    /// 追加一个消息头，替换同名的已有消息头。
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        let header = Header::new(name, value);
        match self.headers.iter_mut().find(|h| h.name == header.name) {
            Some(existing) => existing.value = header.value,
            None => self.headers.push(header),
        }
        self
    }

    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers
            .iter()
            .find(|h| h.name == name)
            .map(|h| &h.value)
    }

    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.header(name).and_then(HeaderValue::as_str)
    }

    /// Whether this message is a connect acknowledgement that accepts the
    /// connection.
    ///
    /// 此消息是否为接受连接的握手确认。
    pub fn is_accepted_connect_ack(&self) -> bool {
        self.message_type == MessageType::ConnectAck
            && self.flags.contains(MessageFlags::CONNECTION_ACCEPTED)
    }

    pub fn is_terminate_stream(&self) -> bool {
        self.flags.contains(MessageFlags::TERMINATE_STREAM)
    }
}
