//! Operation models and the error classification applied to them.
//! 操作模型及其错误分类。

use crate::{
    error::{BoxError, RpcError, RpcErrorKind},
    protocol::Message,
};

/// Describes a request/response operation.
///
/// 描述一个请求/响应操作。
pub trait RequestResponseModel: Send + Sync + 'static {
    type Request: Send + Sync;
    type Response: Send;

    /// The operation name sent when the stream is activated.
    /// 激活流时发送的操作名称。
    fn operation_name(&self) -> &str;

    /// Checks a request before anything is sent.
    /// 在发送任何内容之前检查请求。
    fn validate_request(&self, _request: &Self::Request) -> Result<(), BoxError> {
        Ok(())
    }

    fn serialize_request(&self, request: &Self::Request) -> Result<Message, BoxError>;

    fn deserialize_response(&self, message: &Message) -> Result<Self::Response, BoxError>;
}

/// Describes a streaming operation: a request/response exchange followed by
/// any number of stream messages in both directions.
///
/// 描述一个流式操作：一次请求/响应交换，之后双向任意数量的流消息。
pub trait StreamingModel: RequestResponseModel {
    /// Server-to-client stream messages.
    /// 服务器到客户端的流消息。
    type Inbound: Send;
    /// Client-to-server stream messages.
    /// 客户端到服务器的流消息。
    type Outbound: Send + Sync;

    fn deserialize_inbound(&self, message: &Message) -> Result<Self::Inbound, BoxError>;

    fn validate_outbound(&self, _message: &Self::Outbound) -> Result<(), BoxError> {
        Ok(())
    }

    fn serialize_outbound(&self, message: &Self::Outbound) -> Result<Message, BoxError>;
}

pub(crate) fn validation_error(cause: BoxError, description: &str) -> RpcError {
    RpcError::classify(cause, RpcErrorKind::ValidationError, description)
}

pub(crate) fn serialization_error(cause: BoxError, description: &str) -> RpcError {
    RpcError::classify(cause, RpcErrorKind::SerializationError, description)
}

pub(crate) fn deserialization_error(cause: BoxError, description: &str) -> RpcError {
    RpcError::classify(cause, RpcErrorKind::DeserializationError, description)
}
