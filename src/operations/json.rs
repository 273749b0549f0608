//! JSON models for services whose messages carry `application/json` payloads.
//!
//! Every message is tagged with its service model type in the
//! `service-model-type` header. A response tagged with a different model
//! type is rejected, and an `ApplicationError` message is decoded into a
//! [`ServiceError`]. The returned error keeps the `DeserializationError` kind;
//! recover the service error with
//! [`RpcError::cause_as`](crate::error::RpcError::cause_as):
//!
//! ```ignore
//! if let Some(service_error) = err.cause_as::<ServiceError>() {
//!     println!("{}", service_error.model_type);
//! }
//! ```
//!
//! 用于以 `application/json` 为载荷的服务的JSON模型。
//!
//! 每条消息都在 `service-model-type` 消息头中标记其服务模型类型。
//! 模型类型不符的响应会被拒绝，`ApplicationError` 消息会被解码为 [`ServiceError`]。
//! 返回的错误仍为 `DeserializationError` 类别，可通过 `RpcError::cause_as` 取回服务错误。

use super::model::{RequestResponseModel, StreamingModel};
use crate::{
    error::BoxError,
    protocol::{Message, MessageType},
};
use serde::{Serialize, de::DeserializeOwned};
use std::marker::PhantomData;
use thiserror::Error;
use tracing::warn;

pub const SERVICE_MODEL_TYPE_HEADER: &str = "service-model-type";
pub const CONTENT_TYPE_HEADER: &str = ":content-type";
pub const CONTENT_TYPE_APPLICATION_JSON: &str = "application/json";

/// A modeled error returned by the service.
/// 服务返回的建模错误。
#[derive(Debug, Clone, PartialEq, Error)]
#[error("service error {model_type}: {}", .message.as_deref().unwrap_or("no message"))]
pub struct ServiceError {
    pub model_type: String,
    pub message: Option<String>,
    /// The full error document.
    /// 完整的错误文档。
    pub payload: serde_json::Value,
}

impl ServiceError {
    fn from_message(message: &Message) -> Self {
        let model_type = message
            .header_str(SERVICE_MODEL_TYPE_HEADER)
            .unwrap_or("unknown")
            .to_string();
        let payload = match serde_json::from_slice::<serde_json::Value>(&message.payload) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(model_type = %model_type, error = %err, "Unparseable service error payload");
                serde_json::Value::Null
            }
        };
        Self {
            model_type,
            message: payload
                .get("message")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string),
            payload,
        }
    }
}

/// Failures of the JSON codec itself.
/// JSON编解码器本身的失败。
#[derive(Debug, Error)]
pub enum JsonModelError {
    #[error("expected service model type {expected}, received {actual}")]
    UnexpectedModelType { expected: String, actual: String },

    #[error("unexpected message type {0}")]
    UnexpectedMessageType(MessageType),

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

fn encode<T: Serialize>(value: &T, model_type: &str) -> Result<Message, BoxError> {
    let payload = serde_json::to_vec(value).map_err(JsonModelError::from)?;
    Ok(Message::application(payload)
        .with_header(SERVICE_MODEL_TYPE_HEADER, model_type)
        .with_header(CONTENT_TYPE_HEADER, CONTENT_TYPE_APPLICATION_JSON))
}

fn decode<T: DeserializeOwned>(message: &Message, expected_model_type: &str) -> Result<T, BoxError> {
    match message.message_type {
        MessageType::ApplicationMessage => {}
        MessageType::ApplicationError => return Err(Box::new(ServiceError::from_message(message))),
        other => return Err(Box::new(JsonModelError::UnexpectedMessageType(other))),
    }

    if let Some(actual) = message.header_str(SERVICE_MODEL_TYPE_HEADER) {
        if actual != expected_model_type {
            return Err(Box::new(JsonModelError::UnexpectedModelType {
                expected: expected_model_type.to_string(),
                actual: actual.to_string(),
            }));
        }
    }

    // An empty payload stands for an empty document.
    // 空载荷表示空文档。
    let payload: &[u8] = if message.payload.is_empty() {
        b"{}"
    } else {
        &message.payload
    };
    Ok(serde_json::from_slice(payload).map_err(JsonModelError::from)?)
}

/// A request/response operation exchanging JSON documents.
///
/// 交换JSON文档的请求/响应操作。
#[derive(Debug, Clone)]
pub struct JsonRequestResponse<Req, Resp> {
    operation_name: String,
    request_model_type: String,
    response_model_type: String,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> JsonRequestResponse<Req, Resp> {
    pub fn new(
        operation_name: impl Into<String>,
        request_model_type: impl Into<String>,
        response_model_type: impl Into<String>,
    ) -> Self {
        Self {
            operation_name: operation_name.into(),
            request_model_type: request_model_type.into(),
            response_model_type: response_model_type.into(),
            _marker: PhantomData,
        }
    }
}

impl<Req, Resp> RequestResponseModel for JsonRequestResponse<Req, Resp>
where
    Req: Serialize + Send + Sync + 'static,
    Resp: DeserializeOwned + Send + 'static,
{
    type Request = Req;
    type Response = Resp;

    fn operation_name(&self) -> &str {
        &self.operation_name
    }

    fn serialize_request(&self, request: &Req) -> Result<Message, BoxError> {
        encode(request, &self.request_model_type)
    }

    fn deserialize_response(&self, message: &Message) -> Result<Resp, BoxError> {
        decode(message, &self.response_model_type)
    }
}

/// A streaming operation exchanging JSON documents.
///
/// 交换JSON文档的流式操作。
#[derive(Debug, Clone)]
pub struct JsonStreaming<Req, Resp, In, Out> {
    exchange: JsonRequestResponse<Req, Resp>,
    inbound_model_type: String,
    outbound_model_type: String,
    _marker: PhantomData<fn(Out) -> In>,
}

impl<Req, Resp, In, Out> JsonStreaming<Req, Resp, In, Out> {
    pub fn new(
        operation_name: impl Into<String>,
        request_model_type: impl Into<String>,
        response_model_type: impl Into<String>,
        inbound_model_type: impl Into<String>,
        outbound_model_type: impl Into<String>,
    ) -> Self {
        Self {
            exchange: JsonRequestResponse::new(
                operation_name,
                request_model_type,
                response_model_type,
            ),
            inbound_model_type: inbound_model_type.into(),
            outbound_model_type: outbound_model_type.into(),
            _marker: PhantomData,
        }
    }
}

impl<Req, Resp, In, Out> RequestResponseModel for JsonStreaming<Req, Resp, In, Out>
where
    Req: Serialize + Send + Sync + 'static,
    Resp: DeserializeOwned + Send + 'static,
    In: 'static,
    Out: 'static,
{
    type Request = Req;
    type Response = Resp;

    fn operation_name(&self) -> &str {
        self.exchange.operation_name()
    }

    fn serialize_request(&self, request: &Req) -> Result<Message, BoxError> {
        self.exchange.serialize_request(request)
    }

    fn deserialize_response(&self, message: &Message) -> Result<Resp, BoxError> {
        self.exchange.deserialize_response(message)
    }
}

impl<Req, Resp, In, Out> StreamingModel for JsonStreaming<Req, Resp, In, Out>
where
    Req: Serialize + Send + Sync + 'static,
    Resp: DeserializeOwned + Send + 'static,
    In: DeserializeOwned + Send + 'static,
    Out: Serialize + Send + Sync + 'static,
{
    type Inbound = In;
    type Outbound = Out;

    fn deserialize_inbound(&self, message: &Message) -> Result<In, BoxError> {
        decode(message, &self.inbound_model_type)
    }

    fn serialize_outbound(&self, message: &Out) -> Result<Message, BoxError> {
        encode(message, &self.outbound_model_type)
    }
}
