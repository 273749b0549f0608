//! Streaming operations.
//! 流式操作。

use super::model::{StreamingModel, deserialization_error, serialization_error, validation_error};
use crate::{
    core::{ClientConnection, EventListener, Operation, OperationEnded},
    error::{Result, RpcError},
    transport::TransportConnection,
};
use tokio::sync::broadcast;

/// A typed streaming operation. After the initial request/response exchange
/// the stream stays open for typed messages in both directions until either
/// side ends it.
///
/// 有类型的流式操作。初始请求/响应交换之后，流保持打开，
/// 可以双向传输有类型的消息，直到任一方结束它。
pub struct StreamingOperation<M: StreamingModel, C: TransportConnection> {
    model: M,
    operation: Operation<C>,
}

impl<M: StreamingModel, C: TransportConnection> StreamingOperation<M, C> {
    pub fn new(connection: &ClientConnection<C>, model: M) -> Result<Self> {
        let operation = Operation::new(connection, model.operation_name())?;
        Ok(Self { model, operation })
    }

    pub fn operation(&self) -> &Operation<C> {
        &self.operation
    }

    pub fn ended(&self) -> EventListener<OperationEnded> {
        self.operation.ended()
    }

    pub fn errors(&self) -> broadcast::Receiver<RpcError> {
        self.operation.errors()
    }

    /// Sends `request` and waits for the initial response. On failure the
    /// operation is closed.
    ///
    /// 发送 `request` 并等待初始响应。失败时关闭操作。
    pub async fn activate(&self, request: &M::Request) -> Result<M::Response> {
        let result = self.open(request).await;
        if result.is_err() {
            self.operation.close().await;
        }
        result
    }

    async fn open(&self, request: &M::Request) -> Result<M::Response> {
        self.model
            .validate_request(request)
            .map_err(|e| validation_error(e, "request validation failed"))?;
        let message = self
            .model
            .serialize_request(request)
            .map_err(|e| serialization_error(e, "request serialization failed"))?;

        self.operation.activate(message).await?;

        let response = self.operation.next_message().await.ok_or_else(|| {
            RpcError::network("the stream ended before the initial response was received")
        })?;
        self.model
            .deserialize_response(&response)
            .map_err(|e| deserialization_error(e, "response deserialization failed"))
    }

    /// Waits for the next stream message. `None` once the stream has ended.
    ///
    /// 等待下一条流消息。流结束后返回 `None`。
    pub async fn next_message(&self) -> Option<Result<M::Inbound>> {
        let message = self.operation.next_message().await?;
        Some(
            self.model
                .deserialize_inbound(&message)
                .map_err(|e| deserialization_error(e, "stream message deserialization failed")),
        )
    }

    pub async fn send_message(&self, message: &M::Outbound) -> Result<()> {
        self.model
            .validate_outbound(message)
            .map_err(|e| validation_error(e, "stream message validation failed"))?;
        let message = self
            .model
            .serialize_outbound(message)
            .map_err(|e| serialization_error(e, "stream message serialization failed"))?;
        self.operation.send_message(message).await
    }

    pub async fn close(&self) {
        self.operation.close().await;
    }
}
