//! Request/response operations.
//! 请求/响应操作。

use super::model::{RequestResponseModel, deserialization_error, serialization_error, validation_error};
use crate::{
    core::{ClientConnection, Operation},
    error::{Result, RpcError},
    transport::TransportConnection,
};
use tracing::debug;

/// A one-shot typed exchange: one request, one response, then the operation
/// is closed.
///
/// 一次性的有类型交换：一个请求，一个响应，然后关闭操作。
pub struct RequestResponseOperation<M: RequestResponseModel, C: TransportConnection> {
    model: M,
    operation: Operation<C>,
}

impl<M: RequestResponseModel, C: TransportConnection> RequestResponseOperation<M, C> {
    pub fn new(connection: &ClientConnection<C>, model: M) -> Result<Self> {
        let operation = Operation::new(connection, model.operation_name())?;
        Ok(Self { model, operation })
    }

    pub fn operation(&self) -> &Operation<C> {
        &self.operation
    }

    /// Sends `request` and waits for the response. The operation is closed
    /// afterwards whatever the outcome.
    ///
    /// 发送 `request` 并等待响应。无论结果如何，之后都会关闭操作。
    pub async fn activate(&self, request: &M::Request) -> Result<M::Response> {
        let result = self.exchange(request).await;
        self.operation.close().await;
        result
    }

    async fn exchange(&self, request: &M::Request) -> Result<M::Response> {
        self.model
            .validate_request(request)
            .map_err(|e| validation_error(e, "request validation failed"))?;
        let message = self
            .model
            .serialize_request(request)
            .map_err(|e| serialization_error(e, "request serialization failed"))?;

        self.operation.activate(message).await?;

        let response = self.operation.next_message().await.ok_or_else(|| {
            RpcError::network("the stream ended before a response was received")
        })?;
        debug!(
            operation_id = %self.operation.id(),
            message_type = %response.message_type,
            "Response received"
        );
        self.model
            .deserialize_response(&response)
            .map_err(|e| deserialization_error(e, "response deserialization failed"))
    }

    /// Closes the operation without sending a request.
    /// 不发送请求直接关闭操作。
    pub async fn close(&self) {
        self.operation.close().await;
    }
}
