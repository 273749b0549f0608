//! Typed operations layered over the untyped [`Operation`](crate::core::Operation).
//!
//! A model describes one RPC operation: its name, and how to validate,
//! serialize and deserialize the domain values it exchanges. Failures raised
//! by a model are classified at the boundary: errors that already are
//! [`RpcError`](crate::error::RpcError)s pass through, anything else becomes a
//! validation, serialization or deserialization error.
//!
//! 基于无类型 [`Operation`](crate::core::Operation) 的有类型操作。
//!
//! 模型描述一个RPC操作：它的名称，以及如何校验、序列化和反序列化它交换的领域值。
//! 模型产生的失败在边界处分类：已经是 `RpcError` 的错误原样传递，
//! 其他错误成为校验、序列化或反序列化错误。

pub mod json;
pub mod model;
pub mod request_response;
pub mod streaming;

pub use model::{RequestResponseModel, StreamingModel};
pub use request_response::RequestResponseOperation;
pub use streaming::StreamingOperation;
