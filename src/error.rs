//! 定义了库中所有可能的错误类型。
//! Defines all possible error types in the library.
//!
//! Every failure surfaced by the client is an [`RpcError`] carrying one of the
//! seven [`RpcErrorKind`]s. Transport collaborators report [`TransportError`],
//! which is classified as [`RpcErrorKind::InternalError`] when it crosses into
//! the client.
//!
//! 客户端暴露的每个失败都是带有七种 [`RpcErrorKind`] 之一的 [`RpcError`]。
//! 传输协作者报告 [`TransportError`]，进入客户端时被归类为内部错误。

use std::{error::Error as StdError, fmt, sync::Arc};
use thiserror::Error;

/// Error type returned by caller-supplied functions (connect transforms,
/// validators, serializers).
///
/// 调用方提供的函数（连接转换、校验器、序列化器）返回的错误类型。
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// The seven failure classes of the client.
/// 客户端的七种失败类别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcErrorKind {
    /// A domain object could not be turned into a protocol message.
    /// 领域对象无法转换为协议消息。
    SerializationError,
    /// A protocol message could not be turned into a domain object.
    /// 协议消息无法转换为领域对象。
    DeserializationError,
    /// A received message violates the handshake contract.
    /// 收到的消息违反了握手约定。
    ProtocolError,
    /// An unclassifiable failure, usually surfaced by the transport.
    /// 无法分类的失败，通常来自传输层。
    InternalError,
    /// Caller-supplied data failed pre-send validation.
    /// 调用方提供的数据未通过发送前校验。
    ValidationError,
    /// An API was called while the client or operation was in the wrong state.
    /// 在客户端或操作处于错误状态时调用了API。
    ClientStateError,
    /// Handshake timeout or disconnect during the handshake.
    /// 握手超时或握手期间断开连接。
    NetworkError,
}

impl fmt::Display for RpcErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RpcErrorKind::SerializationError => "SerializationError",
            RpcErrorKind::DeserializationError => "DeserializationError",
            RpcErrorKind::ProtocolError => "ProtocolError",
            RpcErrorKind::InternalError => "InternalError",
            RpcErrorKind::ValidationError => "ValidationError",
            RpcErrorKind::ClientStateError => "ClientStateError",
            RpcErrorKind::NetworkError => "NetworkError",
        };
        write!(f, "{}", s)
    }
}

/// The primary error type of the client.
///
/// The cause is reference counted so the error can be cloned onto
/// notification channels.
///
/// 客户端的主要错误类型。原因使用引用计数，以便错误可以被克隆到通知通道上。
#[derive(Debug, Clone, Error)]
#[error("{kind}: {description}")]
pub struct RpcError {
    kind: RpcErrorKind,
    description: String,
    #[source]
    cause: Option<Arc<dyn StdError + Send + Sync>>,
}

impl RpcError {
    /// Creates an error without an inner cause.
    /// 创建一个没有内部原因的错误。
    pub fn new(kind: RpcErrorKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            cause: None,
        }
    }

    /// Creates an error wrapping an inner cause.
    /// 创建一个包装内部原因的错误。
    pub fn with_cause(
        kind: RpcErrorKind,
        description: impl Into<String>,
        cause: impl Into<BoxError>,
    ) -> Self {
        let cause: BoxError = cause.into();
        Self {
            kind,
            description: description.into(),
            cause: Some(Arc::from(cause)),
        }
    }

    pub fn client_state(description: impl Into<String>) -> Self {
        Self::new(RpcErrorKind::ClientStateError, description)
    }

    pub fn network(description: impl Into<String>) -> Self {
        Self::new(RpcErrorKind::NetworkError, description)
    }

    pub fn protocol(description: impl Into<String>) -> Self {
        Self::new(RpcErrorKind::ProtocolError, description)
    }

    pub fn internal(description: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Self::with_cause(RpcErrorKind::InternalError, description, cause)
    }

    /// Classifies an arbitrary failure.
    ///
    /// A failure that already is an [`RpcError`] keeps its kind and
    /// description. Anything else is wrapped as `kind` with `description`,
    /// keeping the original failure as the cause.
    ///
    /// 对任意失败进行分类。已经是 [`RpcError`] 的失败保持原样，
    /// 其他失败被包装为给定类型，原始失败作为原因保留。
    pub fn classify(cause: BoxError, kind: RpcErrorKind, description: &str) -> Self {
        match cause.downcast::<RpcError>() {
            Ok(classified) => *classified,
            Err(other) => Self::with_cause(kind, description, other),
        }
    }

    pub fn kind(&self) -> RpcErrorKind {
        self.kind
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// The inner cause, if any. Callers can downcast it to recover
    /// domain-specific failures such as a service error.
    ///
    /// 内部原因（如果有）。调用方可以向下转型以恢复领域相关的失败。
    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// The cause downcast to `T`, e.g. a service error returned by a JSON model.
    /// 向下转型为 `T` 的内部原因，例如JSON模型返回的服务错误。
    pub fn cause_as<T: StdError + 'static>(&self) -> Option<&T> {
        self.cause()?.downcast_ref::<T>()
    }
}

/// Errors reported by transport collaborators.
/// 传输协作者报告的错误。
#[derive(Debug, Error)]
pub enum TransportError {
    /// An underlying I/O error occurred.
    /// 发生了底层的I/O错误。
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport connection or stream is already closed.
    /// 传输连接或流已经关闭。
    #[error("transport is closed")]
    Closed,

    /// The transport refused the request.
    /// 传输层拒绝了该请求。
    #[error("transport rejected the request: {0}")]
    Rejected(String),
}

impl From<TransportError> for RpcError {
    fn from(err: TransportError) -> Self {
        RpcError::internal("transport failure", err)
    }
}

/// A specialized `Result` type for this library.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, RpcError>;

impl From<RpcError> for std::io::Error {
    fn from(err: RpcError) -> Self {
        use std::io::ErrorKind;
        let kind = match err.kind() {
            RpcErrorKind::SerializationError | RpcErrorKind::DeserializationError => {
                ErrorKind::InvalidData
            }
            RpcErrorKind::ProtocolError => ErrorKind::InvalidData,
            RpcErrorKind::InternalError => ErrorKind::Other,
            RpcErrorKind::ValidationError => ErrorKind::InvalidInput,
            RpcErrorKind::ClientStateError => ErrorKind::NotConnected,
            RpcErrorKind::NetworkError => ErrorKind::ConnectionAborted,
        };
        std::io::Error::new(kind, err)
    }
}
