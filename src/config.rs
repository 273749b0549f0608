//! 定义了客户端连接的可配置参数。
//! Defines configurable parameters for a client connection.

use crate::{error::BoxError, protocol::Message};
use async_trait::async_trait;
use std::{fmt, future::Future, path::PathBuf, sync::Arc, time::Duration};

/// Default deadline for the connect/acknowledge handshake.
/// 握手的默认截止时间。
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

/// An asynchronous rewrite of the outgoing `Connect` message, typically used
/// to attach a protocol version header or an authentication payload.
///
/// 对发出的 `Connect` 消息进行异步改写，通常用于附加协议版本头或认证载荷。
#[async_trait]
pub trait ConnectTransform: Send + Sync + 'static {
    async fn transform(&self, message: Message) -> Result<Message, BoxError>;
}

#[async_trait]
impl<F, Fut> ConnectTransform for F
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Message, BoxError>> + Send + 'static,
{
    async fn transform(&self, message: Message) -> Result<Message, BoxError> {
        (self)(message).await
    }
}

/// A structure containing all configurable parameters for a client connection.
///
/// 包含客户端连接所有可配置参数的结构体。
#[derive(Clone)]
pub struct ClientConnectionConfig {
    /// The remote host name.
    /// 远程主机名。
    pub host_name: String,
    /// The remote port.
    /// 远程端口。
    pub port: u16,
    /// Socket options passed through to the transport.
    /// 透传给传输层的套接字选项。
    pub socket_options: Option<SocketOptions>,
    /// TLS options passed through to the transport.
    /// 透传给传输层的TLS选项。
    pub tls: Option<TlsOptions>,
    /// Applied to the outgoing `Connect` message before it is sent.
    /// 在发送前应用于 `Connect` 消息。
    pub connect_transform: Option<Arc<dyn ConnectTransform>>,
    /// The handshake deadline.
    /// 握手截止时间。
    pub connect_timeout: Duration,
}

impl fmt::Debug for ClientConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConnectionConfig")
            .field("host_name", &self.host_name)
            .field("port", &self.port)
            .field("socket_options", &self.socket_options)
            .field("tls", &self.tls)
            .field("connect_transform", &self.connect_transform.is_some())
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl ClientConnectionConfig {
    pub fn new(host_name: impl Into<String>, port: u16) -> Self {
        Self {
            host_name: host_name.into(),
            port,
            socket_options: None,
            tls: None,
            connect_transform: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_socket_options(mut self, socket_options: SocketOptions) -> Self {
        self.socket_options = Some(socket_options);
        self
    }

    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn with_connect_transform(mut self, transform: impl ConnectTransform) -> Self {
        self.connect_transform = Some(Arc::new(transform));
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// The subset of the configuration the transport builder needs.
    /// 传输构建器所需的配置子集。
    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            host_name: self.host_name.clone(),
            port: self.port,
            socket_options: self.socket_options.clone().unwrap_or_default(),
            tls: self.tls.clone(),
        }
    }
}

/// Everything needed to build a transport connection.
/// 构建传输连接所需的全部信息。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    pub host_name: String,
    pub port: u16,
    pub socket_options: SocketOptions,
    pub tls: Option<TlsOptions>,
}

/// Socket type.
/// 套接字类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SocketType {
    #[default]
    Stream,
    Datagram,
}

/// Socket address domain.
/// 套接字地址域。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SocketDomain {
    #[default]
    Ipv4,
    Ipv6,
    /// Unix domain socket or named pipe.
    /// Unix域套接字或命名管道。
    Local,
}

/// Socket-level parameters.
///
/// 套接字级别的参数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketOptions {
    pub socket_type: SocketType,
    pub domain: SocketDomain,
    /// The timeout for establishing the socket itself, separate from the
    /// protocol handshake deadline.
    /// 建立套接字本身的超时，与协议握手截止时间分开。
    pub connect_timeout: Duration,
    pub keep_alive: bool,
    pub keep_alive_interval: Duration,
    pub keep_alive_timeout: Duration,
    pub keep_alive_max_failed_probes: u16,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            socket_type: SocketType::default(),
            domain: SocketDomain::default(),
            connect_timeout: Duration::from_secs(5),
            keep_alive: false,
            keep_alive_interval: Duration::ZERO,
            keep_alive_timeout: Duration::ZERO,
            keep_alive_max_failed_probes: 0,
        }
    }
}

/// TLS parameters.
///
/// TLS参数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsOptions {
    /// Server name for SNI and certificate verification. Falls back to the host name.
    /// 用于SNI和证书校验的服务器名称，默认使用主机名。
    pub server_name: Option<String>,
    pub alpn_protocols: Vec<String>,
    pub ca_file: Option<PathBuf>,
    pub verify_peer: bool,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            server_name: None,
            alpn_protocols: Vec::new(),
            ca_file: None,
            verify_peer: true,
        }
    }
}
