//! The connection manager.
//!
//! [`ClientConnection`] owns the transport connection, drives the one-time
//! connect/acknowledge handshake, and keeps the registry of operations that
//! have not been closed yet so that closing the connection closes them too.
//!
//! 连接管理器。
//!
//! [`ClientConnection`] 拥有传输连接，驱动一次性的连接/确认握手，
//! 并维护尚未关闭的操作注册表，使关闭连接时也会关闭这些操作。

use super::{
    lifecycle::{ConnectionState, Lifecycle, LifecycleState},
    notify::{EventListener, Notifier, wait_for_event},
    operation::{OperationId, OperationShared},
};
use crate::{
    config::ClientConnectionConfig,
    error::{Result, RpcError, RpcErrorKind},
    protocol::Message,
    transport::{ConnectionBuilder, TransportConnection, TransportDisconnect},
};
use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, Weak,
        atomic::{AtomicU64, Ordering},
    },
};
use tracing::{debug, info, trace, warn};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Why a connected client went away.
/// 已连接的客户端断开的原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisconnectReason {
    /// The client was closed without the transport reporting an error.
    /// 客户端被关闭，传输层未报告错误。
    #[default]
    Closed,
    /// The transport disconnected with a nonzero error code.
    /// 传输层以非零错误码断开。
    Transport { error_code: i32 },
}

/// Emitted at most once, and only after a successful connect.
/// 至多发出一次，并且仅在成功连接之后。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnection {
    pub reason: DisconnectReason,
}

/// The labeled outcomes racing to decide a handshake.
/// 竞争决定握手结果的带标签结果。
enum HandshakeOutcome {
    Acknowledged(Message),
    Failed(RpcError),
    TimedOut,
    Disconnected(TransportDisconnect),
}

pub(crate) struct ConnectionShared<C: TransportConnection> {
    id: u64,
    transport: C,
    config: ClientConnectionConfig,
    inner: Mutex<ConnectionInner<C>>,
    disconnection: Notifier<Disconnection>,
    next_operation_id: AtomicU64,
}

struct ConnectionInner<C: TransportConnection> {
    lifecycle: Lifecycle<ConnectionState>,
    /// Non-owning handles to operations that are still open. `None` once the
    /// connection has started closing.
    /// 仍处于打开状态的操作的非拥有句柄。连接开始关闭后为 `None`。
    unclosed_operations: Option<BTreeMap<OperationId, Weak<OperationShared<C>>>>,
    disconnection_reason: Option<DisconnectReason>,
    emit_disconnect_on_close: bool,
}

impl<C: TransportConnection> ConnectionShared<C> {
    fn lock(&self) -> MutexGuard<'_, ConnectionInner<C>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: TransportConnection> Drop for ConnectionShared<C> {
    fn drop(&mut self) {
        let closed = self.lock().lifecycle.current().is_closed();
        if !closed {
            debug!(connection_id = self.id, "Client connection dropped without close");
            self.transport.close();
        }
    }
}

/// A client connection to an event-stream RPC server.
///
/// The handle is cheap to clone; all clones share one connection.
///
/// 到事件流RPC服务器的客户端连接。句柄克隆开销很小，所有克隆共享同一个连接。
pub struct ClientConnection<C: TransportConnection> {
    shared: Arc<ConnectionShared<C>>,
}

impl<C: TransportConnection> Clone for ClientConnection<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: TransportConnection> fmt::Debug for ClientConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.shared.id)
            .field("host_name", &self.shared.config.host_name)
            .field("port", &self.shared.config.port)
            .field("state", &self.state())
            .finish()
    }
}

impl<C: TransportConnection> ClientConnection<C> {
    /// Creates a client connection, building the transport from the
    /// configuration. A builder failure is reported as `InternalError`.
    ///
    /// 创建客户端连接，并根据配置构建传输。构建失败报告为 `InternalError`。
    pub fn new<B>(config: ClientConnectionConfig, builder: &B) -> Result<Self>
    where
        B: ConnectionBuilder<Connection = C>,
    {
        let transport = builder
            .build(&config.transport_options())
            .map_err(|e| RpcError::internal("failed to create the transport connection", e))?;
        Ok(Self::with_transport(config, transport))
    }

    /// Creates a client connection over an already built transport.
    /// 在已构建的传输之上创建客户端连接。
    pub fn with_transport(config: ClientConnectionConfig, transport: C) -> Self {
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        let inner = ConnectionInner {
            lifecycle: Lifecycle::new(ConnectionState::None, "client connection", id),
            unclosed_operations: Some(BTreeMap::new()),
            disconnection_reason: None,
            emit_disconnect_on_close: false,
        };
        Self {
            shared: Arc::new(ConnectionShared {
                id,
                transport,
                config,
                inner: Mutex::new(inner),
                disconnection: Notifier::new("disconnection"),
                next_operation_id: AtomicU64::new(1),
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<ConnectionShared<C>>) -> Self {
        Self { shared }
    }

    pub(crate) fn downgrade(&self) -> Weak<ConnectionShared<C>> {
        Arc::downgrade(&self.shared)
    }

    pub fn config(&self) -> &ClientConnectionConfig {
        &self.shared.config
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lock().lifecycle.current()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.lock().lifecycle.is(ConnectionState::Connected)
    }

    /// Subscribes to the disconnection notification.
    /// 订阅断开连接通知。
    pub fn disconnection(&self) -> EventListener<Disconnection> {
        self.shared.disconnection.subscribe()
    }

    /// Performs the connect/acknowledge handshake. May only be called once.
    ///
    /// The transport handshake, the `connect_timeout` timer and a transport
    /// disconnect race each other; whichever finishes first decides the
    /// outcome. Any failure leaves the connection `Finished` with a close
    /// already scheduled, and the instance must not be reused.
    ///
    /// 执行连接/确认握手。只能调用一次。
    ///
    /// 传输握手、`connect_timeout` 计时器和传输断开相互竞争，最先完成者决定结果。
    /// 任何失败都会使连接进入 `Finished` 状态并已安排关闭，该实例不能再使用。
    pub async fn connect(&self) -> Result<()> {
        // Subscribe before the first suspension point so a disconnect racing
        // the handshake cannot be missed.
        // 在第一个挂起点之前订阅，确保不会错过与握手竞争的断开事件。
        let mut disconnections = self.shared.transport.disconnections();
        {
            let mut inner = self.shared.lock();
            if !inner.lifecycle.is(ConnectionState::None) {
                return Err(RpcError::client_state(
                    "connect() may only be called once per client connection",
                ));
            }
            inner.lifecycle.transition_to(ConnectionState::Connecting)?;
        }
        let mut pending = PendingConnect {
            connection: self,
            armed: true,
        };

        let timeout = self.shared.config.connect_timeout;
        debug!(
            connection_id = self.shared.id,
            host = %self.shared.config.host_name,
            port = self.shared.config.port,
            ?timeout,
            "Connecting"
        );

        let outcome = tokio::select! {
            biased;
            disconnect = next_disconnect(&mut disconnections) => HandshakeOutcome::Disconnected(disconnect),
            _ = tokio::time::sleep(timeout) => HandshakeOutcome::TimedOut,
            result = self.handshake() => match result {
                Ok(ack) => HandshakeOutcome::Acknowledged(ack),
                Err(err) => HandshakeOutcome::Failed(err),
            },
        };
        pending.armed = false;

        let failure = {
            let mut inner = self.shared.lock();
            if !inner.lifecycle.is(ConnectionState::Connecting) {
                return Err(RpcError::client_state(
                    "the client connection was closed before the handshake completed",
                ));
            }

            let failure = match outcome {
                HandshakeOutcome::Acknowledged(ack) if ack.is_accepted_connect_ack() => None,
                HandshakeOutcome::Acknowledged(ack) => Some(RpcError::protocol(format!(
                    "invalid connect acknowledgement: type {} with flags {:#x}",
                    ack.message_type,
                    ack.flags.bits()
                ))),
                HandshakeOutcome::Failed(err) => Some(err),
                HandshakeOutcome::TimedOut => Some(RpcError::network(format!(
                    "connect timed out after {:?}",
                    timeout
                ))),
                HandshakeOutcome::Disconnected(disconnect) => Some(RpcError::network(format!(
                    "transport disconnected during connect (error code {})",
                    disconnect.error_code
                ))),
            };

            match &failure {
                None => {
                    inner.lifecycle.transition_to(ConnectionState::Connected)?;
                    inner.emit_disconnect_on_close = true;
                }
                Some(_) => inner.lifecycle.transition_to(ConnectionState::Finished)?,
            }
            failure
        };

        match failure {
            None => {
                self.watch_disconnections();
                info!(connection_id = self.shared.id, "Client connection established");
                Ok(())
            }
            Some(err) => {
                warn!(connection_id = self.shared.id, error = %err, "Connect failed");
                self.schedule_close();
                Err(err)
            }
        }
    }

    /// Opens the transport, sends the (optionally transformed) `Connect`
    /// message and waits for the answer.
    ///
    /// 打开传输，发送（可选转换后的）`Connect` 消息并等待应答。
    async fn handshake(&self) -> Result<Message> {
        let transport = &self.shared.transport;
        transport
            .connect()
            .await
            .map_err(|e| RpcError::internal("failed to open the transport connection", e))?;

        let mut message = Message::connect();
        if let Some(transform) = self.shared.config.connect_transform.clone() {
            message = transform.transform(message).await.map_err(|e| {
                RpcError::classify(e, RpcErrorKind::InternalError, "connect message transform failed")
            })?;
        }

        transport
            .send_protocol_message(message)
            .await
            .map_err(|e| RpcError::internal("failed to send the connect message", e))?;
        transport
            .next_protocol_message()
            .await
            .map_err(|e| RpcError::internal("failed to receive the connect acknowledgement", e))
    }

    /// Installs the post-handshake disconnect watcher. It only records the
    /// reason and closes the connection; the connect call has already
    /// resolved by the time it can fire.
    ///
    /// 安装握手后的断开监视器。它只记录原因并关闭连接。
    fn watch_disconnections(&self) {
        let mut disconnections = self.shared.transport.disconnections();
        let shared = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            let Some(disconnect) = wait_for_event(&mut disconnections).await else {
                return;
            };
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let connection = ClientConnection::from_shared(shared);
            connection.record_disconnect(disconnect);
            connection.close().await;
        });
    }

    fn record_disconnect(&self, disconnect: TransportDisconnect) {
        debug!(
            connection_id = self.shared.id,
            error_code = disconnect.error_code,
            "Transport disconnected"
        );
        if disconnect.error_code == 0 {
            return;
        }
        let mut inner = self.shared.lock();
        if inner.disconnection_reason.is_none() {
            inner.disconnection_reason = Some(DisconnectReason::Transport {
                error_code: disconnect.error_code,
            });
        }
    }

    fn schedule_close(&self) {
        let connection = self.clone();
        tokio::spawn(async move {
            connection.close().await;
        });
    }

    /// Allocates a new transport stream. Only valid while connected.
    ///
    /// 分配一个新的传输流。仅在已连接时有效。
    pub fn new_stream(&self) -> Result<C::Stream> {
        let state = self.state();
        if state != ConnectionState::Connected {
            return Err(RpcError::client_state(format!(
                "new streams require a connected client connection (state: {})",
                state.name()
            )));
        }
        self.shared
            .transport
            .new_stream()
            .map_err(|e| RpcError::internal("failed to allocate a new stream", e))
    }

    pub(crate) fn next_operation_id(&self) -> OperationId {
        OperationId::new(self.shared.next_operation_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn register_unclosed_operation(
        &self,
        id: OperationId,
        operation: &Arc<OperationShared<C>>,
    ) -> Result<()> {
        let mut inner = self.shared.lock();
        let state = inner.lifecycle.current();
        if state != ConnectionState::Connected {
            return Err(RpcError::client_state(format!(
                "operations can only be registered on a connected client connection (state: {})",
                state.name()
            )));
        }
        match inner.unclosed_operations.as_mut() {
            Some(registry) => {
                registry.insert(id, Arc::downgrade(operation));
                Ok(())
            }
            None => Err(RpcError::client_state(
                "the client connection is closing",
            )),
        }
    }

    pub(crate) fn remove_unclosed_operation(&self, id: OperationId) {
        let mut inner = self.shared.lock();
        if let Some(registry) = inner.unclosed_operations.as_mut() {
            registry.remove(&id);
        }
    }

    /// Operations that were created on this connection and are still open.
    /// 在此连接上创建且仍处于打开状态的操作数量。
    pub fn unclosed_operation_count(&self) -> usize {
        self.shared
            .lock()
            .unclosed_operations
            .as_ref()
            .map_or(0, BTreeMap::len)
    }

    /// Closes the connection and every operation still registered with it.
    /// Calling it again is a no-op.
    ///
    /// 关闭连接以及仍在其上注册的所有操作。重复调用不产生任何效果。
    pub async fn close(&self) {
        let (operations, disconnection) = {
            let mut inner = self.shared.lock();
            if inner.lifecycle.current().is_closed() {
                return;
            }

            let disconnection = if inner.emit_disconnect_on_close {
                inner.emit_disconnect_on_close = false;
                Some(Disconnection {
                    reason: inner.disconnection_reason.take().unwrap_or_default(),
                })
            } else {
                None
            };

            // The state flips before the cascade so that reentrant calls from
            // the operations observe `Closed`.
            // 状态在级联关闭之前切换，使操作中的重入调用观察到 `Closed`。
            inner.lifecycle.close();
            let operations = inner.unclosed_operations.take().unwrap_or_default();
            (operations, disconnection)
        };

        if let Some(disconnection) = disconnection {
            self.shared.disconnection.notify_deferred(disconnection);
        }

        debug!(
            connection_id = self.shared.id,
            operations = operations.len(),
            "Closing client connection"
        );
        for (id, operation) in operations {
            match operation.upgrade() {
                Some(operation) => operation.close().await,
                None => trace!(operation_id = %id, "Operation already dropped"),
            }
        }

        self.shared.transport.close();
        info!(connection_id = self.shared.id, "Client connection closed");
    }
}

/// Finishes a handshake whose `connect()` future was dropped before the race
/// was decided, so the connection still reaches `Closed` on its own.
///
/// 处理在竞争决出之前就被丢弃的 `connect()` future，使连接仍能自行进入 `Closed`。
struct PendingConnect<'a, C: TransportConnection> {
    connection: &'a ClientConnection<C>,
    armed: bool,
}

impl<C: TransportConnection> Drop for PendingConnect<'_, C> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let finished = {
            let mut inner = self.connection.shared.lock();
            inner.lifecycle.is(ConnectionState::Connecting)
                && inner
                    .lifecycle
                    .transition_to(ConnectionState::Finished)
                    .is_ok()
        };
        if !finished {
            return;
        }
        warn!(
            connection_id = self.connection.shared.id,
            "Connect cancelled before the handshake completed"
        );
        // Without a runtime the transport is released when the last handle drops.
        // 没有运行时的情况下，传输在最后一个句柄丢弃时释放。
        if tokio::runtime::Handle::try_current().is_ok() {
            self.connection.schedule_close();
        }
    }
}

/// Resolves with the first transport disconnect. Never resolves if the
/// transport drops its notifier without disconnecting.
///
/// 在第一次传输断开时完成。如果传输在未断开的情况下丢弃其通知器，则永不完成。
async fn next_disconnect(
    disconnections: &mut tokio::sync::watch::Receiver<Option<TransportDisconnect>>,
) -> TransportDisconnect {
    match wait_for_event(disconnections).await {
        Some(disconnect) => disconnect,
        None => std::future::pending().await,
    }
}
