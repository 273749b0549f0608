//! A single RPC operation bound to one transport stream.
//!
//! An [`Operation`] is created on a connected [`ClientConnection`], activated
//! exactly once with its first message, and closed exactly once. Closing an
//! operation that is still active sends a terminating message first so the
//! server learns the stream is finished.
//!
//! 绑定到单个传输流的RPC操作。
//!
//! [`Operation`] 在已连接的 [`ClientConnection`] 上创建，用第一条消息恰好激活一次，
//! 并恰好关闭一次。关闭仍处于活动状态的操作时会先发送终止消息，使服务器得知流已结束。

use super::{
    connection::{ClientConnection, ConnectionShared},
    lifecycle::{Lifecycle, LifecycleState, OperationState},
    notify::{EventListener, Notifier, wait_for_event},
};
use crate::{
    error::{Result, RpcError},
    protocol::Message,
    transport::{StreamEnd, TransportConnection, TransportStream},
};
use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

const ERROR_CHANNEL_CAPACITY: usize = 16;

/// Identifies an operation within its client connection.
/// 在客户端连接内标识一个操作。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperationId(u64);

impl OperationId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Emitted at most once, when an activated operation closes.
/// 在已激活的操作关闭时至多发出一次。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationEnded {
    /// How the stream ended, if the transport reported it before the close.
    /// 流的结束方式（如果传输层在关闭之前报告了它）。
    pub reason: Option<StreamEnd>,
}

struct OperationInner {
    lifecycle: Lifecycle<OperationState>,
    emit_ended_on_close: bool,
    /// Set while `activate()` waits for the transport. A stream end observed
    /// meanwhile is reconciled by `activate()` itself.
    /// 在 `activate()` 等待传输期间置位。期间观察到的流结束由 `activate()` 自身处理。
    activation_pending: bool,
    end_reason: Option<StreamEnd>,
}

pub(crate) struct OperationShared<C: TransportConnection> {
    id: OperationId,
    name: String,
    stream: C::Stream,
    connection: Weak<ConnectionShared<C>>,
    inner: Mutex<OperationInner>,
    ended: Notifier<OperationEnded>,
    errors: broadcast::Sender<RpcError>,
}

impl<C: TransportConnection> OperationShared<C> {
    fn lock(&self) -> MutexGuard<'_, OperationInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn connection(&self) -> Option<ClientConnection<C>> {
        self.connection.upgrade().map(ClientConnection::from_shared)
    }

    /// Closes the operation. Idempotent and safe to call concurrently: only
    /// the first caller does any work.
    ///
    /// 关闭操作。幂等且可安全并发调用：只有第一个调用者会执行实际工作。
    pub(crate) async fn close(self: &Arc<Self>) {
        // The end watcher may not have run yet for a stream that already ended.
        // 对于已经结束的流，结束监视器可能尚未运行。
        let observed_end = *self.stream.ended().borrow();
        let (was_active, ended) = {
            let mut inner = self.lock();
            if inner.lifecycle.current().is_closed() {
                return;
            }
            if inner.end_reason.is_none() {
                inner.end_reason = observed_end;
            }
            let ended = if inner.emit_ended_on_close {
                inner.emit_ended_on_close = false;
                Some(OperationEnded {
                    reason: inner.end_reason,
                })
            } else {
                None
            };
            let was_active =
                inner.lifecycle.is(OperationState::Activated) && observed_end.is_none();
            inner.lifecycle.close();
            (was_active, ended)
        };

        if let Some(ended) = ended {
            self.ended.notify_deferred(ended);
        }
        if let Some(connection) = self.connection() {
            connection.remove_unclosed_operation(self.id);
        }

        if was_active {
            trace!(operation_id = %self.id, "Sending stream termination");
            if let Err(err) = self.stream.send_message(Message::terminate_stream()).await {
                warn!(operation_id = %self.id, error = %err, "Failed to terminate stream");
                // Nobody may be listening; the close itself still succeeds.
                // 可能没有监听者；关闭本身仍然成功。
                let _ = self
                    .errors
                    .send(RpcError::internal("failed to send the stream termination message", err));
            }
        }

        let operation = Arc::clone(self);
        tokio::spawn(async move {
            operation.stream.close();
            trace!(operation_id = %operation.id, "Stream released");
        });
        debug!(operation_id = %self.id, operation = %self.name, "Operation closed");
    }

    fn schedule_close(self: &Arc<Self>) {
        let operation = Arc::clone(self);
        tokio::spawn(async move {
            operation.close().await;
        });
    }

    /// Watches for the stream ending on its own and closes the operation
    /// when it does.
    ///
    /// 监视流自行结束，并在结束时关闭操作。
    fn spawn_end_watcher(self: &Arc<Self>) {
        let mut ended = self.stream.ended();
        let operation = Arc::downgrade(self);
        tokio::spawn(async move {
            let Some(end) = wait_for_event(&mut ended).await else {
                return;
            };
            let Some(operation) = operation.upgrade() else {
                return;
            };
            if operation.record_stream_end(end) {
                operation.close().await;
            }
        });
    }

    /// Returns whether the operation should be closed now.
    /// 返回是否应立即关闭操作。
    fn record_stream_end(&self, end: StreamEnd) -> bool {
        debug!(operation_id = %self.id, error_code = end.error_code, "Stream ended");
        let mut inner = self.lock();
        if inner.end_reason.is_none() {
            inner.end_reason = Some(end);
        }
        if inner.lifecycle.is(OperationState::Activated) {
            let _ = inner.lifecycle.transition_to(OperationState::Ended);
        }
        !inner.activation_pending
    }
}

impl<C: TransportConnection> Drop for OperationShared<C> {
    fn drop(&mut self) {
        let closed = self.lock().lifecycle.current().is_closed();
        if closed {
            return;
        }
        debug!(operation_id = %self.id, "Operation dropped without close");
        if let Some(connection) = self.connection() {
            connection.remove_unclosed_operation(self.id);
        }
        self.stream.close();
    }
}

/// Clears `activation_pending` when the `activate()` future is dropped before
/// the transport answered, handing a stream end back to the end watcher.
///
/// 当 `activate()` future 在传输应答之前被丢弃时清除 `activation_pending`，
/// 将流结束交还给结束监视器处理。
struct PendingActivation<'a, C: TransportConnection> {
    shared: &'a Arc<OperationShared<C>>,
    armed: bool,
}

impl<C: TransportConnection> Drop for PendingActivation<'_, C> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let reconcile = {
            let mut inner = self.shared.lock();
            inner.activation_pending = false;
            !inner.lifecycle.current().is_closed() && inner.end_reason.is_some()
        };
        debug!(operation_id = %self.shared.id, "Activation cancelled");
        // An end recorded meanwhile was left for activate() to close.
        // 期间记录的流结束原本留给 activate() 关闭。
        if reconcile && tokio::runtime::Handle::try_current().is_ok() {
            self.shared.schedule_close();
        }
    }
}

/// A single operation on a client connection.
///
/// The handle is cheap to clone; all clones share one operation.
///
/// 客户端连接上的单个操作。句柄克隆开销很小，所有克隆共享同一个操作。
pub struct Operation<C: TransportConnection> {
    shared: Arc<OperationShared<C>>,
}

impl<C: TransportConnection> Clone for Operation<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: TransportConnection> fmt::Debug for Operation<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .finish()
    }
}

impl<C: TransportConnection> Operation<C> {
    /// Allocates a stream on `connection` and registers the operation with it.
    /// Fails with `ClientStateError` unless the connection is connected.
    ///
    /// 在 `connection` 上分配一个流并注册该操作。
    /// 除非连接处于已连接状态，否则以 `ClientStateError` 失败。
    pub fn new(connection: &ClientConnection<C>, name: impl Into<String>) -> Result<Self> {
        let stream = connection.new_stream()?;
        let id = connection.next_operation_id();
        let (errors, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);
        let shared = Arc::new(OperationShared {
            id,
            name: name.into(),
            stream,
            connection: connection.downgrade(),
            inner: Mutex::new(OperationInner {
                lifecycle: Lifecycle::new(OperationState::None, "operation", id.get()),
                emit_ended_on_close: false,
                activation_pending: false,
                end_reason: None,
            }),
            ended: Notifier::new("operation ended"),
            errors,
        });

        // The connection may have closed since the stream was allocated.
        // 连接可能在分配流之后已经关闭。
        if let Err(err) = connection.register_unclosed_operation(id, &shared) {
            shared.lock().lifecycle.close();
            shared.stream.close();
            return Err(err);
        }

        debug!(operation_id = %id, operation = %shared.name, "Operation created");
        Ok(Self { shared })
    }

    pub fn id(&self) -> OperationId {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> OperationState {
        self.shared.lock().lifecycle.current()
    }

    /// Subscribes to the ended notification.
    /// 订阅结束通知。
    pub fn ended(&self) -> EventListener<OperationEnded> {
        self.shared.ended.subscribe()
    }

    /// Subscribes to asynchronous errors that have no caller to return to,
    /// such as a failure to send the stream termination message on close.
    ///
    /// 订阅无法返回给调用方的异步错误，例如关闭时发送流终止消息失败。
    pub fn errors(&self) -> broadcast::Receiver<RpcError> {
        self.shared.errors.subscribe()
    }

    /// Activates the stream with its first message. May only be called once.
    ///
    /// If the stream ends before activation is acknowledged, the activation
    /// result still decides the outcome.
    ///
    /// 用第一条消息激活流。只能调用一次。
    /// 如果流在激活确认之前结束，仍由激活结果决定最终结果。
    pub async fn activate(&self, message: Message) -> Result<()> {
        {
            let mut inner = self.shared.lock();
            if !inner.lifecycle.is(OperationState::None) {
                return Err(RpcError::client_state(format!(
                    "activate() may only be called once per operation (state: {})",
                    inner.lifecycle.current().name()
                )));
            }
            inner.lifecycle.transition_to(OperationState::Activated)?;
            inner.activation_pending = true;
        }
        let mut pending = PendingActivation {
            shared: &self.shared,
            armed: true,
        };
        debug!(operation_id = %self.shared.id, operation = %self.shared.name, "Activating operation");
        self.shared.spawn_end_watcher();

        let mut ended = self.shared.stream.ended();
        let activation = self.shared.stream.activate(&self.shared.name, message);
        tokio::pin!(activation);
        let result = tokio::select! {
            biased;
            result = &mut activation => result,
            _ = wait_for_event(&mut ended) => {
                trace!(operation_id = %self.shared.id, "Stream ended before activation completed");
                activation.await
            }
        };
        pending.armed = false;

        let reconcile = {
            let mut inner = self.shared.lock();
            inner.activation_pending = false;
            let closed = inner.lifecycle.current().is_closed();
            match &result {
                Ok(()) if !closed => inner.emit_ended_on_close = true,
                Ok(()) => {}
                Err(_) => {
                    if inner.lifecycle.is(OperationState::Activated) {
                        inner.lifecycle.transition_to(OperationState::Ended)?;
                    }
                }
            }
            !closed && inner.end_reason.is_some()
        };
        if reconcile {
            // The stream ended while activation was in flight.
            // 流在激活进行期间结束。
            self.shared.schedule_close();
        }

        result.map_err(|err| {
            warn!(operation_id = %self.shared.id, error = %err, "Activation failed");
            RpcError::internal("failed to activate the operation stream", err)
        })
    }

    /// Sends a message on the activated stream.
    /// 在已激活的流上发送消息。
    pub async fn send_message(&self, message: Message) -> Result<()> {
        let state = self.state();
        if state != OperationState::Activated {
            return Err(RpcError::client_state(format!(
                "messages can only be sent on an activated operation (state: {})",
                state.name()
            )));
        }
        self.shared
            .stream
            .send_message(message)
            .await
            .map_err(|e| RpcError::internal("failed to send a stream message", e))
    }

    /// Waits for the next inbound message. `None` once the stream has ended
    /// and every buffered message has been read.
    ///
    /// 等待下一条入站消息。流结束且所有缓冲消息都被读取后返回 `None`。
    pub async fn next_message(&self) -> Option<Message> {
        self.shared.stream.next_message().await
    }

    /// Closes the operation. Idempotent.
    /// 关闭操作。幂等。
    pub async fn close(&self) {
        self.shared.close().await;
    }
}
