//! At-most-once notifications.
//!
//! A notification is a `watch` slot that starts empty and is filled at most
//! once. Emission is always deferred to a freshly spawned task so listeners
//! never run inside the state-mutating call that produced the event.
//!
//! 至多一次的通知。
//!
//! 通知是一个初始为空、至多被填充一次的 `watch` 槽位。发出总是被推迟到新创建的任务中，
//! 因此监听者永远不会在产生事件的状态变更调用中运行。

use std::sync::Arc;
use tokio::sync::watch;
use tracing::trace;

/// Subscriber side of an at-most-once notification.
///
/// 至多一次通知的订阅端。
#[derive(Debug, Clone)]
pub struct EventListener<T> {
    rx: watch::Receiver<Option<T>>,
}

impl<T: Clone> EventListener<T> {
    /// Waits for the event. Returns `None` if the emitter went away without
    /// ever producing it.
    ///
    /// 等待事件。如果发出方在未产生事件的情况下消失，则返回 `None`。
    pub async fn recv(&mut self) -> Option<T> {
        wait_for_event(&mut self.rx).await
    }

    /// Returns the event if it has already been delivered.
    /// 如果事件已送达则返回它。
    pub fn try_recv(&self) -> Option<T> {
        self.rx.borrow().clone()
    }
}

/// Waits until a notification slot is filled.
/// 等待通知槽位被填充。
pub(crate) async fn wait_for_event<T: Clone>(rx: &mut watch::Receiver<Option<T>>) -> Option<T> {
    let slot = rx.wait_for(Option::is_some).await.ok()?;
    Option::clone(&slot)
}

/// Emitter side of an at-most-once notification.
///
/// 至多一次通知的发出端。
#[derive(Debug)]
pub(crate) struct Notifier<T> {
    tx: Arc<watch::Sender<Option<T>>>,
    name: &'static str,
}

impl<T: Clone + Send + Sync + 'static> Notifier<T> {
    pub(crate) fn new(name: &'static str) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            tx: Arc::new(tx),
            name,
        }
    }

    pub(crate) fn subscribe(&self) -> EventListener<T> {
        EventListener {
            rx: self.tx.subscribe(),
        }
    }

    /// Delivers `event` on the next scheduling tick, unless an event was
    /// already delivered.
    ///
    /// 在下一个调度周期送达 `event`，除非已经送达过事件。
    pub(crate) fn notify_deferred(&self, event: T) {
        let tx = Arc::clone(&self.tx);
        let name = self.name;
        tokio::spawn(async move {
            let delivered = tx.send_if_modified(|slot| {
                if slot.is_some() {
                    return false;
                }
                *slot = Some(event);
                true
            });
            trace!(notification = name, delivered, "Deferred notification emitted");
        });
    }
}
