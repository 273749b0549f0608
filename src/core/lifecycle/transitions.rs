//! 生命周期状态转换执行模块
//! Lifecycle State Transition Execution Module
//!
//! 负责执行状态转换并记录转换日志。
//! Executes state transitions and traces them.

use super::validation::LifecycleState;
use crate::error::{Result, RpcError};
use tracing::{trace, warn};

/// Holds the current state of one state machine and executes transitions.
///
/// 持有单个状态机的当前状态并执行转换。
#[derive(Debug)]
pub(crate) struct Lifecycle<S: LifecycleState> {
    state: S,
    /// What this state machine belongs to, for logging.
    /// 此状态机所属对象，用于日志记录。
    subject: &'static str,
    id: u64,
}

impl<S: LifecycleState> Lifecycle<S> {
    pub(crate) fn new(initial: S, subject: &'static str, id: u64) -> Self {
        Self {
            state: initial,
            subject,
            id,
        }
    }

    pub(crate) fn current(&self) -> S {
        self.state
    }

    pub(crate) fn is(&self, state: S) -> bool {
        self.state == state
    }

    /// Moves to `next` if the transition is legal.
    ///
    /// 如果转换合法，则转换到 `next`。
    pub(crate) fn transition_to(&mut self, next: S) -> Result<()> {
        if !self.state.can_transition_to(&next) {
            warn!(
                subject = self.subject,
                id = self.id,
                from = self.state.name(),
                to = next.name(),
                "Invalid state transition attempted"
            );
            return Err(RpcError::client_state(format!(
                "{} cannot move from {} to {}",
                self.subject,
                self.state.name(),
                next.name()
            )));
        }

        trace!(
            subject = self.subject,
            id = self.id,
            from = self.state.name(),
            to = next.name(),
            "State transition executed"
        );
        self.state = next;
        Ok(())
    }

    /// Moves to the terminal state. Returns `false` if it was already there.
    ///
    /// 转换到终态。如果已经处于终态则返回 `false`。
    pub(crate) fn close(&mut self) -> bool {
        if self.state.is_closed() {
            return false;
        }
        trace!(
            subject = self.subject,
            id = self.id,
            from = self.state.name(),
            to = S::CLOSED.name(),
            "State transition executed"
        );
        self.state = S::CLOSED;
        true
    }
}
