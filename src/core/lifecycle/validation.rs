//! 生命周期状态转换校验模块
//! Lifecycle State Transition Validation Module
//!
//! Both state machines only ever move forward. `Closed` is reachable from
//! every other state and nothing leaves it.
//!
//! 两个状态机都只会向前推进。`Closed` 可以从任何其他状态到达，且不会离开。

use super::state::{ConnectionState, OperationState};
use std::fmt::Debug;

/// A state of one of the client's lifecycle state machines.
/// 客户端某个生命周期状态机的状态。
pub trait LifecycleState: Copy + Eq + Debug + Send + 'static {
    /// The terminal state.
    /// 终态。
    const CLOSED: Self;

    /// Name used in logs and error descriptions.
    /// 用于日志和错误描述的名称。
    fn name(&self) -> &'static str;

    /// Whether moving from `self` to `next` is legal.
    /// 从 `self` 转换到 `next` 是否合法。
    fn can_transition_to(&self, next: &Self) -> bool;

    fn is_closed(&self) -> bool {
        *self == Self::CLOSED
    }
}

impl LifecycleState for ConnectionState {
    const CLOSED: Self = ConnectionState::Closed;

    fn name(&self) -> &'static str {
        match self {
            ConnectionState::None => "None",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Finished => "Finished",
            ConnectionState::Closed => "Closed",
        }
    }

    fn can_transition_to(&self, next: &Self) -> bool {
        use ConnectionState::*;

        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,

            (None, Connecting) => true,
            (Connecting, Connected) => true,
            (Connecting, Finished) => true,

            _ => false,
        }
    }
}

impl LifecycleState for OperationState {
    const CLOSED: Self = OperationState::Closed;

    fn name(&self) -> &'static str {
        match self {
            OperationState::None => "None",
            OperationState::Activated => "Activated",
            OperationState::Ended => "Ended",
            OperationState::Closed => "Closed",
        }
    }

    fn can_transition_to(&self, next: &Self) -> bool {
        use OperationState::*;

        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,

            (None, Activated) => true,
            (Activated, Ended) => true,

            _ => false,
        }
    }
}
