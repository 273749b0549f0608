//! 连接与操作生命周期管理模块
//! Connection and Operation Lifecycle Module
//!
//! 该模块定义连接管理器和操作共用的状态机形状：状态定义、转换校验和转换执行。
//!
//! This module defines the state machine shape shared by the connection
//! manager and its operations: the states, transition validation, and the
//! transition executor.

mod state;
mod transitions;
mod validation;

pub use state::{ConnectionState, OperationState};
pub use validation::LifecycleState;

pub(crate) use transitions::Lifecycle;
