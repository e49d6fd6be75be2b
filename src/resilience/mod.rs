//! 容错机制模块
//!
//! 提供会话故障转移和首字节超时控制功能

mod failover;
mod timeout;

pub use failover::{FailoverController, FailoverOutcome, FailureType};
pub use timeout::{FirstByteDeadline, TimeoutConfig, TimeoutError};
