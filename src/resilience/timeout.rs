//! 超时控制实现
//!
//! 首字节超时：从发出上游请求开始计时，直到收到响应体的第一个数据块。
//! 请求整体超时交给 HTTP 客户端。

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// 超时配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeoutConfig {
    /// 首字节超时（毫秒），0 表示无超时
    pub first_byte_timeout_ms: u64,
    /// 全局请求超时（毫秒），0 表示无超时
    pub request_timeout_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            first_byte_timeout_ms: 30_000,
            request_timeout_ms: 300_000,
        }
    }
}

impl TimeoutConfig {
    /// 创建新的超时配置
    pub fn new(first_byte_timeout_ms: u64, request_timeout_ms: u64) -> Self {
        Self {
            first_byte_timeout_ms,
            request_timeout_ms,
        }
    }

    /// 创建无超时的配置
    pub fn no_timeout() -> Self {
        Self::new(0, 0)
    }

    /// 获取首字节超时 Duration
    pub fn first_byte_timeout(&self) -> Option<Duration> {
        (self.first_byte_timeout_ms > 0).then(|| Duration::from_millis(self.first_byte_timeout_ms))
    }

    /// 获取请求超时 Duration
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }

    /// 从发出请求的这一刻开始计时
    pub fn start_first_byte(&self) -> FirstByteDeadline {
        FirstByteDeadline {
            deadline: self.first_byte_timeout().map(|t| Instant::now() + t),
            timeout_ms: self.first_byte_timeout_ms,
            started: Instant::now(),
        }
    }
}

/// 超时错误
#[derive(Debug, Clone, PartialEq)]
pub enum TimeoutError {
    /// 首字节超时
    FirstByte { timeout_ms: u64, elapsed_ms: u64 },
}

impl TimeoutError {
    pub fn timeout_ms(&self) -> u64 {
        match self {
            TimeoutError::FirstByte { timeout_ms, .. } => *timeout_ms,
        }
    }
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeoutError::FirstByte {
                timeout_ms,
                elapsed_ms,
            } => {
                write!(
                    f,
                    "首字节超时: 配置 {}ms, 已耗时 {}ms",
                    timeout_ms, elapsed_ms
                )
            }
        }
    }
}

impl std::error::Error for TimeoutError {}

/// 首字节截止时间
///
/// 发送请求与读取第一个数据块共用同一个截止时间。
#[derive(Debug, Clone, Copy)]
pub struct FirstByteDeadline {
    deadline: Option<Instant>,
    timeout_ms: u64,
    started: Instant,
}

impl FirstByteDeadline {
    /// 不限时
    pub fn unbounded() -> Self {
        TimeoutConfig::no_timeout().start_first_byte()
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// 剩余时间；无超时时返回 None
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// 在截止时间内等待 future 完成
    pub async fn guard<F, T>(&self, operation: F) -> Result<T, TimeoutError>
    where
        F: Future<Output = T>,
    {
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, operation)
                .await
                .map_err(|_| TimeoutError::FirstByte {
                    timeout_ms: self.timeout_ms,
                    elapsed_ms: self.started.elapsed().as_millis() as u64,
                }),
            None => Ok(operation.await),
        }
    }
}
