//! 故障转移实现
//!
//! 上游返回 401 时使当前会话失效并换下一个会话重试。
//! 重试次数以会话池大小为上限，每个会话最多尝试一次；
//! 每次重试都用新会话的身份重新构建请求，原始对话内容保持不变。

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use crate::credential::{Session, SessionLease, SessionPool};
use crate::error::RelayError;
use crate::logger::sanitize_log_message;
use crate::providers::UpstreamResponse;
use crate::resilience::timeout::{FirstByteDeadline, TimeoutConfig};

/// 错误响应体读取上限
const ERROR_BODY_LIMIT: usize = 4096;

/// 故障类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// 认证失败（会话失效）
    AuthenticationFailed,
    /// 服务不可用
    ServiceUnavailable,
    /// 其他错误
    Other,
}

impl FailureType {
    /// 从状态码检测故障类型
    pub fn detect(status_code: u16) -> Self {
        match status_code {
            401 => FailureType::AuthenticationFailed,
            502..=504 => FailureType::ServiceUnavailable,
            _ => FailureType::Other,
        }
    }

    /// 是否应切换会话重试
    pub fn triggers_failover(&self) -> bool {
        matches!(self, FailureType::AuthenticationFailed)
    }
}

/// 一次成功的上游调用
#[derive(Debug)]
pub struct FailoverOutcome {
    /// 本次交换持有的会话租约
    pub lease: SessionLease,
    /// 成功的上游响应（响应体尚未读取）
    pub response: UpstreamResponse,
    /// 首字节截止时间，读取第一个数据块时继续使用
    pub deadline: FirstByteDeadline,
    /// 实际尝试次数
    pub attempts: u32,
}

/// 故障转移控制器
#[derive(Debug, Clone)]
pub struct FailoverController {
    pool: Arc<SessionPool>,
    timeouts: TimeoutConfig,
}

impl FailoverController {
    pub fn new(pool: Arc<SessionPool>, timeouts: TimeoutConfig) -> Self {
        Self { pool, timeouts }
    }

    pub fn timeouts(&self) -> &TimeoutConfig {
        &self.timeouts
    }

    /// 执行一次交换
    ///
    /// `attempt` 接收本次使用的会话，负责构建请求并发送。
    ///
    /// # 返回
    /// - `Ok(FailoverOutcome)`: 2xx 响应
    /// - `Err(SessionExhausted)`: 所有会话都被拒绝或已失效
    /// - `Err(UpstreamStatus)`: 非 401 的错误状态，不切换会话
    /// - `Err(UpstreamTimeout)`: 首字节截止时间内没有收到响应头
    pub async fn execute<F, Fut>(&self, mut attempt: F) -> Result<FailoverOutcome, RelayError>
    where
        F: FnMut(Arc<Session>) -> Fut,
        Fut: Future<Output = Result<UpstreamResponse, RelayError>>,
    {
        let max_attempts = self.pool.len();
        let mut tried: HashSet<String> = HashSet::new();
        let mut attempts: u32 = 0;

        while tried.len() < max_attempts {
            let lease = match self.pool.lease() {
                Ok(lease) => lease,
                Err(_) => break,
            };
            if !tried.insert(lease.user_id().to_string()) {
                // 轮询回到了已尝试过的会话，没有发生交换
                drop(lease);
                break;
            }
            attempts += 1;

            let session = Arc::clone(lease.session());
            let deadline = self.timeouts.start_first_byte();
            let result = match deadline.guard(attempt(session)).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!("[FAILOVER] 用户 {} 的请求{}", lease.user_id(), e);
                    lease.complete();
                    return Err(RelayError::UpstreamTimeout {
                        timeout_ms: e.timeout_ms(),
                    });
                }
            };

            match result {
                Ok(response) if response.is_success() => {
                    if attempts > 1 {
                        tracing::info!(
                            "[FAILOVER] 第 {} 次尝试成功，用户: {}",
                            attempts,
                            lease.user_id()
                        );
                    }
                    return Ok(FailoverOutcome {
                        lease,
                        response,
                        deadline,
                        attempts,
                    });
                }
                Ok(response) => {
                    let status = response.status;
                    if FailureType::detect(status).triggers_failover() {
                        tracing::warn!(
                            "[FAILOVER] 用户 {} 认证失败 (401)，切换到下一个会话",
                            lease.user_id()
                        );
                        lease.invalidate();
                        continue;
                    }
                    let body = response.read_text(ERROR_BODY_LIMIT).await;
                    let message = sanitize_log_message(&body);
                    tracing::error!(
                        "[FAILOVER] 上游返回 {} ({:?}): {}",
                        status,
                        FailureType::detect(status),
                        message
                    );
                    lease.complete();
                    return Err(RelayError::UpstreamStatus { status, message });
                }
                Err(RelayError::UpstreamAuth(message)) => {
                    tracing::warn!(
                        "[FAILOVER] 用户 {} 认证失败: {}，切换到下一个会话",
                        lease.user_id(),
                        message
                    );
                    lease.invalidate();
                }
                Err(e) => {
                    tracing::error!("[FAILOVER] 上游调用失败: {}", e);
                    lease.complete();
                    return Err(e);
                }
            }
        }

        tracing::error!(
            "[FAILOVER] 所有会话均已失效，尝试 {} 次，有效会话 {}",
            attempts,
            self.pool.valid_count()
        );
        Err(RelayError::SessionExhausted { attempts })
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use futures::stream;

    fn session(n: usize) -> Session {
        Session {
            cookie: format!("token_v2=cookie{}", n),
            user_id: format!("user-{}", n),
            space_id: format!("space-{}", n),
            proxy_url: None,
        }
    }

    fn pool(n: usize) -> Arc<SessionPool> {
        Arc::new(SessionPool::new((0..n).map(session).collect()).unwrap())
    }

    fn response(status: u16, body: &'static str) -> UpstreamResponse {
        UpstreamResponse::new(
            status,
            Box::pin(stream::iter(vec![Ok::<_, RelayError>(bytes::Bytes::from_static(
                body.as_bytes(),
            ))])),
        )
    }

    #[test]
    fn test_failure_type_detect() {
        assert_eq!(FailureType::detect(401), FailureType::AuthenticationFailed);
        assert_eq!(FailureType::detect(503), FailureType::ServiceUnavailable);
        assert_eq!(FailureType::detect(403), FailureType::Other);
        assert_eq!(FailureType::detect(500), FailureType::Other);
        assert!(FailureType::detect(401).triggers_failover());
        assert!(!FailureType::detect(429).triggers_failover());
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let pool = pool(2);
        let controller = FailoverController::new(pool.clone(), TimeoutConfig::default());
        let outcome = controller
            .execute(|_| async { Ok(response(200, "")) })
            .await
            .unwrap();
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.lease.user_id(), "user-0");
        outcome.lease.complete();
        assert_eq!(pool.current().unwrap().user_id, "user-1");
    }

    #[tokio::test]
    async fn test_auth_failure_rotates() {
        let pool = pool(3);
        let controller = FailoverController::new(pool.clone(), TimeoutConfig::default());
        let outcome = controller
            .execute(|session| async move {
                if session.user_id == "user-0" {
                    Ok(response(401, "unauthorized"))
                } else {
                    Ok(response(200, ""))
                }
            })
            .await
            .unwrap();
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.lease.user_id(), "user-1");
        assert_eq!(pool.valid_count(), 2);
    }

    #[tokio::test]
    async fn test_all_rejected() {
        let pool = pool(3);
        let controller = FailoverController::new(pool.clone(), TimeoutConfig::default());
        let err = controller
            .execute(|_| async { Ok(response(401, "")) })
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::SessionExhausted { attempts: 3 }));
        assert_eq!(pool.valid_count(), 0);
        // 被拒绝的尝试不计为完成的交换
        assert!(pool.status().sessions.iter().all(|s| s.stats.exchanges == 0));
    }

    #[tokio::test]
    async fn test_transport_auth_error_rotates() {
        let pool = pool(2);
        let controller = FailoverController::new(pool.clone(), TimeoutConfig::default());
        let outcome = controller
            .execute(|session| async move {
                if session.user_id == "user-0" {
                    Err(RelayError::UpstreamAuth("expired".into()))
                } else {
                    Ok(response(200, ""))
                }
            })
            .await
            .unwrap();
        assert_eq!(outcome.lease.user_id(), "user-1");
    }

    #[tokio::test]
    async fn test_other_status_not_failed_over() {
        let pool = pool(3);
        let controller = FailoverController::new(pool.clone(), TimeoutConfig::default());
        let mut calls = 0;
        let err = controller
            .execute(|_| {
                calls += 1;
                async { Ok(response(500, "boom token_v2=secretvalue")) }
            })
            .await
            .unwrap_err();
        assert_eq!(calls, 1);
        match err {
            RelayError::UpstreamStatus { status, message } => {
                assert_eq!(status, 500);
                assert!(!message.contains("secretvalue"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(pool.valid_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_timeout() {
        let pool = pool(1);
        let controller = FailoverController::new(pool.clone(), TimeoutConfig::new(100, 0));
        let err = controller
            .execute(|_| async {
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                Ok(response(200, ""))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::UpstreamTimeout { timeout_ms: 100 }));
        assert_eq!(pool.valid_count(), 1);
    }
}
