//! 会话池
//!
//! 持有全部 Notion 会话，负责轮询选择与失效管理。
//! 轮询指针与有效性集合只在池内部的互斥锁下读写，
//! 外部通过 `SessionLease` 获取单次请求使用的会话。

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use super::loader::CredentialSource;
use super::types::{PoolStatus, Session, SessionStats, SessionView};
use crate::logger::mask_secret;
use crate::providers::IdentityResolver;

/// 会话池错误
#[derive(Error, Debug, Clone)]
pub enum PoolError {
    /// 凭证源没有产生任何会话
    #[error("凭证源中没有任何可用凭证")]
    NoCredentials,

    /// 池中没有有效会话
    #[error("没有有效的 Notion 会话")]
    Exhausted,

    /// 读取凭证文件失败
    #[error("读取凭证文件失败 {path}: {reason}")]
    Io {
        path: std::path::PathBuf,
        reason: String,
    },

    /// 凭证文件格式错误
    #[error("凭证文件格式错误: {0}")]
    Parse(String),
}

#[derive(Debug)]
struct SessionRecord {
    session: Arc<Session>,
    valid: bool,
    stats: SessionStats,
}

#[derive(Debug)]
struct PoolInner {
    records: Vec<SessionRecord>,
    /// 轮询指针；存在有效会话时总是指向一个有效会话
    cursor: usize,
}

impl PoolInner {
    fn valid_count(&self) -> usize {
        self.records.iter().filter(|r| r.valid).count()
    }

    /// 从 `from` 之后（环绕，最后才回到 `from` 自身）查找下一个有效会话
    fn next_valid_after(&self, from: usize) -> Option<usize> {
        let n = self.records.len();
        (1..=n)
            .map(|step| (from + step) % n)
            .find(|&i| self.records[i].valid)
    }

    fn position(&self, user_id: &str) -> Option<usize> {
        self.records
            .iter()
            .position(|r| r.session.user_id == user_id)
    }

    fn advance(&mut self) {
        if let Some(next) = self.next_valid_after(self.cursor) {
            self.cursor = next;
        }
    }

    fn current(&self) -> Option<&SessionRecord> {
        self.records.get(self.cursor).filter(|r| r.valid)
    }
}

/// 会话池
#[derive(Debug)]
pub struct SessionPool {
    inner: Mutex<PoolInner>,
}

impl SessionPool {
    /// 从已解析的会话创建池
    ///
    /// 相同 user_id 的会话只保留第一个。
    pub fn new(sessions: Vec<Session>) -> Result<Self, PoolError> {
        let mut seen = HashSet::new();
        let records: Vec<SessionRecord> = sessions
            .into_iter()
            .filter(|s| {
                let fresh = seen.insert(s.user_id.clone());
                if !fresh {
                    tracing::warn!("[POOL] 跳过重复的会话: {}", s.user_id);
                }
                fresh
            })
            .map(|session| SessionRecord {
                session: Arc::new(session),
                valid: true,
                stats: SessionStats::default(),
            })
            .collect();

        if records.is_empty() {
            return Err(PoolError::NoCredentials);
        }

        Ok(Self {
            inner: Mutex::new(PoolInner { records, cursor: 0 }),
        })
    }

    /// 从凭证源初始化会话池
    ///
    /// # 参数
    /// - `source`: 凭证源
    /// - `resolver`: 为缺少身份信息的条目解析 user_id / space_id
    ///
    /// # 返回
    /// - `Err(PoolError::NoCredentials)`: 凭证源为空，或所有条目都无法解析
    pub async fn initialize(
        source: &CredentialSource,
        resolver: &dyn IdentityResolver,
    ) -> Result<Self, PoolError> {
        let entries = source.load().await?;
        if entries.is_empty() {
            return Err(PoolError::NoCredentials);
        }

        let total = entries.len();
        let mut sessions = Vec::with_capacity(total);
        for (index, entry) in entries.iter().enumerate() {
            let identity = match entry.explicit_identity() {
                Some(identity) => identity,
                None => match resolver.resolve(entry).await {
                    Ok(identity) => identity,
                    Err(e) => {
                        tracing::warn!("[POOL] 第 {} 个凭证身份解析失败，已跳过: {}", index + 1, e);
                        continue;
                    }
                },
            };
            tracing::info!(
                "[POOL] 第 {} 个凭证就绪: user={}, space={}",
                index + 1,
                identity.user_id,
                identity.space_id
            );
            sessions.push(Session::new(entry, identity));
        }

        let pool = Self::new(sessions)?;
        tracing::info!(
            "[POOL] 会话池初始化完成: {}/{} 个凭证可用",
            pool.valid_count(),
            total
        );
        Ok(pool)
    }

    /// 会话总数（含已失效）
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 有效会话数
    pub fn valid_count(&self) -> usize {
        self.inner.lock().valid_count()
    }

    /// 当前轮询位置的会话（不推进指针）
    pub fn current(&self) -> Option<Arc<Session>> {
        self.inner.lock().current().map(|r| r.session.clone())
    }

    /// 返回当前会话并把指针推进到下一个有效会话
    pub fn next(&self) -> Option<Arc<Session>> {
        let mut inner = self.inner.lock();
        let session = inner.current()?.session.clone();
        inner.advance();
        Some(session)
    }

    /// 将会话标记为永久失效
    ///
    /// # 返回
    /// - `true`: 本次调用使会话失效
    /// - `false`: 会话不存在或已失效
    pub fn invalidate(&self, user_id: &str) -> bool {
        let mut inner = self.inner.lock();
        let Some(index) = inner.position(user_id) else {
            return false;
        };
        if !inner.records[index].valid {
            return false;
        }

        inner.records[index].valid = false;
        if inner.cursor == index {
            inner.advance();
        }
        tracing::warn!(
            "[POOL] 会话已失效: {}，剩余有效会话 {}",
            user_id,
            inner.valid_count()
        );
        true
    }

    /// 为一次交换租用当前会话，并在同一把锁内把指针推进到下一个有效会话
    ///
    /// 并发的交换因此拿到不同的会话（有效会话足够时）。
    pub fn lease(self: &Arc<Self>) -> Result<SessionLease, PoolError> {
        let session = self.next().ok_or(PoolError::Exhausted)?;
        Ok(SessionLease {
            pool: Arc::clone(self),
            session,
            released: false,
        })
    }

    /// 记录一次完成的交换（只计数，不影响轮询）
    fn complete(&self, user_id: &str) {
        let mut inner = self.inner.lock();
        if let Some(index) = inner.position(user_id) {
            inner.records[index].stats.exchanges += 1;
        }
    }

    /// 记录上游未返回任何内容（移除候选信号）
    pub fn record_empty_response(&self, user_id: &str) {
        let mut inner = self.inner.lock();
        if let Some(index) = inner.position(user_id) {
            let stats = &mut inner.records[index].stats;
            stats.empty_responses += 1;
            tracing::warn!(
                "[POOL] 会话 {} 未收到上游内容 (累计 {} 次)",
                user_id,
                stats.empty_responses
            );
        }
    }

    /// 会话池状态快照
    pub fn status(&self) -> PoolStatus {
        let inner = self.inner.lock();
        let sessions = inner
            .records
            .iter()
            .enumerate()
            .map(|(index, r)| SessionView {
                index,
                user_id: r.session.user_id.clone(),
                space_id: r.session.space_id.clone(),
                valid: r.valid,
                cookie_preview: mask_secret(&r.session.cookie),
                stats: r.stats.clone(),
            })
            .collect();

        PoolStatus {
            total: inner.records.len(),
            valid: inner.valid_count(),
            current_index: inner.current().map(|_| inner.cursor),
            sessions,
        }
    }
}

/// 单次交换的会话租约
///
/// 租用时轮询指针已经推进。通过 `complete` 记录完成的交换，
/// 或通过 `invalidate` 让会话失效；直接丢弃租约（如客户端断开）不计数。
#[derive(Debug)]
pub struct SessionLease {
    pool: Arc<SessionPool>,
    session: Arc<Session>,
    released: bool,
}

impl SessionLease {
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn user_id(&self) -> &str {
        &self.session.user_id
    }

    /// 交换完成
    pub fn complete(mut self) {
        self.released = true;
        self.pool.complete(&self.session.user_id);
    }

    /// 使租用的会话失效
    pub fn invalidate(mut self) -> bool {
        self.released = true;
        self.pool.invalidate(&self.session.user_id)
    }

    /// 记录空响应
    pub fn record_empty_response(&self) {
        self.pool.record_empty_response(&self.session.user_id);
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if !self.released {
            tracing::debug!("[POOL] 会话 {} 的租约未完成即释放", self.session.user_id);
        }
    }
}
