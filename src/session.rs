//! 浏览器会话
//!
//! 每个浏览器持有一个签名的会话 Cookie，会话各自对应一段对话。
//! 空闲会话在访问时按间隔惰性清除。

use axum::{extract::FromRequestParts, http::request::Parts};
use dashmap::DashMap;
use secrecy::{ExposeSecret, Secret};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{config::SessionConfig, error::AppError, models::Conversation};

pub const SESSION_COOKIE: &str = "iot_chat_session";

/// 两次空闲清理之间的最短间隔
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// 浏览器会话标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// 由会话中间件写入
impl<S> FromRequestParts<S> for SessionId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionId>()
            .copied()
            .ok_or_else(|| AppError::Internal("session middleware not installed".to_string()))
    }
}

struct SessionEntry {
    conversation: Arc<Mutex<Conversation>>,
    last_seen: Instant,
}

/// 内存中的 会话 → 对话 映射
pub struct SessionStore {
    secret: Secret<String>,
    idle_timeout: Duration,
    sessions: DashMap<SessionId, SessionEntry>,
    started: Instant,
    /// 上次清理时间（相对 `started` 的毫秒数）
    last_sweep_ms: AtomicU64,
}

impl SessionStore {
    pub fn new(secret: Secret<String>, idle_timeout: Duration) -> Self {
        Self {
            secret,
            idle_timeout,
            sessions: DashMap::new(),
            started: Instant::now(),
            last_sweep_ms: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            config.secret.clone(),
            Duration::from_secs(config.idle_timeout_secs),
        )
    }

    // SHA-256(secret ":" uuid)
    fn signature(&self, id: &SessionId) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.expose_secret().as_bytes());
        hasher.update(b":");
        hasher.update(id.0.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// `id` 对应的 Cookie 值：`<uuid>.<signature>`
    pub fn cookie_value(&self, id: &SessionId) -> String {
        format!("{}.{}", id, self.signature(id))
    }

    /// 校验 Cookie 值，格式正确且签名有效时返回会话
    pub fn verify(&self, cookie_value: &str) -> Option<SessionId> {
        let (raw_id, signature) = cookie_value.split_once('.')?;
        let id = SessionId(Uuid::parse_str(raw_id).ok()?);
        let expected = self.signature(&id);
        if constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
            Some(id)
        } else {
            None
        }
    }

    /// `id` 对应的对话，首次访问时创建
    pub fn conversation(&self, id: SessionId) -> Arc<Mutex<Conversation>> {
        if self.sweep_due() {
            self.evict_idle();
        }

        let mut entry = self.sessions.entry(id).or_insert_with(|| {
            tracing::debug!(session = %id, "New chat session");
            SessionEntry {
                conversation: Arc::new(Mutex::new(Conversation::new())),
                last_seen: Instant::now(),
            }
        });
        entry.last_seen = Instant::now();
        entry.conversation.clone()
    }

    /// 距上次清理已超过间隔时返回 true，并发调用中只有一个会得到 true
    fn sweep_due(&self) -> bool {
        let interval = SWEEP_INTERVAL.min(self.idle_timeout).as_millis() as u64;
        let now = self.started.elapsed().as_millis() as u64;
        let last = self.last_sweep_ms.load(Ordering::Relaxed);
        now.saturating_sub(last) >= interval
            && self
                .last_sweep_ms
                .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
    }

    /// 清除空闲超时的会话，返回清除数量
    pub fn evict_idle(&self) -> usize {
        let before = self.sessions.len();
        let timeout = self.idle_timeout;
        self.sessions
            .retain(|_, entry| entry.last_seen.elapsed() < timeout);
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            tracing::info!(evicted, "Evicted idle chat sessions");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// 从 `Cookie` 头中取出 `name` 的值
pub fn find_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then_some(value)
    })
}
