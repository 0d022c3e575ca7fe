//! IoT API 的 OAuth 访问令牌获取
//! 使用 password grant，客户端凭据通过 HTTP Basic 认证发送

use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{config::IotConfig, services::IotError};

/// 令牌端点未返回 `expires_in` 时假定的有效期
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 300;

/// 令牌有效期上限，超出部分按上限处理
const MAX_TOKEN_LIFETIME_SECS: u64 = 24 * 60 * 60;

/// 距过期不足该时长的令牌视为已过期
const EXPIRY_MARGIN_SECS: u64 = 30;

/// IoT API 的 Bearer 令牌，原始字符串不离开本 crate
#[derive(Debug, Clone)]
pub struct AccessToken {
    value: Secret<String>,
    expires_at: Instant,
}

impl AccessToken {
    fn new(value: String, lifetime: Duration) -> Self {
        let now = Instant::now();
        let lifetime = lifetime.min(Duration::from_secs(MAX_TOKEN_LIFETIME_SECS));
        Self {
            value: Secret::new(value),
            expires_at: now.checked_add(lifetime).unwrap_or(now),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().is_empty()
    }

    /// `now` 时刻令牌是否仍可用
    pub fn is_fresh(&self, now: Instant) -> bool {
        now + Duration::from_secs(EXPIRY_MARGIN_SECS) < self.expires_at
    }

    pub(crate) fn bearer(&self) -> &str {
        self.value.expose_secret()
    }
}

/// 令牌端点响应
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

/// 用配置的凭据换取访问令牌，可选缓存
pub struct TokenProvider {
    http: Client,
    token_url: String,
    username: Secret<String>,
    password: Secret<String>,
    client_id: String,
    client_secret: Secret<String>,
    cache_enabled: bool,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenProvider {
    pub fn new(http: Client, config: &IotConfig) -> Self {
        Self {
            http,
            token_url: config.token_url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            cache_enabled: config.cache_token,
            cached: Mutex::new(None),
        }
    }

    /// 向令牌端点发起一次交换，不缓存、不重试
    pub async fn acquire_token(&self) -> Result<AccessToken, IotError> {
        debug!(token_url = %self.token_url, "acquire_token: called");

        let form = [
            ("grant_type", "password"),
            ("username", self.username.expose_secret().as_str()),
            ("password", self.password.expose_secret().as_str()),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
            .form(&form)
            .send()
            .await
            .map_err(|e| IotError::auth(None, format!("token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Token exchange rejected");
            return Err(IotError::auth(
                Some(status.as_u16()),
                format!("token endpoint returned {}: {}", status, body),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| IotError::auth(None, format!("failed to read token response: {}", e)))?;
        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| IotError::auth(None, format!("malformed token response: {}", e)))?;

        let value = parsed
            .access_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| IotError::auth(None, "token response has no access_token"))?;
        let lifetime = Duration::from_secs(parsed.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS));

        info!(expires_in_secs = lifetime.as_secs(), "Access token acquired");
        Ok(AccessToken::new(value, lifetime))
    }

    /// 供下一次数据请求使用的令牌：开启缓存且未过期时复用
    pub async fn token(&self) -> Result<AccessToken, IotError> {
        if !self.cache_enabled {
            return self.acquire_token().await;
        }

        // 交换期间持锁，并发调用只刷新一次
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.is_fresh(Instant::now()) {
                debug!("token: reusing cached token");
                return Ok(token.clone());
            }
        }

        let token = self.acquire_token().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// 丢弃缓存令牌，下次调用重新认证
    pub async fn invalidate(&self) {
        self.cached.lock().await.take();
    }
}
