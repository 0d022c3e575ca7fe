//! 配置系统
//! 从环境变量加载所有配置，使用 Secret 包装敏感信息

use config::{Config, ConfigError, Environment};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

/// 未配置时使用的会话密钥，仅适用于本地开发
pub const DEV_SESSION_SECRET: &str = "dev-secret-key";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址，例如 "0.0.0.0:5000"
    pub addr: String,
    /// 优雅关闭超时时间（秒）
    pub graceful_shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别: trace, debug, info, warn, error
    pub level: String,
    /// 日志格式: json, pretty
    pub format: String,
}

/// IoT API 连接与 OAuth 凭据
#[derive(Debug, Clone, Deserialize)]
pub struct IotConfig {
    /// 学校/房间/传感器 API 的基础 URL
    pub base_url: String,
    /// OAuth 令牌端点
    pub token_url: String,
    pub username: Secret<String>,
    pub password: Secret<String>,
    pub client_id: String,
    pub client_secret: Secret<String>,
    /// 在临近过期前复用访问令牌
    pub cache_token: bool,
    pub request_timeout_secs: u64,
}

/// 语言模型 API 配置
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub api_key: Secret<String>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Cookie 签名密钥
    pub secret: Secret<String>,
    /// 空闲超过该时长的会话将被清除
    pub idle_timeout_secs: u64,
}

impl SessionConfig {
    /// 是否仍在使用内置的开发密钥
    pub fn uses_default_secret(&self) -> bool {
        self.secret.expose_secret() == DEV_SESSION_SECRET
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub iot: IotConfig,
    pub llm: LlmConfig,
    pub session: SessionConfig,
}

impl AppConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Config::builder();

        // 添加默认配置
        settings = settings
            .set_default("server.addr", "0.0.0.0:5000")?
            .set_default("server.graceful_shutdown_timeout_secs", 30)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .set_default("iot.cache_token", true)?
            .set_default("iot.request_timeout_secs", 30)?
            .set_default("llm.base_url", "https://api.anthropic.com")?
            .set_default("llm.model", "claude-sonnet-4-20250514")?
            .set_default("llm.max_tokens", 1500)?
            .set_default("llm.timeout_secs", 60)?
            .set_default("session.secret", DEV_SESSION_SECRET)?
            .set_default("session.idle_timeout_secs", 86400)?;

        // 从环境变量加载配置（前缀为 IOTCHAT_）
        settings = settings.add_source(
            Environment::with_prefix("IOTCHAT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = settings.build()?.try_deserialize()?;

        // 验证配置
        config.validate()?;

        Ok(config)
    }

    /// 验证配置合法性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(port_str) = self.server.addr.split(':').next_back() {
            if let Ok(port) = port_str.parse::<u16>() {
                if port != 0 && port < 1024 {
                    return Err(ConfigError::Message("Server port should be >= 1024".to_string()));
                }
            }
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                )))
            }
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" => {}
            _ => {
                return Err(ConfigError::Message(format!(
                    "Invalid log format: {}. Must be one of: json, pretty",
                    self.logging.format
                )))
            }
        }

        for (name, url) in [
            ("iot.base_url", &self.iot.base_url),
            ("iot.token_url", &self.iot.token_url),
            ("llm.base_url", &self.llm.base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Message(format!(
                    "{} must be an http(s) URL, got: {}",
                    name, url
                )));
            }
        }

        if self.iot.client_id.trim().is_empty() {
            return Err(ConfigError::Message("iot.client_id must not be empty".to_string()));
        }

        if self.llm.api_key.expose_secret().trim().is_empty() {
            return Err(ConfigError::Message("llm.api_key must not be empty".to_string()));
        }

        if self.llm.max_tokens == 0 || self.llm.max_tokens > 8192 {
            return Err(ConfigError::Message(
                "llm.max_tokens must be between 1 and 8192".to_string(),
            ));
        }

        if self.iot.request_timeout_secs == 0 || self.llm.timeout_secs == 0 {
            return Err(ConfigError::Message("timeouts must be at least 1 second".to_string()));
        }

        if self.session.idle_timeout_secs < 60 {
            return Err(ConfigError::Message(
                "session.idle_timeout_secs must be at least 60".to_string(),
            ));
        }

        Ok(())
    }
}
