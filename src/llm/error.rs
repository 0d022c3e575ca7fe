//! LLM 错误类型

use thiserror::Error;

/// 调用语言模型时可能出现的错误
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// 模型 API 返回的 HTTP 状态码（若请求已到达）
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::ApiError { status, .. } => Some(*status),
            LlmError::Network(e) => e.status().map(|s| s.as_u16()),
            LlmError::InvalidResponse(_) => None,
        }
    }
}
