//! 语言模型客户端
//!
//! 提供对话服务使用的补全 trait，
//! 以及基于 Anthropic Messages API 的实现

use std::sync::Arc;

use tracing::debug;

mod anthropic;
mod error;
mod types;

pub use anthropic::AnthropicClient;
pub use error::LlmError;
pub use types::{CompletionRequest, CompletionResponse, LlmClient, Message, StopReason, TokenUsage};

use crate::config::LlmConfig;

/// 按配置创建语言模型客户端
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(model = %config.model, base_url = %config.base_url, "create_client: called");
    Ok(Arc::new(AnthropicClient::from_config(config)?))
}
