//! LLM 请求/响应类型
//!
//! 结构贴近 Anthropic Messages API，可直接发送，
//! 同时足够精简，便于测试替身实现

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::LlmError;
use crate::models::{Role, Turn};

/// 将提示词转换为文本的能力
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

/// 一次 LLM 调用所需的全部内容
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: String,

    /// 迄今为止的对话，按时间顺序，以用户消息结尾
    pub messages: Vec<Message>,

    pub max_tokens: u32,
}

/// 对话中的一条消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }
}

impl From<&Turn> for Message {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role,
            content: turn.content.clone(),
        }
    }
}

/// 补全请求的响应
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// 生成的文本（拼接所有文本块）
    pub content: String,

    pub stop_reason: StopReason,

    pub usage: TokenUsage,
}

/// 模型停止生成的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    Other(String),
}

impl StopReason {
    /// 解析 Anthropic API 的 stop_reason 字符串
    pub fn from_anthropic(s: &str) -> Self {
        match s {
            "end_turn" => StopReason::EndTurn,
            "max_tokens" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            other => StopReason::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}
