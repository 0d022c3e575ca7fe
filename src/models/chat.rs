//! 对话模型与对话接口的请求/响应 DTO

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 消息的发送方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// 对话记录中的一条
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// 单个会话的只追加对话记录
///
/// 每次调用模型时都会回放完整记录
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(Role::User, content.into());
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.push(Role::Assistant, content.into());
    }

    fn push(&mut self, role: Role, content: String) {
        self.turns.push(Turn {
            role,
            content,
            timestamp: Utc::now(),
        });
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

/// `POST /api/chat` 请求体
#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[serde(default)]
    #[validate(length(max = 4000, message = "Message is too long"))]
    pub message: String,
}

/// `POST /api/chat` 响应
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub conversation: Vec<Turn>,
}

/// `POST /api/clear` 响应
#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub status: String,
}
