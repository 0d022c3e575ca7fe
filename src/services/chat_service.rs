//! 对话服务：意图分类、数据获取与回复生成

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

use super::{
    directive::{Directive, DirectiveError},
    iot_client::{IotApi, IotError},
    prompts::{render_prompt, CLASSIFIER_PROMPT, CONVERSATION_PROMPT},
};
use crate::{
    llm::{CompletionRequest, LlmClient, LlmError, Message},
    models::Conversation,
};

/// 任一环节失败时用户看到的唯一回复
pub const GENERIC_FAILURE_REPLY: &str = "Sorry, something went wrong. Please try again.";

/// 指令只是一个简短的 JSON 对象
const CLASSIFIER_MAX_TOKENS: u32 = 256;

/// 处理单条消息时可能出现的错误
#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Iot(#[from] IotError),

    #[error("Language model error: {0}")]
    Model(#[from] LlmError),

    #[error("Invalid directive: {0}")]
    Directive(#[from] DirectiveError),
}

impl ChatError {
    /// 用于日志与指标的简短标签
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::Iot(IotError::Auth { .. }) => "auth",
            ChatError::Iot(IotError::Upstream { .. }) => "upstream",
            ChatError::Model(_) => "model",
            ChatError::Directive(_) => "directive",
        }
    }
}

pub struct ChatService {
    llm: Arc<dyn LlmClient>,
    iot: Arc<dyn IotApi>,
    max_tokens: u32,
}

impl ChatService {
    pub fn new(llm: Arc<dyn LlmClient>, iot: Arc<dyn IotApi>, max_tokens: u32) -> Self {
        Self { llm, iot, max_tokens }
    }

    /// 回答一条用户消息，并把两条记录写入 `conversation`
    ///
    /// 不会失败：错误记录日志后替换为 [`GENERIC_FAILURE_REPLY`]
    pub async fn process_message(&self, conversation: &mut Conversation, text: &str) -> String {
        conversation.push_user(text);

        let reply = match self.respond(conversation).await {
            Ok(reply) => {
                metrics::counter!("chat_messages_total", "outcome" => "ok").increment(1);
                reply
            }
            Err(e) => {
                metrics::counter!("chat_messages_total", "outcome" => e.kind()).increment(1);
                error!(kind = e.kind(), error = %e, "Failed to answer chat message");
                GENERIC_FAILURE_REPLY.to_string()
            }
        };

        conversation.push_assistant(reply.clone());
        reply
    }

    /// 清空 `conversation` 中的全部内容
    pub fn clear(&self, conversation: &mut Conversation) {
        debug!(turns = conversation.len(), "Clearing conversation");
        conversation.clear();
    }

    async fn respond(&self, conversation: &Conversation) -> Result<String, ChatError> {
        let messages: Vec<Message> = conversation.turns().iter().map(Message::from).collect();

        let directive = self.classify(messages.clone()).await?;
        info!(directive = %directive, "Message classified");

        let system_prompt = match self.fetch(&directive).await? {
            Some(data) => render_prompt(&directive, &data),
            None => CONVERSATION_PROMPT.to_string(),
        };

        let completion = self
            .llm
            .complete(CompletionRequest {
                system_prompt,
                messages,
                max_tokens: self.max_tokens,
            })
            .await?;

        Ok(completion.content.trim().to_string())
    }

    /// 让模型判断最新消息需要哪些数据
    pub async fn classify(&self, messages: Vec<Message>) -> Result<Directive, ChatError> {
        let completion = self
            .llm
            .complete(CompletionRequest {
                system_prompt: CLASSIFIER_PROMPT.to_string(),
                messages,
                max_tokens: CLASSIFIER_MAX_TOKENS.min(self.max_tokens),
            })
            .await?;

        Directive::parse(&completion.content).map_err(|e| {
            debug!(raw = %completion.content, "Classifier output rejected");
            ChatError::from(e)
        })
    }

    /// 执行指令要求的 API 调用；[`Directive::NoData`] 返回 `None`
    pub async fn fetch(&self, directive: &Directive) -> Result<Option<Value>, ChatError> {
        let data = match directive {
            Directive::NoData => return Ok(None),
            Directive::ListSchools => to_data(&self.iot.list_schools().await?),
            Directive::ListRooms { school } => to_data(&self.iot.list_rooms(school).await?),
            Directive::ListSensors { room } => to_data(&self.iot.list_sensors(room).await?),
            Directive::LatestValue { sensor } => self.iot.latest_value(sensor).await?.to_json(),
        };
        Ok(Some(data))
    }
}

fn to_data<T: Serialize>(items: &T) -> Value {
    serde_json::to_value(items).unwrap_or(Value::Null)
}
