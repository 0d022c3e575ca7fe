//! 业务逻辑服务层

pub mod chat_service;
pub mod directive;
pub mod iot_client;
pub mod prompts;

pub use chat_service::{ChatError, ChatService, GENERIC_FAILURE_REPLY};
pub use directive::{Directive, DirectiveError};
pub use iot_client::{IotApi, IotClient, IotError};
