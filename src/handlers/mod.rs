//! HTTP 处理器模块

pub mod chat;
pub mod health;
pub mod page;
