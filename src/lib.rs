//! 学校 IoT 对话服务
//! 自然语言查询学校、房间、传感器与读数

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod llm;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod session;
pub mod telemetry;
