//! 数据模型模块
//! IoT 资源模型与会话模型

pub mod chat;
pub mod iot;

pub use chat::{ChatRequest, ChatResponse, ClearResponse, Conversation, Role, Turn};
pub use iot::{LatestReading, Room, School, Sensor, SensorReading};
