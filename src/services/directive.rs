//! 分类调用产出的指令
//!
//! 模型对分类提示词只回复一个 JSON 对象，例如
//! `{"action": "list_rooms", "school": "<school id>"}`，
//! 不符合已知结构的输出一律拒绝

use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

use crate::models::iot::kind_of;

/// 模型决定获取的数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// 仅根据对话作答
    NoData,
    ListSchools,
    /// `school` 为模型从之前列表中选取的标识
    ListRooms { school: String },
    ListSensors { room: String },
    LatestValue { sensor: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DirectiveError {
    #[error("classifier output is not JSON: {0}")]
    NotJson(String),

    #[error("classifier output must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("classifier output has no string `action` field")]
    MissingAction,

    #[error("unknown action `{0}`")]
    UnknownAction(String),

    #[error("action `{action}` requires a non-empty `{param}`")]
    MissingParameter {
        action: &'static str,
        param: &'static str,
    },
}

impl Directive {
    /// 动作的线上名称
    pub fn action(&self) -> &'static str {
        match self {
            Directive::NoData => "none",
            Directive::ListSchools => "list_schools",
            Directive::ListRooms { .. } => "list_rooms",
            Directive::ListSensors { .. } => "list_sensors",
            Directive::LatestValue { .. } => "latest_value",
        }
    }

    /// 解析分类调用的原始输出
    pub fn parse(raw: &str) -> Result<Self, DirectiveError> {
        let text = strip_code_fence(raw.trim());
        let value: Value =
            serde_json::from_str(text).map_err(|e| DirectiveError::NotJson(e.to_string()))?;

        let Value::Object(object) = value else {
            return Err(DirectiveError::NotAnObject(kind_of(&value)));
        };

        let action = object
            .get("action")
            .and_then(Value::as_str)
            .ok_or(DirectiveError::MissingAction)?;

        match action {
            "none" => Ok(Directive::NoData),
            "list_schools" => Ok(Directive::ListSchools),
            "list_rooms" => Ok(Directive::ListRooms {
                school: required(&object, "list_rooms", "school")?,
            }),
            "list_sensors" => Ok(Directive::ListSensors {
                room: required(&object, "list_sensors", "room")?,
            }),
            "latest_value" => Ok(Directive::LatestValue {
                sensor: required(&object, "latest_value", "sensor")?,
            }),
            other => Err(DirectiveError::UnknownAction(other.to_string())),
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::NoData | Directive::ListSchools => f.write_str(self.action()),
            Directive::ListRooms { school } => write!(f, "list_rooms(school={})", school),
            Directive::ListSensors { room } => write!(f, "list_sensors(room={})", room),
            Directive::LatestValue { sensor } => write!(f, "latest_value(sensor={})", sensor),
        }
    }
}

fn required(
    object: &Map<String, Value>,
    action: &'static str,
    param: &'static str,
) -> Result<String, DirectiveError> {
    object
        .get(param)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(DirectiveError::MissingParameter { action, param })
}

/// 去掉外层的 Markdown 代码块（```json ... ```）
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return text;
    };
    // 去掉首行的语言标记（如 `json`）
    match body.find('\n') {
        Some(newline) if !body[..newline].trim_start().starts_with('{') => body[newline + 1..].trim(),
        _ => body.trim(),
    }
}
