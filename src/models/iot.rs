//! 学校 / 房间 / 传感器模型
//!
//! 上游 API 视为可信：除提取标识与显示名外，条目原样保留

use serde::Serialize;
use serde_json::{Map, Value};

/// 上游用作标识的字段，按优先级排列
const ID_KEYS: [&str; 2] = ["uuid", "id"];

/// 上游用作显示名的字段
const NAME_KEYS: [&str; 3] = ["name", "displayName", "display_name"];

/// 序列化时由结构体字段占用的键
const RESERVED_KEYS: [&str; 2] = ["id", "name"];

macro_rules! entity {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Serialize)]
        pub struct $name {
            pub id: String,
            pub name: String,
            /// 上游响应中的其余字段，原样保留
            #[serde(flatten)]
            pub attributes: Map<String, Value>,
        }

        impl $name {
            pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
                Self {
                    id: id.into(),
                    name: name.into(),
                    attributes: Map::new(),
                }
            }
        }

        impl TryFrom<Value> for $name {
            type Error = String;

            fn try_from(value: Value) -> Result<Self, Self::Error> {
                let (id, name, attributes) = split_entry(value)?;
                Ok(Self { id, name, attributes })
            }
        }
    };
}

entity!(
    /// 学校（上游称为 main group）
    School
);

entity!(
    /// 房间（类型为 3 的 subgroup）
    Room
);

entity!(
    /// 传感器（上游称为 resource）
    Sensor
);

fn take_string(object: &mut Map<String, Value>, keys: &[&str]) -> Option<String> {
    for key in keys {
        match object.get(*key) {
            Some(Value::String(s)) if !s.is_empty() => {
                let s = s.clone();
                object.remove(*key);
                return Some(s);
            }
            Some(Value::Number(n)) => {
                let s = n.to_string();
                object.remove(*key);
                return Some(s);
            }
            _ => {}
        }
    }
    None
}

fn split_entry(value: Value) -> Result<(String, String, Map<String, Value>), String> {
    let Value::Object(mut object) = value else {
        return Err(format!("expected an object, got {}", kind_of(&value)));
    };

    let id = take_string(&mut object, &ID_KEYS)
        .ok_or_else(|| "entry has no identifier".to_string())?;
    // 无显示名时用标识代替
    let name = take_string(&mut object, &NAME_KEYS).unwrap_or_else(|| id.clone());

    // 未被选中的 `id` / `name` 会在序列化时覆盖提取出的字段
    for key in RESERVED_KEYS {
        object.remove(key);
    }

    Ok((id, name, object))
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// 一条传感器读数
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// 传感器最新读数的查询结果
#[derive(Debug, Clone, PartialEq)]
pub enum LatestReading {
    Recorded(SensorReading),
    /// 传感器存在但尚无读数
    NoData,
}

impl LatestReading {
    /// 解析 `/resource/{id}/latest` 的响应
    ///
    /// 空响应（`null`、`{}`、`[]` 或不含 value 的对象）视为 [`LatestReading::NoData`]；
    /// 数组取第一个元素，裸标量直接作为读数值。
    pub fn from_payload(payload: Value) -> Self {
        match payload {
            Value::Null => LatestReading::NoData,
            Value::Array(items) => match items.into_iter().next() {
                Some(first) => LatestReading::from_payload(first),
                None => LatestReading::NoData,
            },
            Value::Object(mut object) => {
                let value = match object.remove("value") {
                    None | Some(Value::Null) => return LatestReading::NoData,
                    Some(value) => value,
                };
                let timestamp = object.remove("timestamp").or_else(|| object.remove("time"));
                let unit = match object.remove("unit") {
                    Some(Value::String(unit)) => Some(unit),
                    Some(other) => {
                        object.insert("unit".to_string(), other);
                        None
                    }
                    None => None,
                };
                LatestReading::Recorded(SensorReading {
                    value,
                    timestamp,
                    unit,
                    attributes: object,
                })
            }
            Value::String(ref s) if s.trim().is_empty() => LatestReading::NoData,
            scalar => LatestReading::Recorded(SensorReading {
                value: scalar,
                timestamp: None,
                unit: None,
                attributes: Map::new(),
            }),
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, LatestReading::NoData)
    }

    /// 生成回复时交给模型的 JSON
    pub fn to_json(&self) -> Value {
        match self {
            LatestReading::Recorded(reading) => {
                serde_json::to_value(reading).unwrap_or(Value::Null)
            }
            LatestReading::NoData => serde_json::json!({
                "status": "no_data",
                "message": "No readings have been recorded for this sensor yet."
            }),
        }
    }
}
