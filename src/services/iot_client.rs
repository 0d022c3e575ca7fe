//! IoT API 客户端：学校、房间、传感器与最新读数

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    auth::TokenProvider,
    config::IotConfig,
    models::{iot::kind_of, LatestReading, Room, School, Sensor},
};

/// 上游 API 中房间对应的 subgroup 类型
pub const ROOM_SUBGROUP_TYPE: u8 = 3;

/// 列表被对象包裹时承载列表的字段
const COLLECTION_FIELD: &str = "data";

/// IoT API 错误
#[derive(Debug, Error)]
pub enum IotError {
    /// 令牌获取失败
    #[error("Authentication with IoT API failed: {message}")]
    Auth { status: Option<u16>, message: String },

    /// 数据请求返回非成功状态或无法使用的响应
    #[error("IoT API request failed: {message}")]
    Upstream { status: Option<u16>, message: String },
}

impl IotError {
    pub fn auth(status: Option<u16>, message: impl Into<String>) -> Self {
        IotError::Auth {
            status,
            message: message.into(),
        }
    }

    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        IotError::Upstream {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            IotError::Auth { status, .. } | IotError::Upstream { status, .. } => *status,
        }
    }
}

/// 对话服务可调用的四个只读操作
#[async_trait]
pub trait IotApi: Send + Sync {
    async fn list_schools(&self) -> Result<Vec<School>, IotError>;

    async fn list_rooms(&self, school_id: &str) -> Result<Vec<Room>, IotError>;

    async fn list_sensors(&self, room_id: &str) -> Result<Vec<Sensor>, IotError>;

    async fn latest_value(&self, sensor_id: &str) -> Result<LatestReading, IotError>;
}

/// 基于 reqwest 的 [`IotApi`]，通过 [`TokenProvider`] 认证
pub struct IotClient {
    http: Client,
    base_url: Url,
    tokens: TokenProvider,
}

impl IotClient {
    pub fn from_config(config: &IotConfig) -> Result<Self, IotError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| IotError::upstream(None, format!("failed to build HTTP client: {}", e)))?;

        let base_url = Url::parse(&config.base_url)
            .map_err(|e| IotError::upstream(None, format!("invalid base URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(IotError::upstream(None, "base URL cannot carry a path"));
        }

        let tokens = TokenProvider::new(http.clone(), config);

        Ok(Self {
            http,
            base_url,
            tokens,
        })
    }

    /// 拼接 `{base}/seg/seg/...`，每段做百分号编码
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// 带认证的 GET，返回解析后的 JSON（空响应体为 `Null`）
    async fn get_json(&self, segments: &[&str]) -> Result<Value, IotError> {
        let url = self.endpoint(segments);
        let token = self.tokens.token().await?;

        debug!(url = %url, "IoT API request");
        let response = self
            .http
            .get(url.clone())
            .bearer_auth(token.bearer())
            .send()
            .await
            .map_err(|e| IotError::upstream(None, format!("GET {} failed: {}", url.path(), e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), path = %url.path(), "IoT API returned an error");
            if status == reqwest::StatusCode::UNAUTHORIZED {
                self.tokens.invalidate().await;
            }
            return Err(IotError::upstream(
                Some(status.as_u16()),
                format!("GET {} returned {}: {}", url.path(), status, body),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| IotError::upstream(None, format!("failed to read response: {}", e)))?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body).map_err(|e| {
            IotError::upstream(None, format!("GET {} returned malformed JSON: {}", url.path(), e))
        })
    }

    async fn get_collection<T>(&self, segments: &[&str]) -> Result<Vec<T>, IotError>
    where
        T: TryFrom<Value, Error = String>,
    {
        let body = self.get_json(segments).await?;
        Ok(collect_entries(extract_collection(body)?))
    }
}

/// 从列表响应中取出条目
///
/// 裸数组直接使用；对象需在 `data` 中携带列表，缺少该字段视为空列表。
fn extract_collection(body: Value) -> Result<Vec<Value>, IotError> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        Value::Object(mut object) => match object.remove(COLLECTION_FIELD) {
            Some(Value::Array(items)) => Ok(items),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => Err(IotError::upstream(
                None,
                format!("expected `{}` to be an array, got {}", COLLECTION_FIELD, kind_of(&other)),
            )),
        },
        other => Err(IotError::upstream(
            None,
            format!("expected a collection, got {}", kind_of(&other)),
        )),
    }
}

/// 转换列表条目，跳过缺少标识或不是对象的条目
fn collect_entries<T>(items: Vec<Value>) -> Vec<T>
where
    T: TryFrom<Value, Error = String>,
{
    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match T::try_from(item) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(index, error = %e, "Skipping unusable collection entry");
                None
            }
        })
        .collect()
}

#[async_trait]
impl IotApi for IotClient {
    async fn list_schools(&self) -> Result<Vec<School>, IotError> {
        let schools: Vec<School> = self.get_collection(&["group", "main"]).await?;
        debug!(count = schools.len(), "list_schools: done");
        Ok(schools)
    }

    async fn list_rooms(&self, school_id: &str) -> Result<Vec<Room>, IotError> {
        let subgroup = ROOM_SUBGROUP_TYPE.to_string();
        let rooms: Vec<Room> = self
            .get_collection(&["group", school_id, "subgroup", subgroup.as_str()])
            .await?;
        debug!(school_id, count = rooms.len(), "list_rooms: done");
        Ok(rooms)
    }

    async fn list_sensors(&self, room_id: &str) -> Result<Vec<Sensor>, IotError> {
        let sensors: Vec<Sensor> = self.get_collection(&["group", room_id, "resource"]).await?;
        debug!(room_id, count = sensors.len(), "list_sensors: done");
        Ok(sensors)
    }

    async fn latest_value(&self, sensor_id: &str) -> Result<LatestReading, IotError> {
        let body = self.get_json(&["resource", sensor_id, "latest"]).await?;
        let reading = LatestReading::from_payload(body);
        debug!(sensor_id, no_data = reading.is_no_data(), "latest_value: done");
        Ok(reading)
    }
}
