//! 测试公共模块
//! 提供测试配置、IoT API 桩服务器以及 LLM / IoT 替身

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use iot_chat::{
    config::{AppConfig, IotConfig, LlmConfig, LoggingConfig, ServerConfig, SessionConfig},
    llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError, StopReason, TokenUsage},
    middleware::AppState,
    models::{LatestReading, Room, School, Sensor, SensorReading},
    services::{ChatService, IotApi, IotError},
    session::SessionStore,
};
use secrecy::Secret;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const TEST_USERNAME: &str = "facilities";
pub const TEST_PASSWORD: &str = "hunter2";
pub const TEST_CLIENT_ID: &str = "chat-frontend";
pub const TEST_CLIENT_SECRET: &str = "s3cret";

/// base64("chat-frontend:s3cret")
const EXPECTED_BASIC: &str = "Basic Y2hhdC1mcm9udGVuZDpzM2NyZXQ=";

// ==================== 配置 ====================

pub fn create_iot_config(base_url: &str, token_url: &str, cache_token: bool) -> IotConfig {
    IotConfig {
        base_url: base_url.to_string(),
        token_url: token_url.to_string(),
        username: Secret::new(TEST_USERNAME.to_string()),
        password: Secret::new(TEST_PASSWORD.to_string()),
        client_id: TEST_CLIENT_ID.to_string(),
        client_secret: Secret::new(TEST_CLIENT_SECRET.to_string()),
        cache_token,
        request_timeout_secs: 5,
    }
}

/// 创建测试配置
pub fn create_test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            addr: "127.0.0.1:0".to_string(),
            graceful_shutdown_timeout_secs: 5,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
        },
        iot: create_iot_config("http://127.0.0.1:9/api", "http://127.0.0.1:9/oauth/token", true),
        llm: LlmConfig {
            api_key: Secret::new("sk-test".to_string()),
            base_url: "http://127.0.0.1:9".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 1500,
            timeout_secs: 5,
        },
        session: SessionConfig {
            secret: Secret::new("test-session-secret".to_string()),
            idle_timeout_secs: 3600,
        },
    }
}

/// 使用替身构建应用状态
pub fn create_test_app_state(llm: Arc<dyn LlmClient>, iot: Arc<dyn IotApi>) -> Arc<AppState> {
    let config = create_test_config();
    Arc::new(AppState {
        chat_service: Arc::new(ChatService::new(llm, iot, config.llm.max_tokens)),
        sessions: Arc::new(SessionStore::from_config(&config.session)),
        config,
    })
}

// ==================== IoT API 桩服务器 ====================

pub struct StubCounters {
    pub token_requests: AtomicUsize,
    pub data_requests: AtomicUsize,
    /// 令牌端点返回的 `expires_in`
    pub token_lifetime: AtomicU64,
    /// 下一次数据请求返回 401
    pub reject_next: AtomicBool,
}

impl Default for StubCounters {
    fn default() -> Self {
        Self {
            token_requests: AtomicUsize::new(0),
            data_requests: AtomicUsize::new(0),
            token_lifetime: AtomicU64::new(3600),
            reject_next: AtomicBool::new(false),
        }
    }
}

/// 进程内的 OAuth 端点与学校/房间/传感器 API 桩
pub struct StubIotServer {
    pub base_url: String,
    pub origin: String,
    pub counters: Arc<StubCounters>,
}

impl StubIotServer {
    pub async fn start() -> Self {
        let counters = Arc::new(StubCounters::default());

        let app = Router::new()
            .route("/oauth/token", post(token))
            .route("/oauth/broken", post(|| async { (StatusCode::OK, "<html>oops</html>") }))
            .route("/oauth/no-token", post(|| async { Json(json!({ "token_type": "bearer" })) }))
            .route("/api/group/main", get(schools))
            .route("/api/group/{id}/subgroup/{kind}", get(rooms))
            .route("/api/group/{id}/resource", get(sensors))
            .route("/api/resource/{id}/latest", get(latest))
            .with_state(counters.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind stub server");
        let addr = listener.local_addr().expect("Stub server has no address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Stub server crashed");
        });

        let origin = format!("http://{}", addr);
        Self {
            base_url: format!("{}/api", origin),
            origin,
            counters,
        }
    }

    pub fn token_url(&self) -> String {
        format!("{}/oauth/token", self.origin)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.origin, path)
    }

    pub fn iot_config(&self, cache_token: bool) -> IotConfig {
        create_iot_config(&self.base_url, &self.token_url(), cache_token)
    }

    pub fn set_token_lifetime(&self, secs: u64) {
        self.counters.token_lifetime.store(secs, Ordering::SeqCst);
    }

    pub fn reject_next_data_request(&self) {
        self.counters.reject_next.store(true, Ordering::SeqCst);
    }

    pub fn token_requests(&self) -> usize {
        self.counters.token_requests.load(Ordering::SeqCst)
    }

    pub fn data_requests(&self) -> usize {
        self.counters.data_requests.load(Ordering::SeqCst)
    }
}

async fn token(
    State(counters): State<Arc<StubCounters>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let n = counters.token_requests.fetch_add(1, Ordering::SeqCst) + 1;

    let basic = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if basic != EXPECTED_BASIC {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "invalid_client" }))).into_response();
    }

    let field = |name: &str| form.get(name).map(String::as_str);
    if field("grant_type") != Some("password")
        || field("username") != Some(TEST_USERNAME)
        || field("password") != Some(TEST_PASSWORD)
    {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "invalid_grant" }))).into_response();
    }

    Json(json!({
        "access_token": format!("tok-{}", n),
        "token_type": "bearer",
        "expires_in": counters.token_lifetime.load(Ordering::SeqCst)
    }))
    .into_response()
}

fn authorized(counters: &StubCounters, headers: &HeaderMap) -> bool {
    counters.data_requests.fetch_add(1, Ordering::SeqCst);
    if counters.reject_next.swap(false, Ordering::SeqCst) {
        return false;
    }
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Bearer tok-"))
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": "invalid_token" }))).into_response()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" }))).into_response()
}

async fn schools(State(counters): State<Arc<StubCounters>>, headers: HeaderMap) -> Response {
    if !authorized(&counters, &headers) {
        return unauthorized();
    }
    Json(json!({
        "data": [
            { "uuid": "sch-oak", "id": 1, "name": "Oak Elementary" },
            { "uuid": "sch-pine", "name": "Pine Middle" }
        ],
        "total": 2
    }))
    .into_response()
}

async fn rooms(
    State(counters): State<Arc<StubCounters>>,
    headers: HeaderMap,
    Path((id, kind)): Path<(String, String)>,
) -> Response {
    if !authorized(&counters, &headers) {
        return unauthorized();
    }
    match (id.as_str(), kind.as_str()) {
        ("sch-oak", "3") => Json(json!([
            { "uuid": "room-101", "name": "Room 101", "floor": 1 },
            { "uuid": "room-gym", "name": "Gym" }
        ]))
        .into_response(),
        ("sch-empty", "3") => Json(json!({ "total": 0 })).into_response(),
        _ => not_found(),
    }
}

async fn sensors(
    State(counters): State<Arc<StubCounters>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !authorized(&counters, &headers) {
        return unauthorized();
    }
    match id.as_str() {
        "room-101" => Json(json!([
            { "uuid": "sensor-temp", "name": "Temperature" },
            { "uuid": "sensor-co2", "name": "CO2" }
        ]))
        .into_response(),
        "room-mixed" => Json(json!([
            { "uuid": "sensor-a", "name": "Humidity" },
            { "name": "Unlabelled" },
            "junk"
        ]))
        .into_response(),
        _ => not_found(),
    }
}

async fn latest(
    State(counters): State<Arc<StubCounters>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !authorized(&counters, &headers) {
        return unauthorized();
    }
    match id.as_str() {
        "sensor-temp" => Json(json!({
            "value": 21.5,
            "unit": "°C",
            "timestamp": "2024-03-01T08:00:00Z"
        }))
        .into_response(),
        "sensor-idle" => StatusCode::OK.into_response(),
        "sensor-co2" => Json(json!({})).into_response(),
        _ => not_found(),
    }
}

// ==================== LLM 替身 ====================

type Reply = Box<dyn Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync>;

/// 按脚本回复并记录每次请求的语言模型替身
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_text(self, text: &str) -> Self {
        let text = text.to_string();
        self.then_fn(move |_| Ok(text.clone()))
    }

    pub fn then_error(self, status: u16) -> Self {
        self.then_fn(move |_| {
            Err(LlmError::ApiError {
                status,
                message: "scripted failure".to_string(),
            })
        })
    }

    pub fn then_fn<F>(self, reply: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        self.replies.lock().unwrap().push_back(Box::new(reply));
        self
    }

    /// 渲染回复：列出提示词数据中的每个 `name`
    pub fn then_list_names(self) -> Self {
        self.then_fn(|request| Ok(list_names(&data_from_prompt(&request.system_prompt))))
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::InvalidResponse("script exhausted".to_string()))?;

        let content = reply(&request)?;
        Ok(CompletionResponse {
            content,
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage::default(),
        })
    }
}

/// 渲染提示词中 `<data>` 标签内的 JSON（缺失时为 `Null`）
pub fn data_from_prompt(prompt: &str) -> Value {
    let Some(start) = prompt.find("<data>") else {
        return Value::Null;
    };
    let Some(end) = prompt.find("</data>") else {
        return Value::Null;
    };
    serde_json::from_str(prompt[start + "<data>".len()..end].trim()).unwrap_or(Value::Null)
}

fn list_names(data: &Value) -> String {
    let names: Vec<String> = data
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item["name"].as_str())
                .map(|name| format!("- {}", name))
                .collect()
        })
        .unwrap_or_default();
    if names.is_empty() {
        "Nothing found.".to_string()
    } else {
        names.join("\n")
    }
}

// ==================== IoT 替身 ====================

/// 内存中的 [`IotApi`] 替身，统计调用次数并可让房间查询失败
#[derive(Default)]
pub struct FakeIot {
    pub schools: Vec<School>,
    pub fail_rooms: bool,
    pub latest: Option<LatestReading>,
    pub calls: AtomicUsize,
}

impl FakeIot {
    pub fn with_schools(names: &[(&str, &str)]) -> Self {
        Self {
            schools: names.iter().map(|(id, name)| School::new(*id, *name)).collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IotApi for FakeIot {
    async fn list_schools(&self) -> Result<Vec<School>, IotError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.schools.clone())
    }

    async fn list_rooms(&self, school_id: &str) -> Result<Vec<Room>, IotError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_rooms {
            return Err(IotError::upstream(
                Some(404),
                format!("GET /group/{}/subgroup/3 returned 404", school_id),
            ));
        }
        Ok(vec![Room::new("room-101", "Room 101")])
    }

    async fn list_sensors(&self, _room_id: &str) -> Result<Vec<Sensor>, IotError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![Sensor::new("sensor-temp", "Temperature")])
    }

    async fn latest_value(&self, _sensor_id: &str) -> Result<LatestReading, IotError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.latest.clone().unwrap_or_else(|| {
            LatestReading::Recorded(SensorReading {
                value: json!(21.5),
                timestamp: None,
                unit: Some("°C".to_string()),
                attributes: Default::default(),
            })
        }))
    }
}
