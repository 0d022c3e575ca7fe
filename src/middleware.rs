//! HTTP 中间件
//! 请求追踪、会话 Cookie

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    services::ChatService,
    session::{find_cookie, SessionId, SessionStore, SESSION_COOKIE},
};

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    pub config: crate::config::AppConfig,
    pub chat_service: Arc<ChatService>,
    pub sessions: Arc<SessionStore>,
}

/// 请求追踪中间件
/// 为每个请求生成 trace_id 和 request_id，并记录指标
pub async fn request_tracking_middleware(req: Request, next: Next) -> Response {
    let trace_id = extract_or_generate_trace_id(req.headers());
    let request_id = Uuid::new_v4().to_string();

    let method = req.method().to_string();
    let uri = req.uri().path().to_string();

    let span = tracing::info_span!(
        "http_request",
        trace_id = %trace_id,
        request_id = %request_id,
        method = %method,
        uri = %uri,
    );

    async move {
        let start = Instant::now();

        let mut response = next.run(req).await;

        let elapsed = start.elapsed();
        let status = response.status().as_u16();

        let method_name = match method.as_str() {
            "GET" => "GET",
            "POST" => "POST",
            _ => "OTHER",
        };
        let status_class = match status {
            200..=299 => "2xx",
            400..=499 => "4xx",
            500..=599 => "5xx",
            _ => "other",
        };
        metrics::counter!("http_requests_total", "method" => method_name, "status" => status_class)
            .increment(1);
        metrics::histogram!("http_request_duration_seconds").record(elapsed.as_secs_f64());

        tracing::info!(
            method = %method,
            uri = %uri,
            status = status,
            elapsed_ms = elapsed.as_millis(),
            "Request completed"
        );

        // 在响应头中添加 trace_id
        if let Ok(value) = HeaderValue::from_str(&trace_id) {
            response.headers_mut().insert("x-trace-id", value);
        }
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert("x-request-id", value);
        }

        response
    }
    .instrument(span)
    .await
}

/// 从请求头中提取或生成 trace_id
fn extract_or_generate_trace_id(headers: &HeaderMap) -> String {
    headers
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty() && s.len() <= 128)
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// 会话中间件
/// 读取并校验会话 Cookie，缺失或被篡改时分配新会话
pub async fn session_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let existing = req
        .headers()
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|h| find_cookie(h, SESSION_COOKIE))
        .and_then(|value| state.sessions.verify(value));

    let (session_id, is_new) = match existing {
        Some(id) => (id, false),
        None => (SessionId::new(), true),
    };

    req.extensions_mut().insert(session_id);
    let mut response = next.run(req).await;

    if is_new {
        let cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            SESSION_COOKIE,
            state.sessions.cookie_value(&session_id)
        );
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        tracing::debug!(session = %session_id, "Issued session cookie");
    }

    response
}
