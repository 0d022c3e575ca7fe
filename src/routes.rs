//! 路由注册
//! 创建所有路由并应用中间件

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

use crate::{handlers, middleware::AppState};

/// 请求体上限（字节）
const MAX_BODY_BYTES: usize = 64 * 1024;

/// 创建应用路由
pub fn create_router(state: Arc<AppState>) -> Router {
    // 公开端点（健康检查）
    let public_routes = Router::new().route("/health", get(handlers::health::health_check));

    // 页面与对话接口（按会话隔离）
    let session_routes = Router::new()
        .route("/", get(handlers::page::index))
        .route("/api/chat", post(handlers::chat::send_message))
        .route("/api/clear", post(handlers::chat::clear_conversation))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::session_middleware,
        ));

    // 组合所有路由
    Router::new()
        .merge(public_routes)
        .merge(session_routes)
        .fallback(handlers::page::not_found)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(axum::middleware::from_fn(crate::middleware::request_tracking_middleware))
        .with_state(state)
}
