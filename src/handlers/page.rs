//! 对话页面

use axum::{http::Uri, response::Html};

use crate::error::AppError;

const INDEX_HTML: &str = include_str!("../../static/index.html");

/// 返回单页对话界面
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// 未匹配路由
pub async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(uri.path().to_string())
}
