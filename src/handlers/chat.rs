//! 对话接口的 HTTP 处理器

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::{
    error::AppError,
    middleware::AppState,
    models::{ChatRequest, ChatResponse, ClearResponse},
    session::SessionId,
};

/// 发送消息
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    session: SessionId,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(req) = payload?;
    req.validate().map_err(|e| AppError::validation(&e))?;

    let message = req.message.trim();
    if message.is_empty() {
        return Err(AppError::BadRequest("Message required".to_string()));
    }

    let conversation = state.sessions.conversation(session);
    // 同一会话的请求在此排队，保证按顺序追加
    let mut conversation = conversation.lock().await;

    let response = state
        .chat_service
        .process_message(&mut conversation, message)
        .await;

    Ok(Json(ChatResponse {
        response,
        conversation: conversation.turns().to_vec(),
    }))
}

/// 清空对话历史
pub async fn clear_conversation(
    State(state): State<Arc<AppState>>,
    session: SessionId,
) -> Json<ClearResponse> {
    let conversation = state.sessions.conversation(session);
    let mut conversation = conversation.lock().await;
    state.chat_service.clear(&mut conversation);

    Json(ClearResponse {
        status: "cleared".to_string(),
    })
}
