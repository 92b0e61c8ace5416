use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};

use murmur_types::api::{Claims, SendMessageRequest};
use murmur_types::models::Message;

use crate::auth::AppState;
use crate::error::{ApiResult, path_id};

/// POST /messages: store the message, answer, then push it to both parties.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    let Json(req) = payload?;
    let new = req.validate()?;
    let from = claims.sub;

    let message = state
        .db
        .blocking(move |db| db.create_message(from, &new))
        .await?;

    let dispatcher = state.dispatcher.clone();
    let pushed = message.clone();
    tokio::spawn(async move {
        dispatcher.message_created(&pushed).await;
    });

    Ok((StatusCode::CREATED, Json(message)))
}

/// PUT /messages/{id}/read: recipient only.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Message>> {
    let message_id = path_id("messageId", &message_id)?;
    let me = claims.sub;

    let message = state
        .db
        .blocking(move |db| db.mark_message_read(message_id, me))
        .await?;
    Ok(Json(message))
}
