use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
};
use tracing::info;

use murmur_types::api::{
    Claims, CreateConversationRequest, CreateConversationResponse, DeleteConversationResponse,
    MarkConversationReadResponse, parse_id,
};
use murmur_types::models::{ConversationSummary, Message};

use crate::auth::AppState;
use crate::error::{ApiResult, path_id};

/// POST /conversations: find or create the caller's conversation with `userId`.
pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<CreateConversationRequest>, JsonRejection>,
) -> ApiResult<Json<CreateConversationResponse>> {
    let Json(req) = payload?;
    let other_id = parse_id("userId", req.user_id.as_deref())?;
    let me = claims.sub;

    let conversation = state
        .db
        .blocking(move |db| db.find_or_create_conversation(me, other_id))
        .await?;

    Ok(Json(CreateConversationResponse {
        conversation_id: conversation.id,
    }))
}

/// GET /conversations: the caller's inbox, most recent activity first.
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<ConversationSummary>>> {
    let me = claims.sub;
    let summaries = state.db.blocking(move |db| db.list_conversations(me)).await?;
    Ok(Json(summaries))
}

/// GET /conversations/{id}: full history, oldest first.
/// Marks everything addressed to the caller as read before returning.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<Message>>> {
    let conversation_id = path_id("conversationId", &conversation_id)?;
    let me = claims.sub;

    let messages = state
        .db
        .blocking(move |db| db.list_by_conversation(conversation_id, me))
        .await?;
    Ok(Json(messages))
}

/// PUT /conversations/{id}/read
pub async fn mark_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<MarkConversationReadResponse>> {
    let conversation_id = path_id("conversationId", &conversation_id)?;
    let me = claims.sub;

    let read = state
        .db
        .blocking(move |db| db.mark_conversation_read(conversation_id, me))
        .await?;
    let updated_count = read.updated.len();

    let dispatcher = state.dispatcher.clone();
    tokio::spawn(async move {
        dispatcher.conversation_read(&read.conversation, read.updated).await;
    });

    Ok(Json(MarkConversationReadResponse { updated_count }))
}

/// DELETE /conversations/{id}: participants only; removes every message too.
pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<DeleteConversationResponse>> {
    let conversation_id = path_id("conversationId", &conversation_id)?;
    let me = claims.sub;

    let deleted = state
        .db
        .blocking(move |db| db.delete_conversation(conversation_id, me))
        .await?;
    info!("{} deleted conversation {}", claims.username, conversation_id);

    let dispatcher = state.dispatcher.clone();
    let conversation = deleted.conversation;
    tokio::spawn(async move {
        dispatcher.conversation_deleted(&conversation).await;
    });

    Ok(Json(DeleteConversationResponse {
        conversation_id,
        deleted_messages: deleted.deleted_messages,
    }))
}
