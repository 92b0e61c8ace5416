use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::auth::AppState;
use crate::middleware::require_auth;
use crate::{conversations, messages, notifications, realtime};

/// Every REST route plus the realtime upgrade.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/conversations",
            post(conversations::create_conversation).get(conversations::list_conversations),
        )
        .route(
            "/conversations/{conversation_id}",
            get(conversations::get_messages).delete(conversations::delete_conversation),
        )
        .route("/conversations/{conversation_id}/read", put(conversations::mark_read))
        .route("/messages", post(messages::send_message))
        .route("/messages/{message_id}/read", put(messages::mark_read))
        .route(
            "/notifications",
            get(notifications::list_notifications).delete(notifications::clear_notifications),
        )
        .route("/notifications/read-all", put(notifications::mark_all_read))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    // The upgrade authenticates on its own (token may be in the query string).
    let gateway = Router::new()
        .route("/gateway", get(realtime::upgrade))
        .with_state(state);

    Router::new().merge(protected).merge(gateway)
}
