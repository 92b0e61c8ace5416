use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::Response,
};
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use axum_extra::typed_header::TypedHeaderRejection;
use serde::Deserialize;
use tracing::debug;

use murmur_gateway::connection;

use crate::auth::{AppState, verify_token};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    pub token: Option<String>,
}

/// GET /gateway: authenticate, then hand the socket to the gateway.
/// Browsers cannot set headers on a WebSocket handshake, so the token may
/// also arrive as `?token=`.
pub async fn upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let token = bearer
        .ok()
        .map(|TypedHeader(Authorization(b))| b.token().to_string())
        .or(query.token)
        .ok_or(ApiError::Unauthorized)?;

    let claims = verify_token(&state.jwt_secret, &token).map_err(|e| {
        debug!("rejected gateway token: {}", e);
        ApiError::Unauthorized
    })?;

    let dispatcher = state.dispatcher.clone();
    let db = state.db.clone();
    Ok(ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, dispatcher, db, claims.sub, claims.username)
    }))
}
