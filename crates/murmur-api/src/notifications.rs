use axum::{
    Extension, Json,
    extract::State,
};
use tracing::error;

use murmur_types::api::{
    Claims, ClearNotificationsResponse, MarkAllReadResponse, NotificationsResponse,
};

use crate::auth::AppState;
use crate::error::ApiResult;

/// GET /notifications: newest first, plus how many are unread.
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<NotificationsResponse>> {
    let me = claims.sub;
    let notifications = state.db.blocking(move |db| db.list_notifications(me)).await?;
    let unread_count = notifications.iter().filter(|n| !n.read).count();

    Ok(Json(NotificationsResponse {
        notifications,
        unread_count,
    }))
}

/// PUT /notifications/read-all: mark everything read, then trim the
/// backlog to the retention cap. A failed trim is logged and reported as
/// zero purged; the read marking still stands.
pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<MarkAllReadResponse>> {
    let me = claims.sub;
    let updated_count = state
        .db
        .blocking(move |db| db.mark_all_notifications_read(me))
        .await?;

    let cap = state.notification_cap;
    let purged_count = match state
        .db
        .blocking(move |db| db.enforce_notification_retention(me, cap))
        .await
    {
        Ok(purged) => purged,
        Err(e) => {
            error!("notification retention for {} failed: {}", me, e);
            0
        }
    };

    Ok(Json(MarkAllReadResponse {
        updated_count,
        purged_count,
    }))
}

/// DELETE /notifications
pub async fn clear_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<ClearNotificationsResponse>> {
    let me = claims.sub;
    let deleted_count = state.db.blocking(move |db| db.clear_notifications(me)).await?;
    Ok(Json(ClearNotificationsResponse { deleted_count }))
}
