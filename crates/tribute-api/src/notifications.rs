use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use tribute_types::api::{Claims, NotificationListResponse, NotificationResponse};

use crate::auth::AppState;
use crate::error::ApiError;

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<NotificationListResponse>, ApiError> {
    let notifications = state.db.list_notifications_for_user(claims.sub)?;
    let unread_count = notifications.iter().filter(|n| !n.is_read).count();
    Ok(Json(NotificationListResponse {
        unread_count,
        notifications: notifications
            .into_iter()
            .map(NotificationResponse::from)
            .collect(),
    }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    if !state.db.mark_notification_read(id, claims.sub)? {
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let updated = state.db.mark_all_notifications_read(claims.sub)?;
    Ok(Json(serde_json::json!({ "updated": updated })))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    if !state.db.delete_notification(id, claims.sub)? {
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Clear the caller's notifications, chunked at the store batch bound.
pub async fn clear_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let db = state.db.clone();
    let user_id = claims.sub;
    let deleted = tokio::task::spawn_blocking(move || db.clear_notifications(user_id))
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("spawn_blocking join error: {e}")))??;
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}
