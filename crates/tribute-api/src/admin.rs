use axum::{
    Extension, Json,
    extract::{Path, State},
};
use tracing::warn;
use uuid::Uuid;

use tribute_db::models::NewNotification;
use tribute_types::api::{
    Claims, MemorialResponse, ModerateMemorialRequest, UpdateUserFlagsRequest, UserResponse,
};
use tribute_types::events::StoreEvent;
use tribute_types::models::{MemorialStatus, NotificationKind};

use crate::auth::AppState;
use crate::error::ApiError;

/// Canned notification texts, used when the admin leaves the custom message
/// field empty.
pub const APPROVED_DEFAULT_MESSAGE: &str =
    "Your tribute has been approved and is now live on the Tribute Wall!";
pub const REJECTED_DEFAULT_MESSAGE: &str =
    "Your tribute was not approved at this time. Please contact an admin for more details.";

fn require_admin(claims: &Claims) -> Result<(), ApiError> {
    if claims.is_admin() {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

/// Admin view of every memorial, regardless of status.
pub async fn list_memorials(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<MemorialResponse>>, ApiError> {
    require_admin(&claims)?;
    let memorials = state.db.list_memorials()?;
    Ok(Json(memorials.into_iter().map(Into::into).collect()))
}

pub async fn approve_memorial(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ModerateMemorialRequest>,
) -> Result<Json<MemorialResponse>, ApiError> {
    require_admin(&claims)?;
    moderate(
        &state,
        id,
        MemorialStatus::Approved,
        NotificationKind::Approved,
        APPROVED_DEFAULT_MESSAGE,
        req.message,
    )
}

pub async fn reject_memorial(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ModerateMemorialRequest>,
) -> Result<Json<MemorialResponse>, ApiError> {
    require_admin(&claims)?;
    moderate(
        &state,
        id,
        MemorialStatus::Rejected,
        NotificationKind::Denied,
        REJECTED_DEFAULT_MESSAGE,
        req.message,
    )
}

/// The one transition the system must get right: flip the status (durable
/// first), then notify the submitter. The notification is best-effort — its
/// failure never rolls back the already-committed approval.
fn moderate(
    state: &AppState,
    id: Uuid,
    status: MemorialStatus,
    kind: NotificationKind,
    default_message: &str,
    custom_message: Option<String>,
) -> Result<Json<MemorialResponse>, ApiError> {
    let (before, after) = state
        .db
        .set_memorial_status(id, status)?
        .ok_or(ApiError::NotFound)?;

    let message = custom_message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(default_message);

    if let Err(e) = state.db.insert_notification(&NewNotification {
        user_id: after.posted_by,
        kind,
        message,
        memorial_id: Some(after.id),
        memorial_name: Some(&after.full_name),
        chat_id: None,
    }) {
        warn!("Failed to notify submitter of {} memorial {id}: {e}", status.as_str());
    }

    state.events.publish(StoreEvent::MemorialUpdated {
        before,
        after: after.clone(),
    });

    Ok(Json(after.into()))
}

/// Remove every memorial, in sequential batches bounded by the store's batch
/// size. Notifications referencing them are tolerated as orphans.
pub async fn clear_memorials(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&claims)?;
    let db = state.db.clone();
    let deleted = tokio::task::spawn_blocking(move || db.clear_memorials())
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("spawn_blocking join error: {e}")))??;
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    require_admin(&claims)?;
    let users = state.db.list_users()?;
    Ok(Json(users.into_iter().map(Into::into).collect()))
}

/// Verify / disable toggles. Publishes the before/after transition so the
/// welcome-mail trigger can key off false -> true.
pub async fn update_user_flags(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateUserFlagsRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    require_admin(&claims)?;
    if req.is_verified.is_none() && req.is_disabled.is_none() {
        return Err(ApiError::Validation("nothing to update".into()));
    }

    let (before, after) = state
        .db
        .set_user_flags(id, req.is_verified, req.is_disabled)?
        .ok_or(ApiError::NotFound)?;

    state.events.publish(StoreEvent::UserUpdated {
        before,
        after: after.clone(),
    });

    Ok(Json(after.into()))
}
