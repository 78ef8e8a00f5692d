use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::{error, warn};
use uuid::Uuid;

use tribute_db::models::{NewChat, NewMessage, NewNotification};
use tribute_types::api::{
    ChatResponse, Claims, MarkReadResponse, MessageResponse, SendMessageRequest, StartChatRequest,
};
use tribute_types::events::StoreEvent;
use tribute_types::models::{Chat, NotificationKind};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::memorials::require_active_user;

/// "Message the family": create-or-get the chat between the caller and the
/// memorial's submitter. Keyed on the sorted pair, so hitting this from both
/// sides at once still yields a single chat.
pub async fn start_chat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<StartChatRequest>,
) -> Result<(StatusCode, Json<ChatResponse>), ApiError> {
    let caller = require_active_user(&state, claims.sub)?;

    let memorial = state
        .db
        .get_memorial(req.memorial_id)?
        .ok_or(ApiError::NotFound)?;
    if memorial.posted_by == caller.id {
        return Err(ApiError::Validation(
            "you cannot open a chat with yourself".into(),
        ));
    }
    let poster = state
        .db
        .get_user_by_id(memorial.posted_by)?
        .ok_or(ApiError::NotFound)?;

    let (chat, created) = state.db.create_or_get_chat(&NewChat {
        id: Uuid::new_v4(),
        participant_a: caller.id,
        participant_b: poster.id,
        participant_a_name: &caller.display_name,
        participant_b_name: &poster.display_name,
        memorial_id: Some(memorial.id),
        memorial_name: Some(&memorial.full_name),
    })?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(ChatResponse::for_user(chat, caller.id))))
}

pub async fn list_chats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ChatResponse>>, ApiError> {
    let chats = state.db.list_chats_for_user(claims.sub)?;
    Ok(Json(
        chats
            .into_iter()
            .map(|chat| ChatResponse::for_user(chat, claims.sub))
            .collect(),
    ))
}

/// Messages in time order, as seen by this participant: rows they deleted
/// for themselves are omitted; delete-for-everyone rows come through as
/// already-blanked tombstones.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    require_participant(&state, chat_id, claims.sub)?;

    let db = state.db.clone();
    let messages = tokio::task::spawn_blocking(move || db.get_messages(chat_id))
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("spawn_blocking join error: {e}")))??;

    Ok(Json(
        messages
            .into_iter()
            .filter(|m| !m.hidden_from(claims.sub))
            .map(Into::into)
            .collect(),
    ))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let sender = require_active_user(&state, claims.sub)?;
    let chat = require_participant(&state, chat_id, sender.id)?;

    let text = req.text.as_deref().map(str::trim).unwrap_or_default();
    let audio_url = req.audio_url.as_deref().filter(|s| !s.is_empty());
    let image_url = req.image_url.as_deref().filter(|s| !s.is_empty());
    if text.is_empty() && audio_url.is_none() && image_url.is_none() {
        return Err(ApiError::Validation(
            "a message needs text, a photo or a voice note".into(),
        ));
    }

    // Denormalized preview on the chat list.
    let preview = if !text.is_empty() {
        text
    } else if image_url.is_some() {
        "Photo"
    } else {
        "Voice note"
    };

    let message = state.db.insert_message(&NewMessage {
        id: Uuid::new_v4(),
        chat_id,
        text,
        sender_id: sender.id,
        sender_name: &sender.display_name,
        audio_url,
        image_url,
        preview,
    })?;

    // In-app notification for the other participant; best-effort.
    if let Some(recipient) = chat.counterpart_of(sender.id) {
        let note = format!(
            "{} has sent you a message — click to view",
            sender.display_name
        );
        if let Err(e) = state.db.insert_notification(&NewNotification {
            user_id: recipient,
            kind: NotificationKind::Message,
            message: &note,
            memorial_id: None,
            memorial_name: chat.memorial_name.as_deref(),
            chat_id: Some(chat_id),
        }) {
            warn!("Failed to notify {recipient} of new message: {e}");
        }
    }

    state.events.publish(StoreEvent::MessageCreated {
        chat_id,
        message: message.clone(),
    });

    Ok((StatusCode::CREATED, Json(message.into())))
}

/// Mark-as-read on chat open. Idempotent: reopening an already-read chat
/// reports zero updates.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<MarkReadResponse>, ApiError> {
    require_participant(&state, chat_id, claims.sub)?;

    let db = state.db.clone();
    let reader = claims.sub;
    let updated = tokio::task::spawn_blocking(move || db.mark_messages_read(chat_id, reader))
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("spawn_blocking join error: {e}")))??;

    Ok(Json(MarkReadResponse { updated }))
}

/// Hide a message from the caller's own view. The row stays; the other
/// participant is unaffected.
pub async fn delete_for_me(
    State(state): State<AppState>,
    Path((chat_id, message_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    require_participant(&state, chat_id, claims.sub)?;

    if !state
        .db
        .delete_message_for_user(chat_id, message_id, claims.sub)?
    {
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Tombstone a message for both participants. Sender only; the content is
/// blanked in storage and the row renders as "message deleted".
pub async fn delete_for_everyone(
    State(state): State<AppState>,
    Path((chat_id, message_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    require_participant(&state, chat_id, claims.sub)?;

    let message = state
        .db
        .get_message(chat_id, message_id)?
        .ok_or(ApiError::NotFound)?;
    if message.sender_id != claims.sub {
        return Err(ApiError::Forbidden);
    }

    if !state.db.tombstone_message(chat_id, message_id)? {
        error!("Message {message_id} vanished while tombstoning");
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}

fn require_participant(state: &AppState, chat_id: Uuid, user_id: Uuid) -> Result<Chat, ApiError> {
    let chat = state.db.get_chat(chat_id)?.ok_or(ApiError::NotFound)?;
    if chat.counterpart_of(user_id).is_none() {
        return Err(ApiError::Forbidden);
    }
    Ok(chat)
}
