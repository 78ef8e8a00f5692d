use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    Chat, ChatMessage, Memorial, MemorialStatus, MessageStatus, Notification, NotificationKind,
    Role, User,
};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the token issuer. Canonical
/// definition lives here in tribute-types to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub display_name: String,
    pub role: Role,
    pub exp: usize,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub community_reference: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub display_name: String,
    pub role: Role,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

// -- Users --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    pub location: Option<String>,
    pub phone_number: Option<String>,
    pub community_reference: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterDeviceTokenRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserFlagsRequest {
    pub is_verified: Option<bool>,
    pub is_disabled: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub location: Option<String>,
    pub phone_number: Option<String>,
    pub community_reference: Option<String>,
    pub role: Role,
    pub is_verified: bool,
    pub is_disabled: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        UserResponse {
            id: u.id,
            email: u.email,
            display_name: u.display_name,
            location: u.location,
            phone_number: u.phone_number,
            community_reference: u.community_reference,
            role: u.role,
            is_verified: u.is_verified,
            is_disabled: u.is_disabled,
            created_at: u.created_at,
        }
    }
}

// -- Memorials --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModerateMemorialRequest {
    /// Optional custom note shown to the submitter instead of the canned text.
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveSort {
    Newest,
    Oldest,
    Az,
    Za,
}

impl Default for ArchiveSort {
    fn default() -> Self {
        ArchiveSort::Newest
    }
}

#[derive(Debug, Deserialize)]
pub struct ArchiveQuery {
    #[serde(default)]
    pub search: Option<String>,
    /// Four-digit year matched as a prefix of date_of_passing.
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub sort: ArchiveSort,
}

#[derive(Debug, Serialize)]
pub struct MemorialResponse {
    pub id: Uuid,
    pub full_name: String,
    pub date_of_birth: Option<String>,
    pub date_of_passing: Option<String>,
    pub biography: String,
    /// Legacy single-photo field, derived: the first entry of image_urls.
    pub image_url: Option<String>,
    pub image_urls: Vec<String>,
    pub audio_tribute_url: Option<String>,
    pub legacy_document_url: Option<String>,
    pub posted_by: Uuid,
    pub posted_by_name: String,
    pub relationship: String,
    pub family_house: Option<String>,
    pub candles_lit: i64,
    pub status: MemorialStatus,
    /// Derived: true iff status == approved.
    pub is_approved: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Memorial> for MemorialResponse {
    fn from(m: Memorial) -> Self {
        let is_approved = m.is_approved();
        let image_url = m.image_url().map(str::to_owned);
        MemorialResponse {
            id: m.id,
            full_name: m.full_name,
            date_of_birth: m.date_of_birth,
            date_of_passing: m.date_of_passing,
            biography: m.biography,
            image_url,
            image_urls: m.image_urls,
            audio_tribute_url: m.audio_tribute_url,
            legacy_document_url: m.legacy_document_url,
            posted_by: m.posted_by,
            posted_by_name: m.posted_by_name,
            relationship: m.relationship,
            family_house: m.family_house,
            candles_lit: m.candles_lit,
            status: m.status,
            is_approved,
            created_at: m.created_at,
        }
    }
}

// -- Chats --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StartChatRequest {
    pub memorial_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub id: Uuid,
    pub participants: [Uuid; 2],
    pub counterpart_name: String,
    pub memorial_id: Option<Uuid>,
    pub memorial_name: Option<String>,
    pub last_message: String,
    pub last_message_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ChatResponse {
    /// Render a chat from the perspective of one participant.
    pub fn for_user(chat: Chat, user_id: Uuid) -> Self {
        let counterpart_name = if chat.participant_a == user_id {
            chat.participant_b_name.clone()
        } else {
            chat.participant_a_name.clone()
        };
        ChatResponse {
            id: chat.id,
            participants: chat.participants(),
            counterpart_name,
            memorial_id: chat.memorial_id,
            memorial_name: chat.memorial_name,
            last_message: chat.last_message,
            last_message_at: chat.last_message_at,
            created_at: chat.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub text: String,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub audio_url: Option<String>,
    pub image_url: Option<String>,
    pub status: MessageStatus,
    pub read_by: Vec<Uuid>,
    pub deleted_for_everyone: bool,
    pub created_at: DateTime<Utc>,
}

impl From<ChatMessage> for MessageResponse {
    fn from(m: ChatMessage) -> Self {
        MessageResponse {
            id: m.id,
            chat_id: m.chat_id,
            text: m.text,
            sender_id: m.sender_id,
            sender_name: m.sender_name,
            audio_url: m.audio_url,
            image_url: m.image_url,
            status: m.status,
            read_by: m.read_by,
            deleted_for_everyone: m.deleted_for_everyone,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    /// Number of messages newly marked as read.
    pub updated: usize,
}

// -- Notifications --

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub message: String,
    pub memorial_id: Option<Uuid>,
    pub memorial_name: Option<String>,
    pub chat_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Notification> for NotificationResponse {
    fn from(n: Notification) -> Self {
        NotificationResponse {
            id: n.id,
            kind: n.kind,
            message: n.message,
            memorial_id: n.memorial_id,
            memorial_name: n.memorial_name,
            chat_id: n.chat_id,
            is_read: n.is_read,
            created_at: n.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NotificationListResponse {
    pub unread_count: usize,
    pub notifications: Vec<NotificationResponse>,
}

// -- Uploads --

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub secure_url: String,
}
