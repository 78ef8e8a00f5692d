//! Database row types and write records. Rows map directly to SQLite rows and
//! are converted into the tribute-types domain models at the query layer,
//! keeping raw storage representation out of the rest of the workspace.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;

use tribute_types::models::{
    Chat, ChatMessage, Memorial, MemorialStatus, MessageStatus, Notification, NotificationKind,
    Role, User,
};

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub display_name: String,
    pub location: Option<String>,
    pub phone_number: Option<String>,
    pub community_reference: Option<String>,
    pub role: String,
    pub is_verified: bool,
    pub is_disabled: bool,
    pub created_at: String,
}

impl UserRow {
    pub fn into_user(self) -> Result<User> {
        Ok(User {
            id: parse_uuid(&self.id)?,
            email: self.email,
            display_name: self.display_name,
            location: self.location,
            phone_number: self.phone_number,
            community_reference: self.community_reference,
            role: Role::parse(&self.role)
                .with_context(|| format!("unknown role '{}'", self.role))?,
            is_verified: self.is_verified,
            is_disabled: self.is_disabled,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

pub struct MemorialRow {
    pub id: String,
    pub full_name: String,
    pub date_of_birth: Option<String>,
    pub date_of_passing: Option<String>,
    pub biography: String,
    pub image_urls: String,
    pub audio_tribute_url: Option<String>,
    pub legacy_document_url: Option<String>,
    pub posted_by: String,
    pub posted_by_name: String,
    pub relationship: String,
    pub family_house: Option<String>,
    pub candles_lit: i64,
    pub status: String,
    pub created_at: String,
}

impl MemorialRow {
    pub fn into_memorial(self) -> Result<Memorial> {
        Ok(Memorial {
            id: parse_uuid(&self.id)?,
            full_name: self.full_name,
            date_of_birth: self.date_of_birth,
            date_of_passing: self.date_of_passing,
            biography: self.biography,
            image_urls: decode_string_list(&self.image_urls)?,
            audio_tribute_url: self.audio_tribute_url,
            legacy_document_url: self.legacy_document_url,
            posted_by: parse_uuid(&self.posted_by)?,
            posted_by_name: self.posted_by_name,
            relationship: self.relationship,
            family_house: self.family_house,
            candles_lit: self.candles_lit,
            status: MemorialStatus::parse(&self.status)
                .with_context(|| format!("unknown memorial status '{}'", self.status))?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

pub struct ChatRow {
    pub id: String,
    pub participant_a: String,
    pub participant_b: String,
    pub participant_a_name: String,
    pub participant_b_name: String,
    pub memorial_id: Option<String>,
    pub memorial_name: Option<String>,
    pub last_message: String,
    pub last_message_at: String,
    pub created_at: String,
}

impl ChatRow {
    pub fn into_chat(self) -> Result<Chat> {
        Ok(Chat {
            id: parse_uuid(&self.id)?,
            participant_a: parse_uuid(&self.participant_a)?,
            participant_b: parse_uuid(&self.participant_b)?,
            participant_a_name: self.participant_a_name,
            participant_b_name: self.participant_b_name,
            memorial_id: self.memorial_id.as_deref().map(parse_uuid).transpose()?,
            memorial_name: self.memorial_name,
            last_message: self.last_message,
            last_message_at: parse_timestamp(&self.last_message_at)?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

pub struct MessageRow {
    pub id: String,
    pub chat_id: String,
    pub text: String,
    pub sender_id: String,
    pub sender_name: String,
    pub audio_url: Option<String>,
    pub image_url: Option<String>,
    pub status: String,
    pub read_by: String,
    pub deleted_for: String,
    pub deleted_for_everyone: bool,
    pub created_at: String,
}

impl MessageRow {
    pub fn into_message(self) -> Result<ChatMessage> {
        Ok(ChatMessage {
            id: parse_uuid(&self.id)?,
            chat_id: parse_uuid(&self.chat_id)?,
            text: self.text,
            sender_id: parse_uuid(&self.sender_id)?,
            sender_name: self.sender_name,
            audio_url: self.audio_url,
            image_url: self.image_url,
            status: MessageStatus::parse(&self.status)
                .with_context(|| format!("unknown message status '{}'", self.status))?,
            read_by: decode_uuid_list(&self.read_by)?,
            deleted_for: decode_uuid_list(&self.deleted_for)?,
            deleted_for_everyone: self.deleted_for_everyone,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub message: String,
    pub memorial_id: Option<String>,
    pub memorial_name: Option<String>,
    pub chat_id: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

impl NotificationRow {
    pub fn into_notification(self) -> Result<Notification> {
        Ok(Notification {
            id: parse_uuid(&self.id)?,
            user_id: parse_uuid(&self.user_id)?,
            kind: NotificationKind::parse(&self.kind)
                .with_context(|| format!("unknown notification kind '{}'", self.kind))?,
            message: self.message,
            memorial_id: self.memorial_id.as_deref().map(parse_uuid).transpose()?,
            memorial_name: self.memorial_name,
            chat_id: self.chat_id.as_deref().map(parse_uuid).transpose()?,
            is_read: self.is_read,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

pub struct MailRow {
    pub id: String,
    pub recipient: String,
    pub subject: String,
    pub html: String,
    pub created_at: String,
}

// -- Write records --

pub struct NewUser<'a> {
    pub id: Uuid,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub display_name: &'a str,
    pub location: Option<&'a str>,
    pub phone_number: Option<&'a str>,
    pub community_reference: Option<&'a str>,
    pub role: Role,
}

pub struct NewMemorial<'a> {
    pub id: Uuid,
    pub full_name: &'a str,
    pub date_of_birth: Option<&'a str>,
    pub date_of_passing: Option<&'a str>,
    pub biography: &'a str,
    pub image_urls: &'a [String],
    pub audio_tribute_url: Option<&'a str>,
    pub legacy_document_url: Option<&'a str>,
    pub posted_by: Uuid,
    pub posted_by_name: &'a str,
    pub relationship: &'a str,
    pub family_house: Option<&'a str>,
    pub status: MemorialStatus,
}

/// Content-only edit. There is deliberately no status field here: the update
/// statement built from this record cannot touch the lifecycle columns.
#[derive(Default)]
pub struct MemorialContentUpdate<'a> {
    pub full_name: Option<&'a str>,
    pub date_of_birth: Option<&'a str>,
    pub date_of_passing: Option<&'a str>,
    pub biography: Option<&'a str>,
    pub family_house: Option<&'a str>,
    pub audio_tribute_url: Option<&'a str>,
    pub legacy_document_url: Option<&'a str>,
    /// Full replacement list, already capped by the caller.
    pub image_urls: Option<&'a [String]>,
}

pub struct NewChat<'a> {
    pub id: Uuid,
    pub participant_a: Uuid,
    pub participant_b: Uuid,
    pub participant_a_name: &'a str,
    pub participant_b_name: &'a str,
    pub memorial_id: Option<Uuid>,
    pub memorial_name: Option<&'a str>,
}

pub struct NewMessage<'a> {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub text: &'a str,
    pub sender_id: Uuid,
    pub sender_name: &'a str,
    pub audio_url: Option<&'a str>,
    pub image_url: Option<&'a str>,
    /// Denormalized preview written onto the parent chat.
    pub preview: &'a str,
}

pub struct NewNotification<'a> {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub message: &'a str,
    pub memorial_id: Option<Uuid>,
    pub memorial_name: Option<&'a str>,
    pub chat_id: Option<Uuid>,
}

// -- Parsing helpers --

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid> {
    s.parse::<Uuid>()
        .with_context(|| format!("corrupt uuid '{s}'"))
}

/// SQLite's datetime('now') stores "YYYY-MM-DD HH:MM:SS" without a timezone;
/// values written by chrono round-trip as RFC 3339. Accept both, as UTC.
pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    s.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .with_context(|| format!("corrupt timestamp '{s}'"))
}

pub(crate) fn decode_uuid_list(json: &str) -> Result<Vec<Uuid>> {
    let raw: Vec<String> =
        serde_json::from_str(json).with_context(|| format!("corrupt id list '{json}'"))?;
    raw.iter().map(|s| parse_uuid(s)).collect()
}

pub(crate) fn encode_uuid_list(ids: &[Uuid]) -> String {
    let raw: Vec<String> = ids.iter().map(Uuid::to_string).collect();
    serde_json::to_string(&raw).expect("string list serialization cannot fail")
}

pub(crate) fn decode_string_list(json: &str) -> Result<Vec<String>> {
    serde_json::from_str(json).with_context(|| format!("corrupt url list '{json}'"))
}

pub(crate) fn encode_string_list(items: &[String]) -> String {
    serde_json::to_string(items).expect("string list serialization cannot fail")
}
