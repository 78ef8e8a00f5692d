use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "member" => Some(Role::Member),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
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

/// Memorial lifecycle. The legacy `isApproved` flag of the old data model is
/// not stored anywhere — it is derived from this enum, so the two can never
/// disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemorialStatus {
    Pending,
    Approved,
    Rejected,
}

impl MemorialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemorialStatus::Pending => "pending",
            MemorialStatus::Approved => "approved",
            MemorialStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<MemorialStatus> {
        match s {
            "pending" => Some(MemorialStatus::Pending),
            "approved" => Some(MemorialStatus::Approved),
            "rejected" => Some(MemorialStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memorial {
    pub id: Uuid,
    pub full_name: String,
    /// Dates are kept as the YYYY-MM-DD strings users enter; the year filter
    /// on the archive is a plain prefix match against date_of_passing.
    pub date_of_birth: Option<String>,
    pub date_of_passing: Option<String>,
    pub biography: String,
    /// Up to three photo URLs returned by the asset service.
    pub image_urls: Vec<String>,
    pub audio_tribute_url: Option<String>,
    pub legacy_document_url: Option<String>,
    pub posted_by: Uuid,
    pub posted_by_name: String,
    pub relationship: String,
    pub family_house: Option<String>,
    pub candles_lit: i64,
    pub status: MemorialStatus,
    pub created_at: DateTime<Utc>,
}

impl Memorial {
    pub fn is_approved(&self) -> bool {
        self.status == MemorialStatus::Approved
    }

    /// Legacy single-photo field kept for old consumers: the first photo.
    pub fn image_url(&self) -> Option<&str> {
        self.image_urls.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    pub participant_a: Uuid,
    pub participant_b: Uuid,
    pub participant_a_name: String,
    pub participant_b_name: String,
    pub memorial_id: Option<Uuid>,
    pub memorial_name: Option<String>,
    pub last_message: String,
    pub last_message_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    /// Deterministic key for the unordered participant pair. Chats are unique
    /// per pair, so creating one is a single create-if-absent on this key.
    pub fn pair_key(a: Uuid, b: Uuid) -> String {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        format!("{lo}:{hi}")
    }

    pub fn participants(&self) -> [Uuid; 2] {
        [self.participant_a, self.participant_b]
    }

    pub fn counterpart_of(&self, user_id: Uuid) -> Option<Uuid> {
        if self.participant_a == user_id {
            Some(self.participant_b)
        } else if self.participant_b == user_id {
            Some(self.participant_a)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Read,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sent => "sent",
            MessageStatus::Read => "read",
        }
    }

    pub fn parse(s: &str) -> Option<MessageStatus> {
        match s {
            "sent" => Some(MessageStatus::Sent),
            "read" => Some(MessageStatus::Read),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub text: String,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub audio_url: Option<String>,
    pub image_url: Option<String>,
    pub status: MessageStatus,
    pub read_by: Vec<Uuid>,
    /// Users who removed this message from their own view. The row itself is
    /// never hard-deleted.
    pub deleted_for: Vec<Uuid>,
    /// Tombstone flag — text/audio/image are blanked in storage when set.
    pub deleted_for_everyone: bool,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn hidden_from(&self, user_id: Uuid) -> bool {
        self.deleted_for.contains(&user_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Approved,
    Denied,
    Message,
    AdminAlert,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Approved => "approved",
            NotificationKind::Denied => "denied",
            NotificationKind::Message => "message",
            NotificationKind::AdminAlert => "admin_alert",
        }
    }

    pub fn parse(s: &str) -> Option<NotificationKind> {
        match s {
            "approved" => Some(NotificationKind::Approved),
            "denied" => Some(NotificationKind::Denied),
            "message" => Some(NotificationKind::Message),
            "admin_alert" => Some(NotificationKind::AdminAlert),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub message: String,
    pub memorial_id: Option<Uuid>,
    pub memorial_name: Option<String>,
    pub chat_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_key_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(Chat::pair_key(a, b), Chat::pair_key(b, a));
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            MemorialStatus::Pending,
            MemorialStatus::Approved,
            MemorialStatus::Rejected,
        ] {
            assert_eq!(MemorialStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(MemorialStatus::parse("live"), None);
    }

    #[test]
    fn is_approved_tracks_status() {
        let mut memorial = Memorial {
            id: Uuid::new_v4(),
            full_name: "Ibrahim K.".into(),
            date_of_birth: None,
            date_of_passing: None,
            biography: String::new(),
            image_urls: vec![],
            audio_tribute_url: None,
            legacy_document_url: None,
            posted_by: Uuid::new_v4(),
            posted_by_name: "A".into(),
            relationship: "Son".into(),
            family_house: None,
            candles_lit: 0,
            status: MemorialStatus::Pending,
            created_at: Utc::now(),
        };
        assert!(!memorial.is_approved());
        memorial.status = MemorialStatus::Approved;
        assert!(memorial.is_approved());
        memorial.status = MemorialStatus::Rejected;
        assert!(!memorial.is_approved());
    }
}
