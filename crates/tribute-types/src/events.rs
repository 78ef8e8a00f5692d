use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{ChatMessage, Memorial, MemorialStatus, User};

/// Store change events published after the corresponding write has committed.
/// The mail trigger layer consumes these; handlers must never fail a request
/// because a subscriber is slow or gone.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// A user row was updated; carries before/after for transition guards.
    UserUpdated { before: User, after: User },

    /// A memorial row was created.
    MemorialCreated { memorial: Memorial },

    /// A memorial row was updated; carries before/after for transition guards.
    MemorialUpdated {
        before: Memorial,
        after: Memorial,
    },

    /// A chat message was created.
    MessageCreated { chat_id: Uuid, message: ChatMessage },
}

// Transition guards. Keeping these as named functions over the typed models
// (rather than ad-hoc field comparisons at the call sites) means every
// consumer checks the same transition.

pub fn user_became_verified(before: &User, after: &User) -> bool {
    !before.is_verified && after.is_verified
}

pub fn memorial_became_approved(before: &Memorial, after: &Memorial) -> bool {
    before.status != MemorialStatus::Approved && after.status == MemorialStatus::Approved
}

/// Broadcast bus for store events. Lossy for lagging subscribers — acceptable
/// because every consumer is best-effort by contract.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: StoreEvent) {
        // No receivers is fine (e.g. mailer not running in tests).
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(is_verified: bool) -> User {
        User {
            id: Uuid::new_v4(),
            email: "a@example.com".into(),
            display_name: "A".into(),
            location: None,
            phone_number: None,
            community_reference: None,
            role: crate::models::Role::Member,
            is_verified,
            is_disabled: false,
            created_at: Utc::now(),
        }
    }

    fn memorial(status: MemorialStatus) -> Memorial {
        Memorial {
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
            status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn verification_guard_fires_only_on_false_to_true() {
        assert!(user_became_verified(&user(false), &user(true)));
        assert!(!user_became_verified(&user(true), &user(true)));
        assert!(!user_became_verified(&user(true), &user(false)));
        assert!(!user_became_verified(&user(false), &user(false)));
    }

    #[test]
    fn approval_guard_fires_from_any_non_approved_state() {
        use MemorialStatus::*;
        assert!(memorial_became_approved(&memorial(Pending), &memorial(Approved)));
        assert!(memorial_became_approved(&memorial(Rejected), &memorial(Approved)));
        assert!(!memorial_became_approved(&memorial(Approved), &memorial(Approved)));
        assert!(!memorial_became_approved(&memorial(Approved), &memorial(Rejected)));
        assert!(!memorial_became_approved(&memorial(Pending), &memorial(Rejected)));
    }

    #[tokio::test]
    async fn bus_delivers_to_subscribers() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(StoreEvent::MemorialCreated {
            memorial: memorial(MemorialStatus::Pending),
        });
        match rx.recv().await {
            Ok(StoreEvent::MemorialCreated { memorial }) => {
                assert_eq!(memorial.status, MemorialStatus::Pending);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
