//! Reactive email triggers. A single task subscribes to the store event bus
//! and turns field transitions into rows in the mail outbox. Every handler is
//! best-effort: the write that produced the event has already committed, so a
//! failure here is logged and swallowed, never propagated.

pub mod templates;

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tribute_db::Database;
use tribute_types::events::{EventBus, StoreEvent, memorial_became_approved, user_became_verified};
use tribute_types::models::{ChatMessage, Memorial, MemorialStatus, User};

pub struct Mailer {
    db: Arc<Database>,
    site_url: String,
}

impl Mailer {
    pub fn new(db: Arc<Database>, site_url: String) -> Self {
        Self { db, site_url }
    }

    /// Drain the bus until it closes. DB work runs on the blocking pool;
    /// events are handled one at a time, in order.
    pub fn spawn(self, bus: &EventBus) -> tokio::task::JoinHandle<()> {
        let mut rx = bus.subscribe();
        let mailer = Arc::new(self);
        tokio::spawn(async move {
            info!("Mail trigger layer running");
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let mailer = mailer.clone();
                        let join =
                            tokio::task::spawn_blocking(move || mailer.handle_event(event)).await;
                        if let Err(e) = join {
                            warn!("Mail handler panicked: {e}");
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        // Mail is best-effort; skipped events stay skipped.
                        warn!("Mail trigger layer lagged, {n} events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Dispatch one event. The match is exhaustive: adding a StoreEvent
    /// variant forces a decision here.
    pub fn handle_event(&self, event: StoreEvent) {
        match event {
            StoreEvent::UserUpdated { before, after } => self.on_user_updated(&before, &after),
            StoreEvent::MemorialCreated { memorial } => self.on_memorial_created(&memorial),
            StoreEvent::MemorialUpdated { before, after } => {
                self.on_memorial_updated(&before, &after)
            }
            StoreEvent::MessageCreated { chat_id, message } => {
                self.on_message_created(chat_id, &message)
            }
        }
    }

    /// isVerified false -> true: welcome email.
    fn on_user_updated(&self, before: &User, after: &User) {
        if !user_became_verified(before, after) {
            return;
        }
        debug!("User {} verified, queueing welcome email", after.id);
        let (subject, html) = templates::welcome(&after.display_name);
        self.enqueue(&after.email, &subject, &html);
    }

    /// New memorial in pending: submission receipt to the submitter. Admin
    /// submissions are born approved and get no receipt.
    fn on_memorial_created(&self, memorial: &Memorial) {
        if memorial.status != MemorialStatus::Pending {
            return;
        }
        let Some(submitter) = self.lookup_user(memorial.posted_by) else {
            return;
        };
        let (subject, html) =
            templates::submission_received(&submitter.display_name, &memorial.full_name);
        self.enqueue(&submitter.email, &subject, &html);
    }

    /// Status transitioned into approved: "memorial live" email.
    fn on_memorial_updated(&self, before: &Memorial, after: &Memorial) {
        if !memorial_became_approved(before, after) {
            return;
        }
        let Some(submitter) = self.lookup_user(after.posted_by) else {
            return;
        };
        let memorial_url = format!("{}/memorial/{}", self.site_url, after.id);
        let (subject, html) =
            templates::memorial_live(&submitter.display_name, &after.full_name, &memorial_url);
        self.enqueue(&submitter.email, &subject, &html);
    }

    /// New chat message: email the other participant.
    fn on_message_created(&self, chat_id: Uuid, message: &ChatMessage) {
        let chat = match self.db.get_chat(chat_id) {
            Ok(Some(chat)) => chat,
            Ok(None) => {
                debug!("Chat {chat_id} not found, skipping message email");
                return;
            }
            Err(e) => {
                warn!("Failed to load chat {chat_id}: {e}");
                return;
            }
        };
        let Some(recipient_id) = chat.counterpart_of(message.sender_id) else {
            debug!("Message sender is not a participant of chat {chat_id}, skipping");
            return;
        };
        let Some(recipient) = self.lookup_user(recipient_id) else {
            return;
        };
        let chat_url = format!("{}/chat/{}", self.site_url, chat_id);
        let (subject, html) = templates::new_message(
            &recipient.display_name,
            &message.sender_name,
            &message.text,
            &chat_url,
        );
        self.enqueue(&recipient.email, &subject, &html);
    }

    fn lookup_user(&self, id: Uuid) -> Option<User> {
        match self.db.get_user_by_id(id) {
            Ok(Some(user)) if !user.email.is_empty() => Some(user),
            Ok(Some(_)) => {
                debug!("User {id} has no email address, skipping");
                None
            }
            Ok(None) => {
                debug!("User {id} not found, skipping email");
                None
            }
            Err(e) => {
                warn!("Failed to load user {id}: {e}");
                None
            }
        }
    }

    fn enqueue(&self, recipient: &str, subject: &str, html: &str) {
        if let Err(e) = self.db.enqueue_mail(recipient, subject, html) {
            warn!("Failed to queue mail to {recipient}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tribute_db::models::{NewChat, NewMessage, NewUser};
    use tribute_types::models::Role;

    fn mailer() -> (Mailer, Arc<Database>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        (
            Mailer::new(db.clone(), "https://tribute.example".into()),
            db,
        )
    }

    fn seed_user(db: &Database, email: &str, name: &str) -> User {
        db.create_user(&NewUser {
            id: Uuid::new_v4(),
            email,
            password_hash: "$argon2id$stub",
            display_name: name,
            location: None,
            phone_number: None,
            community_reference: None,
            role: Role::Member,
        })
        .unwrap()
    }

    fn seed_memorial(db: &Database, user: &User, status: MemorialStatus) -> Memorial {
        use tribute_db::models::NewMemorial;
        db.create_memorial(
            &NewMemorial {
                id: Uuid::new_v4(),
                full_name: "Ibrahim K.",
                date_of_birth: None,
                date_of_passing: None,
                biography: "",
                image_urls: &[],
                audio_tribute_url: None,
                legacy_document_url: None,
                posted_by: user.id,
                posted_by_name: &user.display_name,
                relationship: "Son",
                family_house: None,
                status,
            },
            &[],
        )
        .unwrap()
    }

    #[test]
    fn welcome_mail_fires_only_on_the_verification_transition() {
        let (mailer, db) = mailer();
        let user = seed_user(&db, "m@example.com", "Member");
        let (before, after) = db.set_user_flags(user.id, Some(true), None).unwrap().unwrap();

        mailer.handle_event(StoreEvent::UserUpdated {
            before: before.clone(),
            after: after.clone(),
        });
        let mail = db.list_mail().unwrap();
        assert_eq!(mail.len(), 1);
        assert_eq!(mail[0].recipient, "m@example.com");
        assert!(mail[0].subject.contains("verified"));

        // Re-saving an already-verified user is not a transition.
        mailer.handle_event(StoreEvent::UserUpdated {
            before: after.clone(),
            after,
        });
        assert_eq!(db.list_mail().unwrap().len(), 1);
    }

    #[test]
    fn pending_submission_sends_a_receipt_but_admin_submission_does_not() {
        let (mailer, db) = mailer();
        let user = seed_user(&db, "m@example.com", "Member");

        let pending = seed_memorial(&db, &user, MemorialStatus::Pending);
        mailer.handle_event(StoreEvent::MemorialCreated { memorial: pending });
        let mail = db.list_mail().unwrap();
        assert_eq!(mail.len(), 1);
        assert!(mail[0].subject.starts_with("Submission received"));

        let approved = seed_memorial(&db, &user, MemorialStatus::Approved);
        mailer.handle_event(StoreEvent::MemorialCreated { memorial: approved });
        assert_eq!(db.list_mail().unwrap().len(), 1);
    }

    #[test]
    fn live_mail_fires_on_approval_and_only_on_approval() {
        let (mailer, db) = mailer();
        let user = seed_user(&db, "m@example.com", "Member");
        let memorial = seed_memorial(&db, &user, MemorialStatus::Pending);

        let (before, after) = db
            .set_memorial_status(memorial.id, MemorialStatus::Approved)
            .unwrap()
            .unwrap();
        mailer.handle_event(StoreEvent::MemorialUpdated {
            before,
            after: after.clone(),
        });
        let mail = db.list_mail().unwrap();
        assert_eq!(mail.len(), 1);
        assert!(mail[0].subject.starts_with("Live now:"));
        assert!(mail[0].html.contains(&format!("/memorial/{}", memorial.id)));

        // approved -> rejected produces nothing.
        let (before, rejected) = db
            .set_memorial_status(memorial.id, MemorialStatus::Rejected)
            .unwrap()
            .unwrap();
        mailer.handle_event(StoreEvent::MemorialUpdated {
            before,
            after: rejected,
        });
        assert_eq!(db.list_mail().unwrap().len(), 1);
    }

    #[test]
    fn message_mail_goes_to_the_other_participant() {
        let (mailer, db) = mailer();
        let a = seed_user(&db, "a@example.com", "A");
        let b = seed_user(&db, "b@example.com", "B");
        let (chat, _) = db
            .create_or_get_chat(&NewChat {
                id: Uuid::new_v4(),
                participant_a: a.id,
                participant_b: b.id,
                participant_a_name: "A",
                participant_b_name: "B",
                memorial_id: None,
                memorial_name: None,
            })
            .unwrap();
        let message = db
            .insert_message(&NewMessage {
                id: Uuid::new_v4(),
                chat_id: chat.id,
                text: "My condolences",
                sender_id: a.id,
                sender_name: "A",
                audio_url: None,
                image_url: None,
                preview: "My condolences",
            })
            .unwrap();

        mailer.handle_event(StoreEvent::MessageCreated {
            chat_id: chat.id,
            message,
        });
        let mail = db.list_mail().unwrap();
        assert_eq!(mail.len(), 1);
        assert_eq!(mail[0].recipient, "b@example.com");
        assert!(mail[0].html.contains("My condolences"));
    }

    #[test]
    fn missing_related_rows_are_swallowed() {
        let (mailer, db) = mailer();
        let a = seed_user(&db, "a@example.com", "A");
        let orphan = ChatMessage {
            id: Uuid::new_v4(),
            chat_id: Uuid::new_v4(),
            text: "into the void".into(),
            sender_id: a.id,
            sender_name: "A".into(),
            audio_url: None,
            image_url: None,
            status: tribute_types::models::MessageStatus::Sent,
            read_by: vec![],
            deleted_for: vec![],
            deleted_for_everyone: false,
            created_at: chrono::Utc::now(),
        };
        // Chat does not exist — handler logs and moves on.
        mailer.handle_event(StoreEvent::MessageCreated {
            chat_id: orphan.chat_id,
            message: orphan,
        });
        assert!(db.list_mail().unwrap().is_empty());
    }
}
