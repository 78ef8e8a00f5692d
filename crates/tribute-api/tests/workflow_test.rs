//! Handler-level tests for the approval and chat workflows, run against an
//! in-memory store with handlers invoked directly.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use uuid::Uuid;

use tribute_api::auth::{AppState, AppStateInner};
use tribute_api::error::ApiError;
use tribute_api::memorials::{SubmissionInput, create_submission};
use tribute_api::uploads::AssetClient;
use tribute_api::{admin, auth, chats, memorials, notifications};
use tribute_db::Database;
use tribute_db::models::NewUser;
use tribute_types::api::{
    ArchiveQuery, Claims, LoginRequest, ModerateMemorialRequest, RegisterRequest,
    SendMessageRequest, StartChatRequest,
};
use tribute_types::events::{EventBus, StoreEvent};
use tribute_types::models::{MemorialStatus, NotificationKind, Role, User};

fn test_state() -> AppState {
    Arc::new(AppStateInner {
        db: Arc::new(Database::open_in_memory().unwrap()),
        events: EventBus::new(),
        // Points nowhere; tests never upload.
        assets: AssetClient::new("http://127.0.0.1:9/upload".into(), "test".into()),
        jwt_secret: "test-secret".into(),
        site_url: "https://tribute.example".into(),
    })
}

fn seed_user(state: &AppState, email: &str, name: &str, role: Role) -> User {
    state
        .db
        .create_user(&NewUser {
            id: Uuid::new_v4(),
            email,
            password_hash: "$argon2id$stub",
            display_name: name,
            location: None,
            phone_number: None,
            community_reference: None,
            role,
        })
        .unwrap()
}

fn claims_for(user: &User) -> Claims {
    Claims {
        sub: user.id,
        display_name: user.display_name.clone(),
        role: user.role,
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
    }
}

fn submission(full_name: &str) -> SubmissionInput {
    SubmissionInput {
        full_name: full_name.into(),
        relationship: "Son".into(),
        biography: "A life of service.".into(),
        family_house: None,
        date_of_birth: None,
        date_of_passing: Some("2024-05-01".into()),
        image_urls: vec![],
        legacy_document_url: None,
    }
}

#[tokio::test]
async fn member_submission_is_pending_and_alerts_every_admin() {
    let state = test_state();
    let admin_one = seed_user(&state, "a1@example.com", "Admin One", Role::Admin);
    let admin_two = seed_user(&state, "a2@example.com", "Admin Two", Role::Admin);
    let member = seed_user(&state, "m@example.com", "Member", Role::Member);

    let mut events = state.events.subscribe();
    let memorial = create_submission(&state, &member, submission("Ibrahim K.")).unwrap();

    assert_eq!(memorial.status, MemorialStatus::Pending);
    assert!(!memorial.is_approved());

    for admin_user in [&admin_one, &admin_two] {
        let Json(list) = notifications::list_notifications(
            State(state.clone()),
            Extension(claims_for(admin_user)),
        )
        .await
        .unwrap();
        assert_eq!(list.unread_count, 1);
        assert_eq!(list.notifications[0].kind, NotificationKind::AdminAlert);
        assert!(list.notifications[0].message.contains("Ibrahim K."));
    }

    // The created event fired after the commit.
    match events.try_recv() {
        Ok(StoreEvent::MemorialCreated { memorial: m }) => assert_eq!(m.id, memorial.id),
        other => panic!("expected MemorialCreated, got {other:?}"),
    }
}

#[tokio::test]
async fn admin_submission_is_born_approved_with_no_alerts() {
    let state = test_state();
    let admin_user = seed_user(&state, "a@example.com", "Admin", Role::Admin);

    let memorial = create_submission(&state, &admin_user, submission("Aunt H.")).unwrap();
    assert_eq!(memorial.status, MemorialStatus::Approved);

    let Json(list) = notifications::list_notifications(
        State(state.clone()),
        Extension(claims_for(&admin_user)),
    )
    .await
    .unwrap();
    assert_eq!(list.unread_count, 0);
    assert!(list.notifications.is_empty());
}

#[tokio::test]
async fn end_to_end_submit_approve_and_read_the_notification() {
    let state = test_state();
    let admin_user = seed_user(&state, "a@example.com", "Admin", Role::Admin);
    let member = seed_user(&state, "m@example.com", "Member", Role::Member);

    let memorial = create_submission(&state, &member, submission("Ibrahim K.")).unwrap();
    assert_eq!(memorial.status, MemorialStatus::Pending);

    let mut events = state.events.subscribe();
    let Json(approved) = admin::approve_memorial(
        State(state.clone()),
        Path(memorial.id),
        Extension(claims_for(&admin_user)),
        Json(ModerateMemorialRequest { message: None }),
    )
    .await
    .unwrap();
    assert_eq!(approved.status, MemorialStatus::Approved);
    assert!(approved.is_approved);

    // The stored row agrees with the response.
    let stored = state.db.get_memorial(memorial.id).unwrap().unwrap();
    assert!(stored.is_approved());

    // The submitter got the canned approval text, unread.
    let Json(list) =
        notifications::list_notifications(State(state.clone()), Extension(claims_for(&member)))
            .await
            .unwrap();
    assert_eq!(list.unread_count, 1);
    let note = &list.notifications[0];
    assert_eq!(note.kind, NotificationKind::Approved);
    assert_eq!(note.memorial_id, Some(memorial.id));
    assert_eq!(
        note.message,
        "Your tribute has been approved and is now live on the Tribute Wall!"
    );

    // Opening it marks it read.
    notifications::mark_read(
        State(state.clone()),
        Path(note.id),
        Extension(claims_for(&member)),
    )
    .await
    .unwrap();
    let Json(list) =
        notifications::list_notifications(State(state.clone()), Extension(claims_for(&member)))
            .await
            .unwrap();
    assert_eq!(list.unread_count, 0);

    // And the update event carried the transition.
    match events.try_recv() {
        Ok(StoreEvent::MemorialUpdated { before, after }) => {
            assert_eq!(before.status, MemorialStatus::Pending);
            assert_eq!(after.status, MemorialStatus::Approved);
        }
        other => panic!("expected MemorialUpdated, got {other:?}"),
    }
}

#[tokio::test]
async fn rejection_uses_the_custom_message_when_given() {
    let state = test_state();
    let admin_user = seed_user(&state, "a@example.com", "Admin", Role::Admin);
    let member = seed_user(&state, "m@example.com", "Member", Role::Member);
    let memorial = create_submission(&state, &member, submission("Ibrahim K.")).unwrap();

    let Json(rejected) = admin::reject_memorial(
        State(state.clone()),
        Path(memorial.id),
        Extension(claims_for(&admin_user)),
        Json(ModerateMemorialRequest {
            message: Some("  Please add a biography.  ".into()),
        }),
    )
    .await
    .unwrap();
    assert_eq!(rejected.status, MemorialStatus::Rejected);
    assert!(!rejected.is_approved);

    let Json(list) =
        notifications::list_notifications(State(state.clone()), Extension(claims_for(&member)))
            .await
            .unwrap();
    assert_eq!(list.notifications[0].kind, NotificationKind::Denied);
    assert_eq!(list.notifications[0].message, "Please add a biography.");
}

#[tokio::test]
async fn moderation_requires_the_admin_role() {
    let state = test_state();
    let member = seed_user(&state, "m@example.com", "Member", Role::Member);
    let memorial = create_submission(&state, &member, submission("Ibrahim K.")).unwrap();

    let err = admin::approve_memorial(
        State(state.clone()),
        Path(memorial.id),
        Extension(claims_for(&member)),
        Json(ModerateMemorialRequest { message: None }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden));

    // Nothing changed, nobody was notified.
    let stored = state.db.get_memorial(memorial.id).unwrap().unwrap();
    assert_eq!(stored.status, MemorialStatus::Pending);
    let Json(list) =
        notifications::list_notifications(State(state.clone()), Extension(claims_for(&member)))
            .await
            .unwrap();
    assert!(list.notifications.is_empty());
}

#[tokio::test]
async fn archive_serves_only_approved_memorials() {
    let state = test_state();
    let admin_user = seed_user(&state, "a@example.com", "Admin", Role::Admin);
    let member = seed_user(&state, "m@example.com", "Member", Role::Member);

    create_submission(&state, &member, submission("Still Pending")).unwrap();
    let live = create_submission(&state, &admin_user, submission("Already Live")).unwrap();

    let Json(archive) = memorials::archive(
        State(state.clone()),
        Query(ArchiveQuery {
            search: None,
            year: None,
            sort: Default::default(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(archive.len(), 1);
    assert_eq!(archive[0].id, live.id);
    assert!(archive[0].is_approved);

    // Search narrows by name substring.
    let Json(hits) = memorials::archive(
        State(state.clone()),
        Query(ArchiveQuery {
            search: Some("already".into()),
            year: None,
            sort: Default::default(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(hits.len(), 1);
    let Json(none) = memorials::archive(
        State(state.clone()),
        Query(ArchiveQuery {
            search: Some("pending".into()),
            year: None,
            sort: Default::default(),
        }),
    )
    .await
    .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn chat_flow_dedups_notifies_and_guards_participants() {
    let state = test_state();
    let poster = seed_user(&state, "p@example.com", "Poster", Role::Member);
    let visitor = seed_user(&state, "v@example.com", "Visitor", Role::Member);
    let stranger = seed_user(&state, "s@example.com", "Stranger", Role::Member);
    let memorial = create_submission(&state, &poster, submission("Ibrahim K.")).unwrap();

    // The poster cannot open a chat with themselves.
    let err = chats::start_chat(
        State(state.clone()),
        Extension(claims_for(&poster)),
        Json(StartChatRequest {
            memorial_id: memorial.id,
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    let (status, Json(chat)) = chats::start_chat(
        State(state.clone()),
        Extension(claims_for(&visitor)),
        Json(StartChatRequest {
            memorial_id: memorial.id,
        }),
    )
    .await
    .unwrap();
    assert_eq!(status, axum::http::StatusCode::CREATED);
    assert_eq!(chat.counterpart_name, "Poster");
    assert_eq!(chat.memorial_id, Some(memorial.id));

    // Starting again resolves to the same chat.
    let (status, Json(same)) = chats::start_chat(
        State(state.clone()),
        Extension(claims_for(&visitor)),
        Json(StartChatRequest {
            memorial_id: memorial.id,
        }),
    )
    .await
    .unwrap();
    assert_eq!(status, axum::http::StatusCode::OK);
    assert_eq!(same.id, chat.id);

    // A message needs some content.
    let err = chats::send_message(
        State(state.clone()),
        Path(chat.id),
        Extension(claims_for(&visitor)),
        Json(SendMessageRequest {
            text: Some("   ".into()),
            audio_url: None,
            image_url: None,
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    let (_, Json(message)) = chats::send_message(
        State(state.clone()),
        Path(chat.id),
        Extension(claims_for(&visitor)),
        Json(SendMessageRequest {
            text: Some("My condolences to the family.".into()),
            audio_url: None,
            image_url: None,
        }),
    )
    .await
    .unwrap();
    assert_eq!(message.sender_id, visitor.id);

    // The poster got a message notification pointing at the chat.
    let Json(list) =
        notifications::list_notifications(State(state.clone()), Extension(claims_for(&poster)))
            .await
            .unwrap();
    assert_eq!(list.unread_count, 1);
    assert_eq!(list.notifications[0].kind, NotificationKind::Message);
    assert_eq!(list.notifications[0].chat_id, Some(chat.id));
    assert!(list.notifications[0].message.contains("Visitor"));

    // Outsiders cannot read the chat.
    let err = chats::get_messages(
        State(state.clone()),
        Path(chat.id),
        Extension(claims_for(&stranger)),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden));

    // Only the sender may delete for everyone.
    let err = chats::delete_for_everyone(
        State(state.clone()),
        Path((chat.id, message.id)),
        Extension(claims_for(&poster)),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden));

    // The recipient can hide it for themselves; the sender still sees it.
    chats::delete_for_me(
        State(state.clone()),
        Path((chat.id, message.id)),
        Extension(claims_for(&poster)),
    )
    .await
    .unwrap();
    let Json(poster_view) = chats::get_messages(
        State(state.clone()),
        Path(chat.id),
        Extension(claims_for(&poster)),
    )
    .await
    .unwrap();
    assert!(poster_view.is_empty());
    let Json(visitor_view) = chats::get_messages(
        State(state.clone()),
        Path(chat.id),
        Extension(claims_for(&visitor)),
    )
    .await
    .unwrap();
    assert_eq!(visitor_view.len(), 1);
}

#[tokio::test]
async fn disabled_users_cannot_post_into_a_chat() {
    let state = test_state();
    let poster = seed_user(&state, "p@example.com", "Poster", Role::Member);
    let visitor = seed_user(&state, "v@example.com", "Visitor", Role::Member);
    let memorial = create_submission(&state, &poster, submission("Ibrahim K.")).unwrap();

    let (_, Json(chat)) = chats::start_chat(
        State(state.clone()),
        Extension(claims_for(&visitor)),
        Json(StartChatRequest {
            memorial_id: memorial.id,
        }),
    )
    .await
    .unwrap();

    state
        .db
        .set_user_flags(visitor.id, None, Some(true))
        .unwrap();

    let err = chats::send_message(
        State(state.clone()),
        Path(chat.id),
        Extension(claims_for(&visitor)),
        Json(SendMessageRequest {
            text: Some("still here?".into()),
            audio_url: None,
            image_url: None,
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden));
}

#[tokio::test]
async fn register_then_login_round_trips_the_password() {
    let state = test_state();

    let (status, Json(registered)) = auth::register(
        State(state.clone()),
        Json(RegisterRequest {
            email: "New@Example.com".into(),
            password: "correct horse".into(),
            display_name: "Newcomer".into(),
            location: None,
            phone_number: None,
            community_reference: Some("Elder S.".into()),
        }),
    )
    .await
    .unwrap();
    assert_eq!(status, axum::http::StatusCode::CREATED);

    // Same email again conflicts, case-insensitively.
    let err = auth::register(
        State(state.clone()),
        Json(RegisterRequest {
            email: "new@example.com".into(),
            password: "correct horse".into(),
            display_name: "Imposter".into(),
            location: None,
            phone_number: None,
            community_reference: None,
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::EmailTaken));

    let err = auth::login(
        State(state.clone()),
        Json(LoginRequest {
            email: "new@example.com".into(),
            password: "wrong horse".into(),
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized));

    let Json(login) = auth::login(
        State(state.clone()),
        Json(LoginRequest {
            email: "new@example.com".into(),
            password: "correct horse".into(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(login.user_id, registered.user_id);
    assert_eq!(login.role, Role::Member);
    assert!(!login.token.is_empty());
}
