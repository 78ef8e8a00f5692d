use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, patch, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use tribute_api::auth::{self, AppState, AppStateInner};
use tribute_api::middleware::require_auth;
use tribute_api::uploads::{self, AssetClient, MAX_FILE_SIZE};
use tribute_api::{admin, chats, memorials, notifications};
use tribute_mail::Mailer;
use tribute_types::events::EventBus;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tribute=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("TRIBUTE_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("TRIBUTE_DB_PATH").unwrap_or_else(|_| "tribute.db".into());
    let host = std::env::var("TRIBUTE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("TRIBUTE_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let site_url =
        std::env::var("TRIBUTE_SITE_URL").unwrap_or_else(|_| "http://localhost:5173".into());
    let upload_url = std::env::var("TRIBUTE_UPLOAD_URL")
        .unwrap_or_else(|_| "http://localhost:9000/upload".into());
    let upload_preset =
        std::env::var("TRIBUTE_UPLOAD_PRESET").unwrap_or_else(|_| "tribute-dev".into());

    // Init database
    let db = Arc::new(tribute_db::Database::open(&PathBuf::from(&db_path))?);

    // Event bus + mail trigger layer
    let events = EventBus::new();
    Mailer::new(db.clone(), site_url.clone()).spawn(&events);

    // Shared state
    let state: AppState = Arc::new(AppStateInner {
        db,
        events,
        assets: AssetClient::new(upload_url, upload_preset),
        jwt_secret,
        site_url,
    });

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route("/auth/reset-password", post(auth::reset_password))
        .route("/archive", get(memorials::archive))
        .route("/archive/{id}", get(memorials::get_memorial))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/memorials", post(memorials::submit_memorial))
        .route("/memorials/{id}", patch(memorials::edit_memorial))
        .route("/memorials/{id}", delete(memorials::delete_memorial))
        .route("/users/me", patch(auth::update_profile))
        .route("/users/me/device-tokens", post(auth::register_device_token))
        .route("/admin/memorials", get(admin::list_memorials))
        .route("/admin/memorials", delete(admin::clear_memorials))
        .route("/admin/memorials/{id}/approve", post(admin::approve_memorial))
        .route("/admin/memorials/{id}/reject", post(admin::reject_memorial))
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users/{id}", patch(admin::update_user_flags))
        .route("/chats", post(chats::start_chat))
        .route("/chats", get(chats::list_chats))
        .route("/chats/{chat_id}/messages", get(chats::get_messages))
        .route("/chats/{chat_id}/messages", post(chats::send_message))
        .route("/chats/{chat_id}/read", post(chats::mark_read))
        .route(
            "/chats/{chat_id}/messages/{message_id}/delete-for-me",
            post(chats::delete_for_me),
        )
        .route(
            "/chats/{chat_id}/messages/{message_id}/delete-for-everyone",
            post(chats::delete_for_everyone),
        )
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications", delete(notifications::clear_notifications))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route("/notifications/{id}/read", post(notifications::mark_read))
        .route("/notifications/{id}", delete(notifications::delete_notification))
        .route("/uploads/chat-image", post(uploads::upload_chat_image))
        .route("/uploads/chat-audio", post(uploads::upload_chat_audio))
        .layer(middleware::from_fn(require_auth))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        // A submission carries up to three photos and a document.
        .layer(DefaultBodyLimit::max(4 * MAX_FILE_SIZE))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Tribute server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
