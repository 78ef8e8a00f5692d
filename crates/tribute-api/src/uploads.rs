use axum::{Extension, Json, body::Bytes, extract::State, http::StatusCode};
use tracing::error;

use tribute_types::api::{Claims, UploadResponse};

use crate::auth::AppState;
use crate::error::ApiError;

/// 50 MB upload limit per file
pub const MAX_FILE_SIZE: usize = 50 * 1024 * 1024;

/// What is being uploaded; selects the asset-service folder.
#[derive(Debug, Clone, Copy)]
pub enum UploadKind {
    MemorialPhoto,
    ChatImage,
    ChatAudio,
    Document,
}

impl UploadKind {
    fn folder(&self) -> &'static str {
        match self {
            UploadKind::MemorialPhoto => "tribute_memorials",
            UploadKind::ChatImage => "tribute_chat_images",
            UploadKind::ChatAudio => "tribute_chat_audio",
            UploadKind::Document => "tribute_documents",
        }
    }

    fn resource_type(&self) -> &'static str {
        match self {
            UploadKind::MemorialPhoto | UploadKind::ChatImage => "image",
            UploadKind::ChatAudio | UploadKind::Document => "auto",
        }
    }
}

/// Client for the external asset host: POST a multipart form with a named
/// preset, get back a public URL. No retries — a failed upload is terminal
/// for the attempt.
pub struct AssetClient {
    http: reqwest::Client,
    upload_url: String,
    preset: String,
}

impl AssetClient {
    pub fn new(upload_url: String, preset: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            upload_url,
            preset,
        }
    }

    pub async fn upload(
        &self,
        kind: UploadKind,
        filename: &str,
        bytes: Vec<u8>,
    ) -> anyhow::Result<String> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("upload_preset", self.preset.clone())
            .text("folder", kind.folder())
            .text("resource_type", kind.resource_type());

        let response = self.http.post(&self.upload_url).multipart(form).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("asset service returned {}", response.status());
        }

        let body: UploadResponse = response.json().await?;
        Ok(body.secure_url)
    }
}

/// POST /uploads/chat-image — raw body in, `{ secure_url }` out. The URL is
/// then attached to a message send.
pub async fn upload_chat_image(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    bytes: Bytes,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    upload_for_chat(state, claims, UploadKind::ChatImage, "chat-image", bytes).await
}

/// POST /uploads/chat-audio — voice note variant of the above.
pub async fn upload_chat_audio(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    bytes: Bytes,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    upload_for_chat(state, claims, UploadKind::ChatAudio, "voice-note", bytes).await
}

async fn upload_for_chat(
    state: AppState,
    claims: Claims,
    kind: UploadKind,
    filename: &str,
    bytes: Bytes,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    if bytes.is_empty() {
        return Err(ApiError::Validation("file is empty".into()));
    }
    if bytes.len() > MAX_FILE_SIZE {
        return Err(ApiError::Validation("file exceeds the 50 MB limit".into()));
    }

    let user = state
        .db
        .get_user_by_id(claims.sub)?
        .ok_or(ApiError::Unauthorized)?;
    if user.is_disabled {
        return Err(ApiError::Forbidden);
    }

    let secure_url = state
        .assets
        .upload(kind, filename, bytes.to_vec())
        .await
        .map_err(|e| {
            error!("Chat upload failed: {e:#}");
            ApiError::Upload(e.to_string())
        })?;

    Ok((StatusCode::CREATED, Json(UploadResponse { secure_url })))
}
