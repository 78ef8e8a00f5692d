use axum::{
    Extension, Json,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use tracing::error;
use uuid::Uuid;

use tribute_db::models::{MemorialContentUpdate, NewMemorial, NewNotification};
use tribute_types::api::{ArchiveQuery, Claims, MemorialResponse};
use tribute_types::events::StoreEvent;
use tribute_types::models::{Memorial, MemorialStatus, NotificationKind, Role, User};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::claims_from_headers;
use crate::uploads::UploadKind;

/// A memorial may carry at most this many photos.
pub const MAX_PHOTOS: usize = 3;

/// Parsed multipart submission. Text fields plus raw file parts; files are
/// only forwarded to the asset service after the whole form validates.
#[derive(Default)]
pub struct SubmissionForm {
    pub full_name: String,
    pub relationship: String,
    pub biography: String,
    pub family_house: Option<String>,
    pub date_of_birth: Option<String>,
    pub date_of_passing: Option<String>,
    pub photos: Vec<(String, Vec<u8>)>,
    pub document: Option<(String, Vec<u8>)>,
}

/// Everything needed to write a memorial once uploads have succeeded.
pub struct SubmissionInput {
    pub full_name: String,
    pub relationship: String,
    pub biography: String,
    pub family_house: Option<String>,
    pub date_of_birth: Option<String>,
    pub date_of_passing: Option<String>,
    pub image_urls: Vec<String>,
    pub legacy_document_url: Option<String>,
}

pub async fn submit_memorial(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<MemorialResponse>), ApiError> {
    let submitter = require_active_user(&state, claims.sub)?;

    let form = read_submission(multipart).await?;
    if form.full_name.is_empty() {
        return Err(ApiError::Validation(
            "Please enter the full name of the deceased.".into(),
        ));
    }
    if form.relationship.is_empty() {
        return Err(ApiError::Validation("Please specify your relationship.".into()));
    }
    if form.photos.len() > MAX_PHOTOS {
        return Err(ApiError::Validation(format!(
            "A memorial can carry at most {MAX_PHOTOS} photos."
        )));
    }

    // Upload everything first, sequentially. Any failure aborts the whole
    // submission before a single row is written.
    let mut image_urls = Vec::with_capacity(form.photos.len());
    for (filename, bytes) in form.photos {
        let url = state
            .assets
            .upload(UploadKind::MemorialPhoto, &filename, bytes)
            .await
            .map_err(|e| {
                error!("Photo upload failed: {e:#}");
                ApiError::Upload(e.to_string())
            })?;
        image_urls.push(url);
    }
    let mut legacy_document_url = None;
    if let Some((filename, bytes)) = form.document {
        let url = state
            .assets
            .upload(UploadKind::Document, &filename, bytes)
            .await
            .map_err(|e| {
                error!("Document upload failed: {e:#}");
                ApiError::Upload(e.to_string())
            })?;
        legacy_document_url = Some(url);
    }

    let memorial = create_submission(
        &state,
        &submitter,
        SubmissionInput {
            full_name: form.full_name,
            relationship: form.relationship,
            biography: form.biography,
            family_house: form.family_house,
            date_of_birth: form.date_of_birth,
            date_of_passing: form.date_of_passing,
            image_urls,
            legacy_document_url,
        },
    )?;

    Ok((StatusCode::CREATED, Json(memorial.into())))
}

/// Write the memorial (status derived from the submitter's role) and, for
/// member submissions, the per-admin alert fan-out — one transaction. Admin
/// submissions are born approved and alert nobody.
pub fn create_submission(
    state: &AppState,
    submitter: &User,
    input: SubmissionInput,
) -> Result<Memorial, ApiError> {
    let status = match submitter.role {
        Role::Admin => MemorialStatus::Approved,
        Role::Member => MemorialStatus::Pending,
    };

    let id = Uuid::new_v4();
    let alert_message = format!(
        "{} has submitted a new memorial for {} that requires your review.",
        submitter.display_name, input.full_name
    );
    let admins = if status == MemorialStatus::Pending {
        state.db.list_admins()?
    } else {
        Vec::new()
    };
    let alerts: Vec<NewNotification> = admins
        .iter()
        .map(|admin| NewNotification {
            user_id: admin.id,
            kind: NotificationKind::AdminAlert,
            message: &alert_message,
            memorial_id: Some(id),
            memorial_name: Some(&input.full_name),
            chat_id: None,
        })
        .collect();

    let memorial = state.db.create_memorial(
        &NewMemorial {
            id,
            full_name: &input.full_name,
            date_of_birth: input.date_of_birth.as_deref(),
            date_of_passing: input.date_of_passing.as_deref(),
            biography: &input.biography,
            image_urls: &input.image_urls,
            audio_tribute_url: None,
            legacy_document_url: input.legacy_document_url.as_deref(),
            posted_by: submitter.id,
            posted_by_name: &submitter.display_name,
            relationship: &input.relationship,
            family_house: input.family_house.as_deref(),
            status,
        },
        &alerts,
    )?;

    state.events.publish(StoreEvent::MemorialCreated {
        memorial: memorial.clone(),
    });

    Ok(memorial)
}

/// Approved memorials are public. Pending and rejected ones resolve only for
/// the submitter or an admin; everyone else sees a 404.
pub async fn get_memorial(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<MemorialResponse>, ApiError> {
    let memorial = state.db.get_memorial(id)?.ok_or(ApiError::NotFound)?;

    if !memorial.is_approved() {
        let claims = claims_from_headers(&headers, &state.jwt_secret);
        let allowed = claims
            .map(|c| c.is_admin() || c.sub == memorial.posted_by)
            .unwrap_or(false);
        if !allowed {
            return Err(ApiError::NotFound);
        }
    }

    Ok(Json(memorial.into()))
}

/// Content-only edit by the submitter or an admin. The lifecycle status is
/// not reachable from this path; new photos append up to the cap.
pub async fn edit_memorial(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> Result<Json<MemorialResponse>, ApiError> {
    let memorial = state.db.get_memorial(id)?.ok_or(ApiError::NotFound)?;
    if memorial.posted_by != claims.sub && !claims.is_admin() {
        return Err(ApiError::Forbidden);
    }

    let form = read_submission(multipart).await?;
    if memorial.image_urls.len() + form.photos.len() > MAX_PHOTOS {
        return Err(ApiError::Validation(format!(
            "A memorial can carry at most {MAX_PHOTOS} photos."
        )));
    }

    // Upload the appended photos before touching the row.
    let mut image_urls = memorial.image_urls.clone();
    for (filename, bytes) in form.photos {
        let url = state
            .assets
            .upload(UploadKind::MemorialPhoto, &filename, bytes)
            .await
            .map_err(|e| {
                error!("Photo upload failed: {e:#}");
                ApiError::Upload(e.to_string())
            })?;
        image_urls.push(url);
    }

    let updated = state
        .db
        .update_memorial_content(
            id,
            &MemorialContentUpdate {
                full_name: (!form.full_name.is_empty()).then_some(form.full_name.as_str()),
                date_of_birth: form.date_of_birth.as_deref(),
                date_of_passing: form.date_of_passing.as_deref(),
                biography: (!form.biography.is_empty()).then_some(form.biography.as_str()),
                family_house: form.family_house.as_deref(),
                audio_tribute_url: None,
                legacy_document_url: None,
                image_urls: Some(&image_urls),
            },
        )?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(updated.into()))
}

/// Hard delete by the submitter or an admin. Notifications that reference
/// the memorial are left behind and render as dead links.
pub async fn delete_memorial(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    let memorial = state.db.get_memorial(id)?.ok_or(ApiError::NotFound)?;
    if memorial.posted_by != claims.sub && !claims.is_admin() {
        return Err(ApiError::Forbidden);
    }

    state.db.delete_memorial(id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// The Tribute Wall: approved memorials with search, year filter and sort,
/// all resolved by indexed queries in the store.
pub async fn archive(
    State(state): State<AppState>,
    Query(query): Query<ArchiveQuery>,
) -> Result<Json<Vec<MemorialResponse>>, ApiError> {
    let db = state.db.clone();
    let memorials = tokio::task::spawn_blocking(move || {
        db.search_archive(query.search.as_deref(), query.year.as_deref(), query.sort)
    })
    .await
    .map_err(|e| ApiError::Internal(anyhow::anyhow!("spawn_blocking join error: {e}")))??;

    Ok(Json(memorials.into_iter().map(Into::into).collect()))
}

// -- Helpers --

pub(crate) fn require_active_user(state: &AppState, id: Uuid) -> Result<User, ApiError> {
    let user = state.db.get_user_by_id(id)?.ok_or(ApiError::Unauthorized)?;
    if user.is_disabled {
        // Restricted accounts cannot submit or chat.
        return Err(ApiError::Forbidden);
    }
    Ok(user)
}

async fn read_submission(mut multipart: Multipart) -> Result<SubmissionForm, ApiError> {
    let mut form = SubmissionForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("malformed form: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "photo" => {
                let filename = field.file_name().unwrap_or("photo").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Validation(format!("unreadable photo: {e}")))?;
                form.photos.push((filename, bytes.to_vec()));
            }
            "document" => {
                let filename = field.file_name().unwrap_or("document").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Validation(format!("unreadable document: {e}")))?;
                form.document = Some((filename, bytes.to_vec()));
            }
            _ => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::Validation(format!("malformed field: {e}")))?;
                let value = value.trim().to_string();
                match name.as_str() {
                    "full_name" => form.full_name = value,
                    "relationship" => form.relationship = value,
                    "biography" => form.biography = value,
                    "family_house" if !value.is_empty() => form.family_house = Some(value),
                    "date_of_birth" if !value.is_empty() => form.date_of_birth = Some(value),
                    "date_of_passing" if !value.is_empty() => form.date_of_passing = Some(value),
                    _ => {}
                }
            }
        }
    }

    Ok(form)
}
