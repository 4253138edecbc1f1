//! Axum route handlers for the Session API.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::caption::UploadedImage;
use crate::errors::AppError;
use crate::session::render::{render, SessionView};
use crate::session::run_generation;
use crate::state::AppState;

/// Multipart field carrying the uploaded image.
const IMAGE_FIELD: &str = "image";

#[derive(Debug, Deserialize)]
pub struct ContextUpdate {
    pub company_info: Option<String>,
    pub recent_posts: Option<String>,
}

/// POST /api/v1/sessions
pub async fn handle_create_session(
    State(state): State<AppState>,
) -> (StatusCode, Json<SessionView>) {
    let session = state.sessions.create().await;
    let view = render(&*session.lock().await);
    (StatusCode::CREATED, Json(view))
}

/// GET /api/v1/sessions/:id
///
/// Pure read: never triggers the pipeline.
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let session = state.sessions.get(id).await?;
    let view = render(&*session.lock().await);
    Ok(Json(view))
}

/// DELETE /api/v1/sessions/:id
pub async fn handle_delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.sessions.remove(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/v1/sessions/:id/image
///
/// Replaces the session's current image. Previously generated output stays in
/// the store but is only rendered again if the same bytes are uploaded.
pub async fn handle_upload_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<SessionView>, AppError> {
    let session = state.sessions.get(id).await?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        if field.name() == Some(IMAGE_FIELD) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("Failed to read image field: {e}")))?;
            upload = Some(bytes);
            break;
        }
    }
    let bytes = upload.ok_or_else(|| {
        AppError::Validation(format!("Missing multipart field '{IMAGE_FIELD}'"))
    })?;

    let image = tokio::task::spawn_blocking(move || UploadedImage::from_bytes(bytes))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("image decode task failed: {e}")))??;
    tracing::info!("Session {id} uploaded image {}", image.fingerprint());

    let mut guard = session.lock().await;
    guard.image = Some(image);
    Ok(Json(render(&guard)))
}

/// PUT /api/v1/sessions/:id/context
pub async fn handle_update_context(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<ContextUpdate>,
) -> Result<Json<SessionView>, AppError> {
    let session = state.sessions.get(id).await?;
    let mut guard = session.lock().await;
    if let Some(company_info) = update.company_info {
        guard.context.company_info = company_info;
    }
    if let Some(recent_posts) = update.recent_posts {
        guard.context.recent_posts = recent_posts;
    }
    Ok(Json(render(&guard)))
}

/// POST /api/v1/sessions/:id/generate
///
/// "Generate Caption and Evaluate": caption → draft → critique → store.
/// Responds once the run has finished, with the freshly rendered view.
pub async fn handle_generate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let session = state.sessions.get(id).await?;
    run_generation(session.clone(), state.pipeline.clone()).await?;
    let view = render(&*session.lock().await);
    Ok(Json(view))
}
