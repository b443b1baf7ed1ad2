use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{delete, post},
    Router,
};

use crate::{
    authz::Identity,
    db::models::Id,
    error::{AppError, Result},
    services::attachments::{self, AttachmentView, Upload, MAX_SIZE},
    AppState,
};
use super::extract::{Json, Path};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            // Leave room for the multipart envelope around a maximum-size file.
            post(create_attachment).layer(DefaultBodyLimit::max(MAX_SIZE + 64 * 1024)),
        )
        .route("/:id", delete(delete_attachment))
}

/// Expects the fields `on` (`project` or `task`), `id` and `file`.
async fn create_attachment(
    State(state): State<AppState>,
    actor: Identity,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<AttachmentView>)> {
    let mut on = None;
    let mut target_id = None;
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read multipart field: {e}")))?
    {
        match field.name().unwrap_or_default() {
            "on" => {
                on = Some(field.text().await.map_err(|e| {
                    AppError::BadRequest(format!("Failed to read field: {e}"))
                })?);
            }
            "id" => {
                let raw = field.text().await.map_err(|e| {
                    AppError::BadRequest(format!("Failed to read field: {e}"))
                })?;
                let id = raw
                    .trim()
                    .parse::<Id>()
                    .map_err(|_| AppError::Validation("The id must be an integer".to_string()))?;
                target_id = Some(id);
            }
            "file" => {
                let original_name = field.file_name().unwrap_or_default().to_string();
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(|e| {
                    AppError::BadRequest(format!("Failed to read file data: {e}"))
                })?;
                upload = Some(Upload {
                    original_name,
                    mime_type,
                    bytes: bytes.to_vec(),
                });
            }
            _ => {}
        }
    }

    let on = on.ok_or_else(|| AppError::Validation("The on field is required".to_string()))?;
    let target_id =
        target_id.ok_or_else(|| AppError::Validation("The id field is required".to_string()))?;
    let upload =
        upload.ok_or_else(|| AppError::Validation("The file field is required".to_string()))?;

    let attachment =
        attachments::create_attachment(&state, &actor, &on, target_id, upload).await?;
    Ok((StatusCode::CREATED, Json(attachment)))
}

async fn delete_attachment(
    State(state): State<AppState>,
    actor: Identity,
    Path(id): Path<Id>,
) -> Result<StatusCode> {
    attachments::delete_attachment(&state, &actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
