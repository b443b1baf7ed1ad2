use chrono::Utc;
use serde::Serialize;

use crate::{
    authz::{
        authorize, membership,
        target::{self, resolve_owning_project, Target},
        Action, Identity,
    },
    db::{
        lookup,
        models::{Attachment, Id, UserSummary},
    },
    error::{AppError, Result},
    AppState,
};

pub const MAX_SIZE: usize = 10 * 1024 * 1024;

pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "application/pdf",
    "text/plain",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

/// An uploaded file as received from the client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub original_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    fn validate(&self) -> Result<()> {
        if self.original_name.trim().is_empty() {
            return Err(AppError::Validation("The file field is required".to_string()));
        }
        if self.bytes.len() > MAX_SIZE {
            return Err(AppError::Validation(
                "Attachments may not be larger than 10 MB".to_string(),
            ));
        }
        // Parameters such as "; charset=utf-8" do not change the type.
        let essence = self
            .mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if !ALLOWED_MIME_TYPES.contains(&essence.as_str()) {
            return Err(AppError::Validation(
                "Unsupported file type. Allowed: JPEG, PNG, PDF, TXT, DOCX".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AttachmentView {
    #[serde(flatten)]
    pub attachment: Attachment,
    pub user: UserSummary,
}

pub async fn create_attachment(
    state: &AppState,
    actor: &Identity,
    kind: &str,
    target_id: Id,
    upload: Upload,
) -> Result<AttachmentView> {
    let target = Target::parse(kind, target_id)?;
    upload.validate()?;

    let pool = &state.db.pool;
    let resolved = target::resolve(pool, target).await?;
    let access = membership::access(pool, &resolved.project, actor.id()).await?;
    authorize(actor, Action::CreateAttachment(access))?;

    let dir = format!("attachments/{}/{}", target.kind().as_str(), target.id());
    let stored_path = state
        .storage
        .store(&dir, &upload.original_name, &upload.bytes)
        .await?;

    let now = Utc::now();
    let inserted = sqlx::query_as::<_, Attachment>(
        r#"
        INSERT INTO attachments (target_type, target_id, user_id, path, original_name, mime_type, size, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(target.kind())
    .bind(target.id())
    .bind(actor.id())
    .bind(&stored_path)
    .bind(&upload.original_name)
    .bind(&upload.mime_type)
    .bind(upload.bytes.len() as i64)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await;

    let attachment = match inserted {
        Ok(attachment) => attachment,
        Err(e) => {
            // Clean up the stored file
            if let Err(cleanup) = state.storage.delete(&stored_path).await {
                tracing::warn!(path = %stored_path, error = %cleanup, "failed to remove orphaned upload");
            }
            return Err(e.into());
        }
    };

    tracing::info!(
        attachment_id = attachment.id,
        target = target.kind().as_str(),
        target_id = target.id(),
        size = attachment.size,
        actor_id = actor.id(),
        "attachment stored"
    );

    Ok(AttachmentView {
        attachment,
        user: actor.user.clone(),
    })
}

/// Removes the record and its stored file. A file that is already missing
/// does not block the deletion.
pub async fn delete_attachment(state: &AppState, actor: &Identity, id: Id) -> Result<()> {
    let pool = &state.db.pool;
    let attachment = lookup::attachment(pool, id).await?;
    let project = resolve_owning_project(pool, &attachment).await?;
    let access = membership::access(pool, &project, actor.id()).await?;
    authorize(actor, Action::DeleteAttachment(access))?;

    state.storage.delete(&attachment.path).await?;

    sqlx::query("DELETE FROM attachments WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    tracing::info!(attachment_id = id, project_id = project.id, actor_id = actor.id(), "attachment deleted");

    Ok(())
}
