use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    authz::{
        authorize, membership,
        target::{self, resolve_owning_project, Target},
        Action, Identity,
    },
    db::{
        lookup,
        models::{Comment, Id, UserSummary},
    },
    error::{AppError, Result},
    AppState,
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewComment {
    pub on: String,
    pub id: Id,
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentChanges {
    pub body: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: Comment,
    pub author: UserSummary,
}

fn require_body(body: &str) -> Result<()> {
    if body.trim().is_empty() {
        return Err(AppError::Validation("The body field is required".to_string()));
    }
    Ok(())
}

async fn comment_view(pool: &sqlx::SqlitePool, comment: Comment) -> Result<CommentView> {
    let author = sqlx::query_as::<_, UserSummary>("SELECT id, name, email FROM users WHERE id = ?")
        .bind(comment.user_id)
        .fetch_one(pool)
        .await?;

    Ok(CommentView { comment, author })
}

pub async fn create_comment(
    state: &AppState,
    actor: &Identity,
    input: NewComment,
) -> Result<CommentView> {
    let target = Target::parse(&input.on, input.id)?;
    require_body(&input.body)?;

    let pool = &state.db.pool;
    let resolved = target::resolve(pool, target).await?;
    let access = membership::access(pool, &resolved.project, actor.id()).await?;
    authorize(actor, Action::CreateComment(access))?;

    let now = Utc::now();
    let comment = sqlx::query_as::<_, Comment>(
        r#"
        INSERT INTO comments (target_type, target_id, user_id, body, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(target.kind())
    .bind(target.id())
    .bind(actor.id())
    .bind(&input.body)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    tracing::info!(
        comment_id = comment.id,
        target = target.kind().as_str(),
        target_id = target.id(),
        project_id = resolved.project.id,
        actor_id = actor.id(),
        "comment created"
    );

    comment_view(pool, comment).await
}

/// Rewrites the body. The target is fixed at creation and never changes.
pub async fn update_comment(
    state: &AppState,
    actor: &Identity,
    id: Id,
    changes: CommentChanges,
) -> Result<CommentView> {
    let pool = &state.db.pool;
    let comment = lookup::comment(pool, id).await?;
    let project = resolve_owning_project(pool, &comment).await?;
    let access = membership::access(pool, &project, actor.id()).await?;
    authorize(
        actor,
        Action::UpdateComment {
            access,
            author_id: comment.user_id,
        },
    )?;

    require_body(&changes.body)?;

    let comment = sqlx::query_as::<_, Comment>(
        "UPDATE comments SET body = ?, updated_at = ? WHERE id = ? RETURNING *",
    )
    .bind(&changes.body)
    .bind(Utc::now())
    .bind(id)
    .fetch_one(pool)
    .await?;

    tracing::info!(comment_id = id, actor_id = actor.id(), "comment updated");

    comment_view(pool, comment).await
}

pub async fn delete_comment(state: &AppState, actor: &Identity, id: Id) -> Result<()> {
    let pool = &state.db.pool;
    let comment = lookup::comment(pool, id).await?;
    let project = resolve_owning_project(pool, &comment).await?;
    let access = membership::access(pool, &project, actor.id()).await?;
    authorize(actor, Action::DeleteComment(access))?;

    sqlx::query("DELETE FROM comments WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    tracing::info!(comment_id = id, project_id = project.id, actor_id = actor.id(), "comment deleted");

    Ok(())
}
