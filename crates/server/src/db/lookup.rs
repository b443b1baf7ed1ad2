//! Single-row loaders shared by the resolvers and the mutation services.
//!
//! Live lookups skip tombstoned rows; `_with_trashed` variants see them too.

use sqlx::SqliteExecutor;

use crate::{
    db::models::{Attachment, Comment, Id, Project, Tag, Task},
    error::{AppError, Result},
};

pub async fn project<'e, E>(executor: E, id: Id) -> Result<Project>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = ? AND deleted_at IS NULL")
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))
}

pub async fn project_with_trashed<'e, E>(executor: E, id: Id) -> Result<Project>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))
}

/// A live task under a live project. Trashing a project hides its tasks
/// without stamping them.
pub async fn find_task<'e, E>(executor: E, id: Id) -> Result<Option<Task>>
where
    E: SqliteExecutor<'e>,
{
    Ok(sqlx::query_as::<_, Task>(
        r#"
        SELECT t.* FROM tasks t
        JOIN projects p ON p.id = t.project_id
        WHERE t.id = ? AND t.deleted_at IS NULL AND p.deleted_at IS NULL
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await?)
}

pub async fn task<'e, E>(executor: E, id: Id) -> Result<Task>
where
    E: SqliteExecutor<'e>,
{
    find_task(executor, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Task not found".to_string()))
}

pub async fn task_with_trashed<'e, E>(executor: E, id: Id) -> Result<Task>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound("Task not found".to_string()))
}

pub async fn tag<'e, E>(executor: E, id: Id) -> Result<Tag>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, Tag>("SELECT * FROM tags WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound("Tag not found".to_string()))
}

pub async fn comment<'e, E>(executor: E, id: Id) -> Result<Comment>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, Comment>("SELECT * FROM comments WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))
}

pub async fn attachment<'e, E>(executor: E, id: Id) -> Result<Attachment>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, Attachment>("SELECT * FROM attachments WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound("Attachment not found".to_string()))
}

pub async fn user_exists<'e, E>(executor: E, id: Id) -> Result<bool>
where
    E: SqliteExecutor<'e>,
{
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id = ?")
        .bind(id)
        .fetch_one(executor)
        .await?;
    Ok(count > 0)
}
