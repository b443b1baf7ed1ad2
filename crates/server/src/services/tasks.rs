use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqliteExecutor};

use crate::{
    authz::{authorize, evaluate, membership, Action, Identity},
    db::{
        lookup,
        models::{Id, Task, TaskPriority, TaskStatus, UserSummary},
    },
    error::{AppError, Result},
    services::{
        cache::ListScope, ensure_user_exists, nullable, page_window, require_text, Page,
    },
    AppState,
};

pub const PER_PAGE: i64 = 15;

#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub project_id: Id,
    #[serde(default)]
    pub assignee_id: Option<Id>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub parent_id: Option<Id>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskChanges {
    pub project_id: Option<Id>,
    #[serde(default, deserialize_with = "nullable")]
    pub assignee_id: Option<Option<Id>>,
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    #[serde(default, deserialize_with = "nullable")]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")]
    pub parent_id: Option<Option<Id>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct StatusUpdate {
    pub id: Id,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkOutcome {
    pub updated: Vec<Id>,
    pub skipped: Vec<Id>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskFilters {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub assignee_id: Option<Id>,
    pub project_id: Option<Id>,
    pub tag: Option<String>,
    pub due_date_from: Option<NaiveDate>,
    pub due_date_to: Option<NaiveDate>,
    #[serde(default)]
    pub with_trashed: bool,
    pub page: Option<i64>,
}

impl TaskFilters {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.priority.is_none()
            && self.assignee_id.is_none()
            && self.project_id.is_none()
            && self.tag.is_none()
            && self.due_date_from.is_none()
            && self.due_date_to.is_none()
            && !self.with_trashed
            && self.page.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: Task,
    pub assignee: Option<UserSummary>,
    pub tags: Vec<String>,
}

/// `completed_at` is set exactly while the status is `done`. A task that was
/// already done keeps its original completion time.
pub fn completion_stamp(
    status: TaskStatus,
    previous: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match status {
        TaskStatus::Done => Some(previous.unwrap_or(now)),
        _ => None,
    }
}

async fn task_view(pool: &sqlx::SqlitePool, task: Task) -> Result<TaskView> {
    let assignee = match task.assignee_id {
        Some(id) => {
            sqlx::query_as::<_, UserSummary>("SELECT id, name, email FROM users WHERE id = ?")
                .bind(id)
                .fetch_optional(pool)
                .await?
        }
        None => None,
    };

    let tags = sqlx::query_scalar::<_, String>(
        "SELECT t.name FROM tags t JOIN task_tag tt ON tt.tag_id = t.id WHERE tt.task_id = ? ORDER BY t.name",
    )
    .bind(task.id)
    .fetch_all(pool)
    .await?;

    Ok(TaskView {
        task,
        assignee,
        tags,
    })
}

async fn task_view_by_id(pool: &sqlx::SqlitePool, id: Id) -> Result<TaskView> {
    let task = lookup::task_with_trashed(pool, id).await?;
    task_view(pool, task).await
}

fn push_visible_scope(query: &mut QueryBuilder<'_, Sqlite>, user_id: Id, filters: &TaskFilters) {
    query
        .push(" WHERE EXISTS (SELECT 1 FROM projects p WHERE p.id = t.project_id AND p.deleted_at IS NULL AND (p.owner_id = ")
        .push_bind(user_id)
        .push(" OR EXISTS (SELECT 1 FROM project_members pm WHERE pm.project_id = p.id AND pm.user_id = ")
        .push_bind(user_id)
        .push(")))");

    if !filters.with_trashed {
        query.push(" AND t.deleted_at IS NULL");
    }
    if let Some(status) = filters.status {
        query.push(" AND t.status = ").push_bind(status);
    }
    if let Some(priority) = filters.priority {
        query.push(" AND t.priority = ").push_bind(priority);
    }
    if let Some(assignee_id) = filters.assignee_id {
        query.push(" AND t.assignee_id = ").push_bind(assignee_id);
    }
    if let Some(project_id) = filters.project_id {
        query.push(" AND t.project_id = ").push_bind(project_id);
    }
    if let Some(tag) = &filters.tag {
        query
            .push(" AND EXISTS (SELECT 1 FROM task_tag tt JOIN tags g ON g.id = tt.tag_id WHERE tt.task_id = t.id AND g.slug = ")
            .push_bind(tag.clone())
            .push(")");
    }
    if let Some(from) = filters.due_date_from {
        query.push(" AND t.due_date >= ").push_bind(from);
    }
    if let Some(to) = filters.due_date_to {
        query.push(" AND t.due_date <= ").push_bind(to);
    }
}

async fn validate_parent(pool: &sqlx::SqlitePool, parent_id: Id, task_id: Option<Id>) -> Result<()> {
    if Some(parent_id) == task_id {
        return Err(AppError::Validation(
            "A task cannot be its own parent".to_string(),
        ));
    }
    if lookup::find_task(pool, parent_id).await?.is_none() {
        return Err(AppError::Validation(
            "The selected parent is invalid".to_string(),
        ));
    }
    Ok(())
}

async fn validate_project(pool: &sqlx::SqlitePool, project_id: Id) -> Result<()> {
    match lookup::project(pool, project_id).await {
        Ok(_) => Ok(()),
        Err(AppError::NotFound(_)) => Err(AppError::Validation(
            "The selected project is invalid".to_string(),
        )),
        Err(e) => Err(e),
    }
}

async fn write_status<'e, E>(executor: E, task: &Task, status: TaskStatus) -> Result<()>
where
    E: SqliteExecutor<'e>,
{
    let now = Utc::now();
    let completed_at = completion_stamp(status, task.completed_at, now);

    sqlx::query("UPDATE tasks SET status = ?, completed_at = ?, updated_at = ? WHERE id = ?")
        .bind(status)
        .bind(completed_at)
        .bind(now)
        .bind(task.id)
        .execute(executor)
        .await?;

    Ok(())
}

pub async fn list_tasks(
    state: &AppState,
    actor: &Identity,
    filters: &TaskFilters,
) -> Result<Page<TaskView>> {
    let cacheable = filters.is_empty();
    if cacheable {
        if let Some(page) = state.cache.get(ListScope::Tasks, actor.id()).await {
            return Ok(page);
        }
    }

    let (page, offset) = page_window(filters.page, PER_PAGE);

    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM tasks t");
    push_visible_scope(&mut count, actor.id(), filters);
    let total = count
        .build_query_scalar::<i64>()
        .fetch_one(&state.db.pool)
        .await?;

    let mut query = QueryBuilder::<Sqlite>::new("SELECT t.* FROM tasks t");
    push_visible_scope(&mut query, actor.id(), filters);
    query
        .push(" ORDER BY t.created_at DESC, t.id DESC LIMIT ")
        .push_bind(PER_PAGE)
        .push(" OFFSET ")
        .push_bind(offset);

    let tasks = query
        .build_query_as::<Task>()
        .fetch_all(&state.db.pool)
        .await?;

    let mut views = Vec::with_capacity(tasks.len());
    for task in tasks {
        views.push(task_view(&state.db.pool, task).await?);
    }

    let result = Page::new(views, page, PER_PAGE, total);

    if cacheable {
        state.cache.set(ListScope::Tasks, actor.id(), &result).await;
    }

    Ok(result)
}

pub async fn get_task(state: &AppState, actor: &Identity, id: Id) -> Result<TaskView> {
    let task = lookup::task(&state.db.pool, id).await?;
    let project = lookup::project(&state.db.pool, task.project_id).await?;
    let access = membership::access(&state.db.pool, &project, actor.id()).await?;
    authorize(actor, Action::ViewTask(access))?;

    task_view(&state.db.pool, task).await
}

pub async fn create_task(state: &AppState, actor: &Identity, input: NewTask) -> Result<TaskView> {
    authorize(actor, Action::ManageTask)?;

    let pool = &state.db.pool;
    require_text(&input.title, "title", 255)?;
    validate_project(pool, input.project_id).await?;
    if let Some(assignee_id) = input.assignee_id {
        ensure_user_exists(pool, assignee_id, "assignee").await?;
    }
    if let Some(parent_id) = input.parent_id {
        validate_parent(pool, parent_id, None).await?;
    }

    let now = Utc::now();
    let status = input.status.unwrap_or_default();

    let id = sqlx::query_scalar::<_, Id>(
        r#"
        INSERT INTO tasks (project_id, assignee_id, title, description, status, priority, due_date, completed_at, parent_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(input.project_id)
    .bind(input.assignee_id)
    .bind(input.title.trim())
    .bind(&input.description)
    .bind(status)
    .bind(input.priority.unwrap_or_default())
    .bind(input.due_date)
    .bind(completion_stamp(status, None, now))
    .bind(input.parent_id)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    if let Some(assignee_id) = input.assignee_id {
        state.notifier.task_assigned(id, assignee_id);
    }
    state.cache.invalidate(ListScope::Tasks, actor.id()).await;
    tracing::info!(task_id = id, project_id = input.project_id, actor_id = actor.id(), "task created");

    task_view_by_id(pool, id).await
}

pub async fn update_task(
    state: &AppState,
    actor: &Identity,
    id: Id,
    changes: TaskChanges,
) -> Result<TaskView> {
    authorize(actor, Action::ManageTask)?;

    let pool = &state.db.pool;
    let mut task = lookup::task(pool, id).await?;
    let previous_assignee = task.assignee_id;

    if let Some(project_id) = changes.project_id {
        validate_project(pool, project_id).await?;
        task.project_id = project_id;
    }
    if let Some(assignee_id) = changes.assignee_id {
        if let Some(assignee_id) = assignee_id {
            ensure_user_exists(pool, assignee_id, "assignee").await?;
        }
        task.assignee_id = assignee_id;
    }
    if let Some(title) = changes.title {
        require_text(&title, "title", 255)?;
        task.title = title.trim().to_string();
    }
    if let Some(description) = changes.description {
        task.description = description;
    }
    if let Some(priority) = changes.priority {
        task.priority = priority;
    }
    if let Some(due_date) = changes.due_date {
        task.due_date = due_date;
    }
    if let Some(parent_id) = changes.parent_id {
        if let Some(parent_id) = parent_id {
            validate_parent(pool, parent_id, Some(id)).await?;
        }
        task.parent_id = parent_id;
    }

    let now = Utc::now();
    if let Some(status) = changes.status {
        task.completed_at = completion_stamp(status, task.completed_at, now);
        task.status = status;
    }

    sqlx::query(
        r#"
        UPDATE tasks
        SET project_id = ?, assignee_id = ?, title = ?, description = ?, status = ?, priority = ?,
            due_date = ?, completed_at = ?, parent_id = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(task.project_id)
    .bind(task.assignee_id)
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.status)
    .bind(task.priority)
    .bind(task.due_date)
    .bind(task.completed_at)
    .bind(task.parent_id)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    if let Some(assignee_id) = task.assignee_id {
        if previous_assignee != Some(assignee_id) {
            state.notifier.task_assigned(id, assignee_id);
        }
    }
    state.cache.invalidate(ListScope::Tasks, actor.id()).await;
    tracing::info!(task_id = id, actor_id = actor.id(), "task updated");

    task_view_by_id(pool, id).await
}

pub async fn delete_task(state: &AppState, actor: &Identity, id: Id) -> Result<()> {
    authorize(actor, Action::ManageTask)?;

    let task = lookup::task(&state.db.pool, id).await?;
    let now = Utc::now();

    sqlx::query("UPDATE tasks SET deleted_at = ?, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(now)
        .bind(task.id)
        .execute(&state.db.pool)
        .await?;

    state.cache.invalidate(ListScope::Tasks, actor.id()).await;
    tracing::info!(task_id = id, actor_id = actor.id(), "task deleted");

    Ok(())
}

pub async fn restore_task(state: &AppState, actor: &Identity, id: Id) -> Result<TaskView> {
    authorize(actor, Action::ManageTask)?;

    let task = lookup::task_with_trashed(&state.db.pool, id).await?;

    sqlx::query("UPDATE tasks SET deleted_at = NULL, updated_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(task.id)
        .execute(&state.db.pool)
        .await?;

    state.cache.invalidate(ListScope::Tasks, actor.id()).await;
    tracing::info!(task_id = id, actor_id = actor.id(), "task restored");

    task_view_by_id(&state.db.pool, id).await
}

/// Changes only the status. Open to task managers and to the task's assignee.
pub async fn update_task_status(
    state: &AppState,
    actor: &Identity,
    id: Id,
    status: TaskStatus,
) -> Result<TaskView> {
    let task = lookup::task(&state.db.pool, id).await?;
    authorize(
        actor,
        Action::UpdateTaskStatus {
            assignee_id: task.assignee_id,
        },
    )?;

    write_status(&state.db.pool, &task, status).await?;

    state.cache.invalidate(ListScope::Tasks, actor.id()).await;
    tracing::info!(task_id = id, status = ?status, actor_id = actor.id(), "task status updated");

    task_view_by_id(&state.db.pool, id).await
}

/// Applies status changes in order inside one transaction. Items naming a
/// missing task, or a task the actor may not change, are skipped without
/// failing the batch.
pub async fn bulk_update_task_status(
    state: &AppState,
    actor: &Identity,
    updates: &[StatusUpdate],
) -> Result<BulkOutcome> {
    if updates.is_empty() {
        return Err(AppError::Validation(
            "The updates field is required".to_string(),
        ));
    }

    let mut outcome = BulkOutcome::default();
    let mut tx = state.db.pool.begin().await?;

    for update in updates {
        let Some(task) = lookup::find_task(&mut *tx, update.id).await? else {
            tracing::debug!(task_id = update.id, "bulk status: task not found, skipping");
            outcome.skipped.push(update.id);
            continue;
        };

        let action = Action::UpdateTaskStatus {
            assignee_id: task.assignee_id,
        };
        if !evaluate(actor, action).is_allowed() {
            tracing::debug!(task_id = update.id, actor_id = actor.id(), "bulk status: not permitted, skipping");
            outcome.skipped.push(update.id);
            continue;
        }

        write_status(&mut *tx, &task, update.status).await?;
        outcome.updated.push(update.id);
    }

    tx.commit().await?;

    state.cache.invalidate(ListScope::Tasks, actor.id()).await;
    tracing::info!(
        actor_id = actor.id(),
        updated = outcome.updated.len(),
        skipped = outcome.skipped.len(),
        "bulk task status update"
    );

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn completion_stamp_tracks_done() {
        let now = Utc::now();
        let earlier = now - Duration::hours(3);

        assert_eq!(completion_stamp(TaskStatus::Done, None, now), Some(now));
        assert_eq!(
            completion_stamp(TaskStatus::Done, Some(earlier), now),
            Some(earlier)
        );
        for status in [TaskStatus::Todo, TaskStatus::InProgress, TaskStatus::Blocked] {
            assert_eq!(completion_stamp(status, Some(earlier), now), None);
        }
    }

    #[test]
    fn unknown_status_fails_to_deserialize() {
        let bad = serde_json::from_str::<StatusUpdate>(r#"{"id": 1, "status": "finished"}"#);
        assert!(bad.is_err());
        let good: StatusUpdate =
            serde_json::from_str(r#"{"id": 1, "status": "in_progress"}"#).unwrap();
        assert_eq!(good.status, TaskStatus::InProgress);
    }
}
