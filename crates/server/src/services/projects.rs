use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};

use crate::{
    authz::{
        authorize,
        membership::{self, MemberSummary},
        Action, Identity,
    },
    db::{
        lookup,
        models::{Id, MemberRole, Project, ProjectMember, ProjectStatus, UserSummary},
    },
    error::{AppError, Result},
    services::{
        cache::ListScope, ensure_user_exists, nullable, page_window, require_text, Page,
    },
    AppState,
};

pub const PER_PAGE: i64 = 15;

#[derive(Debug, Clone, Deserialize)]
pub struct NewProject {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<ProjectStatus>,
    #[serde(default)]
    pub starts_at: Option<NaiveDate>,
    #[serde(default)]
    pub ends_at: Option<NaiveDate>,
    pub owner_id: Id,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectChanges {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub status: Option<ProjectStatus>,
    #[serde(default, deserialize_with = "nullable")]
    pub starts_at: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")]
    pub ends_at: Option<Option<NaiveDate>>,
    pub owner_id: Option<Id>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectFilters {
    pub name: Option<String>,
    pub status: Option<ProjectStatus>,
    pub owner_id: Option<Id>,
    pub starts_at_from: Option<NaiveDate>,
    pub starts_at_to: Option<NaiveDate>,
    pub ends_at_from: Option<NaiveDate>,
    pub ends_at_to: Option<NaiveDate>,
    #[serde(default)]
    pub with_trashed: bool,
    pub page: Option<i64>,
}

impl ProjectFilters {
    /// Only the plain first-page index is cached.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.status.is_none()
            && self.owner_id.is_none()
            && self.starts_at_from.is_none()
            && self.starts_at_to.is_none()
            && self.ends_at_from.is_none()
            && self.ends_at_to.is_none()
            && !self.with_trashed
            && self.page.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectView {
    #[serde(flatten)]
    pub project: Project,
    pub owner: UserSummary,
    pub members_count: i64,
    pub tasks_count: i64,
}

#[derive(sqlx::FromRow)]
struct ProjectRow {
    #[sqlx(flatten)]
    project: Project,
    owner_name: String,
    owner_email: String,
    members_count: i64,
    tasks_count: i64,
}

impl From<ProjectRow> for ProjectView {
    fn from(row: ProjectRow) -> Self {
        let owner = UserSummary {
            id: row.project.owner_id,
            name: row.owner_name,
            email: row.owner_email,
        };
        Self {
            project: row.project,
            owner,
            members_count: row.members_count,
            tasks_count: row.tasks_count,
        }
    }
}

const VIEW_SELECT: &str = r#"
    SELECT p.*, u.name AS owner_name, u.email AS owner_email,
        (SELECT COUNT(*) FROM project_members pm WHERE pm.project_id = p.id) AS members_count,
        (SELECT COUNT(*) FROM tasks t WHERE t.project_id = p.id AND t.deleted_at IS NULL) AS tasks_count
    FROM projects p
    JOIN users u ON u.id = p.owner_id
"#;

async fn project_view(pool: &sqlx::SqlitePool, id: Id) -> Result<ProjectView> {
    let mut query = QueryBuilder::<Sqlite>::new(VIEW_SELECT);
    query.push(" WHERE p.id = ").push_bind(id);

    let row = query
        .build_query_as::<ProjectRow>()
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))?;

    Ok(row.into())
}

fn push_visible_scope(query: &mut QueryBuilder<'_, Sqlite>, user_id: Id, filters: &ProjectFilters) {
    query
        .push(" WHERE (p.owner_id = ")
        .push_bind(user_id)
        .push(" OR EXISTS (SELECT 1 FROM project_members pm WHERE pm.project_id = p.id AND pm.user_id = ")
        .push_bind(user_id)
        .push("))");

    if !filters.with_trashed {
        query.push(" AND p.deleted_at IS NULL");
    }
    if let Some(name) = &filters.name {
        query.push(" AND p.name LIKE ").push_bind(format!("%{name}%"));
    }
    if let Some(status) = filters.status {
        query.push(" AND p.status = ").push_bind(status);
    }
    if let Some(owner_id) = filters.owner_id {
        query.push(" AND p.owner_id = ").push_bind(owner_id);
    }
    if let Some(from) = filters.starts_at_from {
        query.push(" AND p.starts_at >= ").push_bind(from);
    }
    if let Some(to) = filters.starts_at_to {
        query.push(" AND p.starts_at <= ").push_bind(to);
    }
    if let Some(from) = filters.ends_at_from {
        query.push(" AND p.ends_at >= ").push_bind(from);
    }
    if let Some(to) = filters.ends_at_to {
        query.push(" AND p.ends_at <= ").push_bind(to);
    }
}

fn validate_window(starts_at: Option<NaiveDate>, ends_at: Option<NaiveDate>) -> Result<()> {
    if let (Some(starts), Some(ends)) = (starts_at, ends_at) {
        if ends < starts {
            return Err(AppError::Validation(
                "The ends at must be a date after or equal to starts at".to_string(),
            ));
        }
    }
    Ok(())
}

async fn invalidate_lists(state: &AppState, user_id: Id) {
    state.cache.invalidate(ListScope::Projects, user_id).await;
}

/// Projects the actor owns or belongs to.
pub async fn list_projects(
    state: &AppState,
    actor: &Identity,
    filters: &ProjectFilters,
) -> Result<Page<ProjectView>> {
    let cacheable = filters.is_empty();
    if cacheable {
        if let Some(page) = state.cache.get(ListScope::Projects, actor.id()).await {
            return Ok(page);
        }
    }

    let (page, offset) = page_window(filters.page, PER_PAGE);

    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM projects p");
    push_visible_scope(&mut count, actor.id(), filters);
    let total = count
        .build_query_scalar::<i64>()
        .fetch_one(&state.db.pool)
        .await?;

    let mut query = QueryBuilder::<Sqlite>::new(VIEW_SELECT);
    push_visible_scope(&mut query, actor.id(), filters);
    query
        .push(" ORDER BY p.created_at DESC, p.id DESC LIMIT ")
        .push_bind(PER_PAGE)
        .push(" OFFSET ")
        .push_bind(offset);

    let rows = query
        .build_query_as::<ProjectRow>()
        .fetch_all(&state.db.pool)
        .await?;

    let result = Page::new(rows.into_iter().map(Into::into).collect(), page, PER_PAGE, total);

    if cacheable {
        state.cache.set(ListScope::Projects, actor.id(), &result).await;
    }

    Ok(result)
}

pub async fn get_project(state: &AppState, actor: &Identity, id: Id) -> Result<ProjectView> {
    let project = lookup::project(&state.db.pool, id).await?;
    let access = membership::access(&state.db.pool, &project, actor.id()).await?;
    authorize(actor, Action::ViewProject(access))?;

    project_view(&state.db.pool, id).await
}

pub async fn create_project(
    state: &AppState,
    actor: &Identity,
    input: NewProject,
) -> Result<ProjectView> {
    authorize(actor, Action::ManageProject)?;

    require_text(&input.name, "name", 255)?;
    validate_window(input.starts_at, input.ends_at)?;
    ensure_user_exists(&state.db.pool, input.owner_id, "owner").await?;

    let now = Utc::now();
    let id = sqlx::query_scalar::<_, Id>(
        r#"
        INSERT INTO projects (name, description, status, starts_at, ends_at, owner_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(input.name.trim())
    .bind(&input.description)
    .bind(input.status.unwrap_or_default())
    .bind(input.starts_at)
    .bind(input.ends_at)
    .bind(input.owner_id)
    .bind(now)
    .bind(now)
    .fetch_one(&state.db.pool)
    .await?;

    invalidate_lists(state, actor.id()).await;
    tracing::info!(project_id = id, actor_id = actor.id(), "project created");

    project_view(&state.db.pool, id).await
}

pub async fn update_project(
    state: &AppState,
    actor: &Identity,
    id: Id,
    changes: ProjectChanges,
) -> Result<ProjectView> {
    authorize(actor, Action::ManageProject)?;

    let mut project = lookup::project(&state.db.pool, id).await?;

    if let Some(name) = changes.name {
        require_text(&name, "name", 255)?;
        project.name = name.trim().to_string();
    }
    if let Some(description) = changes.description {
        project.description = description;
    }
    if let Some(status) = changes.status {
        project.status = status;
    }
    if let Some(starts_at) = changes.starts_at {
        project.starts_at = starts_at;
    }
    if let Some(ends_at) = changes.ends_at {
        project.ends_at = ends_at;
    }
    if let Some(owner_id) = changes.owner_id {
        ensure_user_exists(&state.db.pool, owner_id, "owner").await?;
        project.owner_id = owner_id;
    }
    validate_window(project.starts_at, project.ends_at)?;

    sqlx::query(
        r#"
        UPDATE projects
        SET name = ?, description = ?, status = ?, starts_at = ?, ends_at = ?, owner_id = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&project.name)
    .bind(&project.description)
    .bind(project.status)
    .bind(project.starts_at)
    .bind(project.ends_at)
    .bind(project.owner_id)
    .bind(Utc::now())
    .bind(id)
    .execute(&state.db.pool)
    .await?;

    invalidate_lists(state, actor.id()).await;
    tracing::info!(project_id = id, actor_id = actor.id(), "project updated");

    project_view(&state.db.pool, id).await
}

/// Soft-deletes the project. Its rows stay in place until restored.
pub async fn delete_project(state: &AppState, actor: &Identity, id: Id) -> Result<()> {
    authorize(actor, Action::ManageProject)?;

    let project = lookup::project(&state.db.pool, id).await?;
    let now = Utc::now();

    sqlx::query("UPDATE projects SET deleted_at = ?, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(now)
        .bind(project.id)
        .execute(&state.db.pool)
        .await?;

    invalidate_lists(state, actor.id()).await;
    tracing::info!(project_id = id, actor_id = actor.id(), "project deleted");

    Ok(())
}

pub async fn restore_project(state: &AppState, actor: &Identity, id: Id) -> Result<ProjectView> {
    authorize(actor, Action::ManageProject)?;

    let project = lookup::project_with_trashed(&state.db.pool, id).await?;

    sqlx::query("UPDATE projects SET deleted_at = NULL, updated_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(project.id)
        .execute(&state.db.pool)
        .await?;

    invalidate_lists(state, actor.id()).await;
    tracing::info!(project_id = id, actor_id = actor.id(), "project restored");

    project_view(&state.db.pool, id).await
}

pub async fn list_members(
    state: &AppState,
    actor: &Identity,
    project_id: Id,
) -> Result<Vec<MemberSummary>> {
    let project = lookup::project(&state.db.pool, project_id).await?;
    let access = membership::access(&state.db.pool, &project, actor.id()).await?;
    authorize(actor, Action::ViewProject(access))?;

    membership::list_members(&state.db.pool, project_id).await
}

pub async fn add_member(
    state: &AppState,
    actor: &Identity,
    project_id: Id,
    user_id: Id,
    role: MemberRole,
) -> Result<ProjectMember> {
    authorize(actor, Action::ManageMembers)?;

    let project = lookup::project(&state.db.pool, project_id).await?;
    ensure_user_exists(&state.db.pool, user_id, "user").await?;

    let member = membership::add_member(&state.db.pool, project.id, user_id, role).await?;

    // The member's own index now includes this project.
    invalidate_lists(state, user_id).await;
    state.cache.invalidate(ListScope::Tasks, user_id).await;
    tracing::info!(
        project_id,
        user_id,
        role = role.as_str(),
        actor_id = actor.id(),
        "project member added"
    );

    Ok(member)
}

pub async fn remove_member(
    state: &AppState,
    actor: &Identity,
    project_id: Id,
    user_id: Id,
) -> Result<()> {
    authorize(actor, Action::ManageMembers)?;

    let project = lookup::project(&state.db.pool, project_id).await?;
    ensure_user_exists(&state.db.pool, user_id, "user").await?;

    let removed = membership::remove_member(&state.db.pool, project.id, user_id).await?;

    invalidate_lists(state, user_id).await;
    state.cache.invalidate(ListScope::Tasks, user_id).await;
    tracing::info!(project_id, user_id, removed, actor_id = actor.id(), "project member removed");

    Ok(())
}
