use chrono::Utc;
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite};

use crate::{
    authz::{authorize, Action, Identity},
    db::{
        lookup,
        models::{Id, Tag},
    },
    error::{conflict_on_unique, AppError, Result},
    services::{cache::ListScope, nullable, page_window, require_text, Page},
    AppState,
};

pub const PER_PAGE: i64 = 20;
const SLUG_TAKEN: &str = "The slug has already been taken";

#[derive(Debug, Clone, Deserialize)]
pub struct NewTag {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagChanges {
    pub name: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagFilters {
    pub q: Option<String>,
    pub page: Option<i64>,
}

/// Lowercase ASCII words joined by single hyphens.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

fn checked_slug(explicit: Option<&str>, name: &str) -> Result<String> {
    let slug = match explicit.map(str::trim).filter(|s| !s.is_empty()) {
        Some(slug) => slug.to_string(),
        None => slugify(name),
    };
    if slug.is_empty() {
        return Err(AppError::Validation(
            "The slug could not be derived from the name".to_string(),
        ));
    }
    if slug.chars().count() > 120 {
        return Err(AppError::Validation(
            "The slug may not be greater than 120 characters".to_string(),
        ));
    }
    Ok(slug)
}

fn push_filter(query: &mut QueryBuilder<'_, Sqlite>, filters: &TagFilters) {
    if let Some(q) = &filters.q {
        query.push(" WHERE name LIKE ").push_bind(format!("%{q}%"));
    }
}

pub async fn list_tags(state: &AppState, filters: &TagFilters) -> Result<Page<Tag>> {
    let (page, offset) = page_window(filters.page, PER_PAGE);

    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM tags");
    push_filter(&mut count, filters);
    let total = count
        .build_query_scalar::<i64>()
        .fetch_one(&state.db.pool)
        .await?;

    let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM tags");
    push_filter(&mut query, filters);
    query
        .push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(PER_PAGE)
        .push(" OFFSET ")
        .push_bind(offset);

    let tags = query
        .build_query_as::<Tag>()
        .fetch_all(&state.db.pool)
        .await?;

    Ok(Page::new(tags, page, PER_PAGE, total))
}

pub async fn get_tag(state: &AppState, id: Id) -> Result<Tag> {
    lookup::tag(&state.db.pool, id).await
}

pub async fn create_tag(state: &AppState, actor: &Identity, input: NewTag) -> Result<Tag> {
    authorize(actor, Action::ManageTag)?;

    require_text(&input.name, "name", 100)?;
    let slug = checked_slug(input.slug.as_deref(), &input.name)?;

    let now = Utc::now();
    let tag = sqlx::query_as::<_, Tag>(
        r#"
        INSERT INTO tags (name, slug, description, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(input.name.trim())
    .bind(&slug)
    .bind(&input.description)
    .bind(now)
    .bind(now)
    .fetch_one(&state.db.pool)
    .await
    .map_err(|e| conflict_on_unique(e, SLUG_TAKEN))?;

    tracing::info!(tag_id = tag.id, slug = %tag.slug, actor_id = actor.id(), "tag created");

    Ok(tag)
}

pub async fn update_tag(
    state: &AppState,
    actor: &Identity,
    id: Id,
    changes: TagChanges,
) -> Result<Tag> {
    authorize(actor, Action::ManageTag)?;

    let mut tag = lookup::tag(&state.db.pool, id).await?;

    if let Some(name) = &changes.name {
        require_text(name, "name", 100)?;
        tag.name = name.trim().to_string();
    }
    // A renamed tag without an explicit slug gets a fresh one.
    if changes.slug.is_some() || changes.name.is_some() {
        tag.slug = checked_slug(changes.slug.as_deref(), &tag.name)?;
    }
    if let Some(description) = changes.description {
        tag.description = description;
    }

    let tag = sqlx::query_as::<_, Tag>(
        "UPDATE tags SET name = ?, slug = ?, description = ?, updated_at = ? WHERE id = ? RETURNING *",
    )
    .bind(&tag.name)
    .bind(&tag.slug)
    .bind(&tag.description)
    .bind(Utc::now())
    .bind(id)
    .fetch_one(&state.db.pool)
    .await
    .map_err(|e| conflict_on_unique(e, SLUG_TAKEN))?;

    tracing::info!(tag_id = id, actor_id = actor.id(), "tag updated");

    Ok(tag)
}

pub async fn delete_tag(state: &AppState, actor: &Identity, id: Id) -> Result<()> {
    authorize(actor, Action::ManageTag)?;

    let tag = lookup::tag(&state.db.pool, id).await?;

    sqlx::query("DELETE FROM tags WHERE id = ?")
        .bind(tag.id)
        .execute(&state.db.pool)
        .await?;

    tracing::info!(tag_id = id, actor_id = actor.id(), "tag deleted");

    Ok(())
}

pub async fn assign_tag(state: &AppState, actor: &Identity, task_id: Id, tag_id: Id) -> Result<()> {
    authorize(actor, Action::AssignTag)?;

    let task = lookup::task(&state.db.pool, task_id).await?;
    let tag = lookup::tag(&state.db.pool, tag_id).await?;

    sqlx::query("INSERT OR IGNORE INTO task_tag (task_id, tag_id) VALUES (?, ?)")
        .bind(task.id)
        .bind(tag.id)
        .execute(&state.db.pool)
        .await?;

    state.cache.invalidate(ListScope::Tasks, actor.id()).await;
    tracing::info!(task_id, tag_id, actor_id = actor.id(), "tag assigned");

    Ok(())
}

pub async fn unassign_tag(
    state: &AppState,
    actor: &Identity,
    task_id: Id,
    tag_id: Id,
) -> Result<()> {
    authorize(actor, Action::AssignTag)?;

    let task = lookup::task(&state.db.pool, task_id).await?;
    let tag = lookup::tag(&state.db.pool, tag_id).await?;

    sqlx::query("DELETE FROM task_tag WHERE task_id = ? AND tag_id = ?")
        .bind(task.id)
        .bind(tag.id)
        .execute(&state.db.pool)
        .await?;

    state.cache.invalidate(ListScope::Tasks, actor.id()).await;
    tracing::info!(task_id, tag_id, actor_id = actor.id(), "tag unassigned");

    Ok(())
}
