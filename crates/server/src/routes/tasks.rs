use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;

use crate::{
    authz::Identity,
    db::models::{Id, TaskStatus},
    error::Result,
    services::{
        tags,
        tasks::{self, BulkOutcome, NewTask, StatusUpdate, TaskChanges, TaskFilters, TaskView},
        Page,
    },
    AppState,
};
use super::extract::{Json, Path, Query};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tasks).post(create_task))
        .route("/bulk-status", post(bulk_update_status))
        .route(
            "/:id",
            get(get_task)
                .put(update_task)
                .patch(update_task)
                .delete(delete_task),
        )
        .route("/:id/status", put(update_status).patch(update_status))
        .route("/:id/restore", post(restore_task))
        .route("/:id/tags/:tag_id", post(assign_tag).delete(unassign_tag))
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: TaskStatus,
}

#[derive(Debug, Deserialize)]
pub struct BulkStatusRequest {
    pub updates: Vec<StatusUpdate>,
}

async fn list_tasks(
    State(state): State<AppState>,
    actor: Identity,
    Query(filters): Query<TaskFilters>,
) -> Result<Json<Page<TaskView>>> {
    Ok(Json(tasks::list_tasks(&state, &actor, &filters).await?))
}

async fn create_task(
    State(state): State<AppState>,
    actor: Identity,
    Json(body): Json<NewTask>,
) -> Result<(StatusCode, Json<TaskView>)> {
    let task = tasks::create_task(&state, &actor, body).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn get_task(
    State(state): State<AppState>,
    actor: Identity,
    Path(id): Path<Id>,
) -> Result<Json<TaskView>> {
    Ok(Json(tasks::get_task(&state, &actor, id).await?))
}

async fn update_task(
    State(state): State<AppState>,
    actor: Identity,
    Path(id): Path<Id>,
    Json(body): Json<TaskChanges>,
) -> Result<Json<TaskView>> {
    Ok(Json(tasks::update_task(&state, &actor, id, body).await?))
}

async fn delete_task(
    State(state): State<AppState>,
    actor: Identity,
    Path(id): Path<Id>,
) -> Result<StatusCode> {
    tasks::delete_task(&state, &actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn restore_task(
    State(state): State<AppState>,
    actor: Identity,
    Path(id): Path<Id>,
) -> Result<Json<TaskView>> {
    Ok(Json(tasks::restore_task(&state, &actor, id).await?))
}

async fn update_status(
    State(state): State<AppState>,
    actor: Identity,
    Path(id): Path<Id>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<TaskView>> {
    Ok(Json(
        tasks::update_task_status(&state, &actor, id, body.status).await?,
    ))
}

async fn bulk_update_status(
    State(state): State<AppState>,
    actor: Identity,
    Json(body): Json<BulkStatusRequest>,
) -> Result<Json<BulkOutcome>> {
    Ok(Json(
        tasks::bulk_update_task_status(&state, &actor, &body.updates).await?,
    ))
}

async fn assign_tag(
    State(state): State<AppState>,
    actor: Identity,
    Path((id, tag_id)): Path<(Id, Id)>,
) -> Result<StatusCode> {
    tags::assign_tag(&state, &actor, id, tag_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn unassign_tag(
    State(state): State<AppState>,
    actor: Identity,
    Path((id, tag_id)): Path<(Id, Id)>,
) -> Result<StatusCode> {
    tags::unassign_tag(&state, &actor, id, tag_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
