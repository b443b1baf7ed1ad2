use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;

use crate::{
    authz::{membership::MemberSummary, Identity},
    db::models::{Id, MemberRole, ProjectMember},
    error::Result,
    services::{
        projects::{self, NewProject, ProjectChanges, ProjectFilters, ProjectView},
        Page,
    },
    AppState,
};
use super::extract::{Json, Path, Query};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_projects).post(create_project))
        .route(
            "/:id",
            get(get_project)
                .put(update_project)
                .patch(update_project)
                .delete(delete_project),
        )
        .route("/:id/restore", post(restore_project))
        .route("/:id/members", get(list_members).post(add_member))
        .route("/:id/members/:user_id", delete(remove_member))
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: Id,
    pub role: MemberRole,
}

async fn list_projects(
    State(state): State<AppState>,
    actor: Identity,
    Query(filters): Query<ProjectFilters>,
) -> Result<Json<Page<ProjectView>>> {
    Ok(Json(projects::list_projects(&state, &actor, &filters).await?))
}

async fn create_project(
    State(state): State<AppState>,
    actor: Identity,
    Json(body): Json<NewProject>,
) -> Result<(StatusCode, Json<ProjectView>)> {
    let project = projects::create_project(&state, &actor, body).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

async fn get_project(
    State(state): State<AppState>,
    actor: Identity,
    Path(id): Path<Id>,
) -> Result<Json<ProjectView>> {
    Ok(Json(projects::get_project(&state, &actor, id).await?))
}

async fn update_project(
    State(state): State<AppState>,
    actor: Identity,
    Path(id): Path<Id>,
    Json(body): Json<ProjectChanges>,
) -> Result<Json<ProjectView>> {
    Ok(Json(projects::update_project(&state, &actor, id, body).await?))
}

async fn delete_project(
    State(state): State<AppState>,
    actor: Identity,
    Path(id): Path<Id>,
) -> Result<StatusCode> {
    projects::delete_project(&state, &actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn restore_project(
    State(state): State<AppState>,
    actor: Identity,
    Path(id): Path<Id>,
) -> Result<Json<ProjectView>> {
    Ok(Json(projects::restore_project(&state, &actor, id).await?))
}

async fn list_members(
    State(state): State<AppState>,
    actor: Identity,
    Path(id): Path<Id>,
) -> Result<Json<Vec<MemberSummary>>> {
    Ok(Json(projects::list_members(&state, &actor, id).await?))
}

async fn add_member(
    State(state): State<AppState>,
    actor: Identity,
    Path(id): Path<Id>,
    Json(body): Json<AddMemberRequest>,
) -> Result<(StatusCode, Json<ProjectMember>)> {
    let member = projects::add_member(&state, &actor, id, body.user_id, body.role).await?;
    Ok((StatusCode::CREATED, Json(member)))
}

async fn remove_member(
    State(state): State<AppState>,
    actor: Identity,
    Path((id, user_id)): Path<(Id, Id)>,
) -> Result<StatusCode> {
    projects::remove_member(&state, &actor, id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
