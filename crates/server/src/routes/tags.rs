use axum::{extract::State, http::StatusCode, routing::get, Router};

use crate::{
    authz::Identity,
    db::models::{Id, Tag},
    error::Result,
    services::{
        tags::{self, NewTag, TagChanges, TagFilters},
        Page,
    },
    AppState,
};
use super::extract::{Json, Path, Query};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tags).post(create_tag))
        .route(
            "/:id",
            get(get_tag)
                .put(update_tag)
                .patch(update_tag)
                .delete(delete_tag),
        )
}

async fn list_tags(
    State(state): State<AppState>,
    _actor: Identity,
    Query(filters): Query<TagFilters>,
) -> Result<Json<Page<Tag>>> {
    Ok(Json(tags::list_tags(&state, &filters).await?))
}

async fn create_tag(
    State(state): State<AppState>,
    actor: Identity,
    Json(body): Json<NewTag>,
) -> Result<(StatusCode, Json<Tag>)> {
    let tag = tags::create_tag(&state, &actor, body).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

async fn get_tag(
    State(state): State<AppState>,
    _actor: Identity,
    Path(id): Path<Id>,
) -> Result<Json<Tag>> {
    Ok(Json(tags::get_tag(&state, id).await?))
}

async fn update_tag(
    State(state): State<AppState>,
    actor: Identity,
    Path(id): Path<Id>,
    Json(body): Json<TagChanges>,
) -> Result<Json<Tag>> {
    Ok(Json(tags::update_tag(&state, &actor, id, body).await?))
}

async fn delete_tag(
    State(state): State<AppState>,
    actor: Identity,
    Path(id): Path<Id>,
) -> Result<StatusCode> {
    tags::delete_tag(&state, &actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
