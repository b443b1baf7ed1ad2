use axum::{
    extract::State,
    http::StatusCode,
    routing::{post, put},
    Router,
};

use crate::{
    authz::Identity,
    db::models::Id,
    error::Result,
    services::comments::{self, CommentChanges, CommentView, NewComment},
    AppState,
};
use super::extract::{Json, Path};

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(create_comment)).route(
        "/:id",
        put(update_comment)
            .patch(update_comment)
            .delete(delete_comment),
    )
}

async fn create_comment(
    State(state): State<AppState>,
    actor: Identity,
    Json(body): Json<NewComment>,
) -> Result<(StatusCode, Json<CommentView>)> {
    let comment = comments::create_comment(&state, &actor, body).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn update_comment(
    State(state): State<AppState>,
    actor: Identity,
    Path(id): Path<Id>,
    Json(body): Json<CommentChanges>,
) -> Result<Json<CommentView>> {
    Ok(Json(comments::update_comment(&state, &actor, id, body).await?))
}

async fn delete_comment(
    State(state): State<AppState>,
    actor: Identity,
    Path(id): Path<Id>,
) -> Result<StatusCode> {
    comments::delete_comment(&state, &actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
