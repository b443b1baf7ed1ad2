use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use jsonwebtoken::{decode, DecodingKey, Validation};

use crate::{
    authz::Identity,
    db::models::Id,
    error::{AppError, Result},
    routes::auth::{self, Claims},
    AppState,
};

/// Resolves the bearer token to the acting user's identity, including the
/// roles and permissions it holds at request time. Tokens revoked by logout
/// are refused.
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let TypedHeader(authorization) = bearer.ok_or(AppError::Unauthorized)?;

    let token_data = decode::<Claims>(
        authorization.token(),
        &DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!(error = %e, "rejected bearer token");
        AppError::Unauthorized
    })?;

    let claims = token_data.claims;
    let user_id: Id = claims.sub.parse().map_err(|_| AppError::Unauthorized)?;

    if auth::is_revoked(&state.db.pool, &claims.jti).await? {
        tracing::debug!(user_id, "rejected revoked bearer token");
        return Err(AppError::Unauthorized);
    }

    // A token for a user that no longer exists is not an authentication.
    let identity = match Identity::load(&state.db.pool, user_id).await {
        Ok(identity) => identity,
        Err(AppError::NotFound(_)) => return Err(AppError::Unauthorized),
        Err(e) => return Err(e),
    };

    request.extensions_mut().insert(identity);
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}
