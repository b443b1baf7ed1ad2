use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Extension, Router,
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use sqlx::SqliteExecutor;
use uuid::Uuid;

use crate::{
    authz::{
        identity::{self, DEFAULT_ROLE},
        Identity,
    },
    db::models::{Id, User, UserSummary},
    error::{conflict_on_unique, AppError, Result},
    AppState,
};
use super::extract::Json;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

/// Routes under `/auth` that need an authenticated actor.
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(me))
        .route("/auth/logout", post(logout))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub email: String,
    pub name: String,
    pub exp: usize,
    /// Token id, the key logout revokes.
    pub jti: String,
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|_| AppError::Internal("Failed to hash password".to_string()))
}

fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Issues a bearer token valid for seven days.
pub fn create_token(user: &UserSummary, secret: &str) -> Result<String> {
    let expiration = Utc::now()
        .checked_add_signed(chrono::Duration::days(7))
        .ok_or_else(|| AppError::Internal("Token expiry out of range".to_string()))?
        .timestamp() as usize;

    let claims = Claims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        name: user.name.clone(),
        exp: expiration,
        jti: Uuid::new_v4().to_string(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AppError::Internal("Failed to create token".to_string()))
}

async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    let email = body.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::Validation("Invalid email address".to_string()));
    }
    if body.name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }
    if body.password.len() < 8 {
        return Err(AppError::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    let password_hash = hash_password(&body.password)?;
    let now = Utc::now();

    let mut tx = state.db.pool.begin().await?;

    let user_id = sqlx::query_scalar::<_, Id>(
        "INSERT INTO users (name, email, password_hash, created_at, updated_at) VALUES (?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(body.name.trim())
    .bind(&email)
    .bind(&password_hash)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| conflict_on_unique(e, "Email already registered"))?;

    if !identity::assign_role(&mut *tx, user_id, DEFAULT_ROLE).await? {
        tracing::warn!(user_id, role = DEFAULT_ROLE, "default role is not seeded");
    }

    tx.commit().await?;

    let user = UserSummary {
        id: user_id,
        name: body.name.trim().to_string(),
        email,
    };
    let token = create_token(&user, &state.config.jwt_secret)?;

    tracing::info!(user_id, "user registered");

    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(body.email.trim().to_lowercase())
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !verify_password(&body.password, &user.password_hash)? {
        return Err(AppError::Unauthorized);
    }

    let user = UserSummary {
        id: user.id,
        name: user.name,
        email: user.email,
    };
    let token = create_token(&user, &state.config.jwt_secret)?;

    Ok(Json(AuthResponse { token, user }))
}

async fn me(actor: Identity) -> Json<Identity> {
    Json(actor)
}

async fn logout(
    State(state): State<AppState>,
    actor: Identity,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode> {
    revoke_token(&state.db.pool, &claims, actor.id()).await?;

    tracing::info!(user_id = actor.id(), "user logged out");

    Ok(StatusCode::NO_CONTENT)
}

pub async fn is_revoked<'e>(executor: impl SqliteExecutor<'e>, jti: &str) -> Result<bool> {
    let revoked = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM revoked_tokens WHERE jti = ?")
        .bind(jti)
        .fetch_one(executor)
        .await?;
    Ok(revoked > 0)
}

/// Records the token id until the token would have expired anyway.
async fn revoke_token(pool: &sqlx::SqlitePool, claims: &Claims, user_id: Id) -> Result<()> {
    let now = Utc::now();
    let expires_at = DateTime::from_timestamp(claims.exp as i64, 0).unwrap_or(now);

    sqlx::query(
        "INSERT OR IGNORE INTO revoked_tokens (jti, user_id, expires_at, revoked_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&claims.jti)
    .bind(user_id)
    .bind(expires_at)
    .bind(now)
    .execute(pool)
    .await?;

    // Past `exp` the token is rejected before this table is consulted.
    sqlx::query("DELETE FROM revoked_tokens WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(())
}
