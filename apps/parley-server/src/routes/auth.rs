//! Account registration and login, both of which issue session tokens.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{password, tokens};
use crate::error::{ApiError, ApiErrorBody, FieldError, StoreError};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

// ---------------------------------------------------------------------------
// POST /api/register
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
}

fn validate_registration(username: &str, password: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if username.len() < 3 || username.len() > 32 {
        errors.push(FieldError {
            field: "username".to_string(),
            message: "Username must be between 3 and 32 characters".to_string(),
        });
    } else if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
    {
        errors.push(FieldError {
            field: "username".to_string(),
            message: "Username may only contain letters, digits, '_', '.' and '-'".to_string(),
        });
    }

    if password.len() < 6 {
        errors.push(FieldError {
            field: "password".to_string(),
            message: "Password must be at least 6 characters".to_string(),
        });
    }

    errors
}

#[utoipa::path(
    post,
    path = "/api/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = TokenResponse),
        (status = 400, description = "Validation failed", body = ApiErrorBody),
        (status = 409, description = "Username already taken", body = ApiErrorBody),
    ),
)]
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    let username = body.username.trim();

    let errors = validate_registration(username, &body.password);
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let password_hash = password::hash_password(&body.password)?;

    let user = state
        .users
        .create(username, &password_hash)
        .await
        .map_err(|err| match err {
            StoreError::Conflict => ApiError::conflict("Username is already taken"),
            other => ApiError::from(other),
        })?;

    tracing::info!(user_id = %user.id, username = %user.username, "user registered");

    let token = tokens::issue_token(
        &user.id,
        &user.username,
        &state.config.jwt_secret,
        state.config.token_ttl(),
    )?;

    Ok((StatusCode::CREATED, Json(TokenResponse { token })))
}

// ---------------------------------------------------------------------------
// POST /api/login
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[utoipa::path(
    post,
    path = "/api/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 401, description = "Invalid credentials", body = ApiErrorBody),
    ),
)]
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let username = body.username.trim();

    // Unknown users and wrong passwords get the same response.
    let user = state
        .users
        .find_by_username(username)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    password::verify_password(&body.password, &user.password_hash)?;

    let token = tokens::issue_token(
        &user.id,
        &user.username,
        &state.config.jwt_secret,
        state.config.token_ttl(),
    )?;

    tracing::info!(user_id = %user.id, username = %user.username, "user logged in");

    Ok(Json(TokenResponse { token }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_accepts_reasonable_usernames() {
        assert!(validate_registration("alice", "hunter22").is_empty());
        assert!(validate_registration("a_b.c-d", "hunter22").is_empty());
        assert!(validate_registration("abc", "secret").is_empty());
    }

    #[test]
    fn validation_rejects_short_and_long_usernames() {
        assert_eq!(validate_registration("ab", "hunter22").len(), 1);
        let long = "a".repeat(33);
        assert_eq!(validate_registration(&long, "hunter22").len(), 1);
    }

    #[test]
    fn validation_rejects_odd_characters() {
        let errors = validate_registration("al ice", "hunter22");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "username");
    }

    #[test]
    fn validation_rejects_short_passwords() {
        let errors = validate_registration("alice", "12345");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "password");
    }

    #[test]
    fn validation_reports_all_problems_at_once() {
        let errors = validate_registration("a!", "123");
        assert_eq!(errors.len(), 2);
    }
}
