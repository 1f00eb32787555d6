use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{RegisterRequest, TokenResponse},
        extractors::AuthUser,
        services::{register as register_user, JwtKeys},
    },
    error::AppError,
    extract::ValidJson,
    state::AppState,
};

pub fn register_routes() -> Router<AppState> {
    Router::new().route("/register", post(register))
}

pub fn token_routes() -> Router<AppState> {
    Router::new().route("/token", post(issue_token))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<RegisterRequest>,
) -> Result<StatusCode, AppError> {
    info!(email = %payload.email, "registration request received");

    if !register_user(
        state.users.as_ref(),
        &state.config.hashing,
        &payload.email,
        &payload.password,
    )
    .await?
    {
        warn!(email = %payload.email, "email already registered");
        return Err(AppError::Duplicate("Email already registered".into()));
    }

    Ok(StatusCode::OK)
}

#[instrument(skip(state))]
pub async fn issue_token(
    State(state): State<AppState>,
    AuthUser(email): AuthUser,
) -> Result<Json<TokenResponse>, AppError> {
    let keys = JwtKeys::from_ref(&state);
    let access_token = keys.sign(&email)?;
    info!(%email, "access token issued");
    Ok(Json(TokenResponse {
        access_token,
        token_type: "Bearer",
        expires_in: keys.ttl.as_secs(),
    }))
}
