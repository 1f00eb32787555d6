use axum::{
    extract::{FromRef, Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use base64ct::{Base64, Encoding};
use tracing::warn;

use super::extractors::AuthUser;
use super::services::{verify_credentials, JwtKeys};
use crate::{error::AppError, state::AppState};

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Credentials {
    Basic { email: String, password: String },
    Bearer(String),
}

/// Parses an `Authorization` header value of the Basic or Bearer scheme.
pub(crate) fn parse_authorization(value: &str) -> Result<Credentials, AppError> {
    let (scheme, rest) = value
        .trim()
        .split_once(' ')
        .ok_or_else(|| AppError::Unauthenticated("Invalid Authorization header".into()))?;
    let rest = rest.trim();

    if scheme.eq_ignore_ascii_case("basic") {
        let decoded = Base64::decode_vec(rest)
            .ok()
            .and_then(|raw| String::from_utf8(raw).ok())
            .ok_or_else(|| AppError::Unauthenticated("Malformed Basic credentials".into()))?;
        let (email, password) = decoded
            .split_once(':')
            .ok_or_else(|| AppError::Unauthenticated("Malformed Basic credentials".into()))?;
        Ok(Credentials::Basic {
            email: email.to_string(),
            password: password.to_string(),
        })
    } else if scheme.eq_ignore_ascii_case("bearer") && !rest.is_empty() {
        Ok(Credentials::Bearer(rest.to_string()))
    } else {
        Err(AppError::Unauthenticated("Unsupported auth scheme".into()))
    }
}

/// Route layer guarding every endpoint except registration.
///
/// On success the caller's email is stored in request extensions as [`AuthUser`].
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthenticated("Missing Authorization header".into()))?;

    let email = match parse_authorization(header)? {
        Credentials::Basic { email, password } => {
            verify_credentials(state.users.as_ref(), &email, &password)
                .await?
                .ok_or_else(|| {
                    warn!(%email, "invalid basic credentials");
                    AppError::Unauthenticated("Invalid credentials".into())
                })?
        }
        Credentials::Bearer(token) => {
            let keys = JwtKeys::from_ref(&state);
            match keys.verify(&token) {
                Ok(claims) => claims.sub,
                Err(_) => {
                    warn!("invalid or expired token");
                    return Err(AppError::Unauthenticated(
                        "Invalid or expired token".into(),
                    ));
                }
            }
        }
    };

    req.extensions_mut().insert(AuthUser(email));
    Ok(next.run(req).await)
}
