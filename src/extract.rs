use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::AppError;

/// Shape checks run on a request body after it has been deserialized.
pub trait Validate {
    fn validate(&self) -> Result<(), AppError>;
}

/// JSON body extractor that reports malformed or invalid payloads as 400.
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate + Send,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|e| {
            warn!(error = %e, "rejected request body");
            AppError::Validation(e.body_text())
        })?;
        value.validate()?;
        Ok(ValidJson(value))
    }
}

/// Path parameters whose parse failures are reported as 400 with a JSON body.
#[derive(Debug)]
pub struct ValidPath<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ValidPath<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| {
                warn!(error = %e, "rejected path parameters");
                AppError::Validation(e.body_text())
            })?;
        Ok(ValidPath(value))
    }
}

/// Query string counterpart of [`ValidPath`].
#[derive(Debug)]
pub struct ValidQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ValidQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| {
                warn!(error = %e, "rejected query string");
                AppError::Validation(e.body_text())
            })?;
        Ok(ValidQuery(value))
    }
}

pub(crate) fn require_text(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} is a mandatory field")));
    }
    Ok(())
}

pub(crate) fn require_items(field: &str, values: &[String]) -> Result<(), AppError> {
    if values.is_empty() {
        return Err(AppError::Validation(format!("{field} must not be empty")));
    }
    if values.iter().any(|v| v.trim().is_empty()) {
        return Err(AppError::Validation(format!(
            "{field} must not contain empty entries"
        )));
    }
    Ok(())
}
