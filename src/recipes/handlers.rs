use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use super::dto::{IdResponse, RecipeRequest, SearchParams};
use super::repo_types::Recipe;
use super::services;
use crate::{
    auth::{extractors::AuthUser, services::get_by_email},
    error::AppError,
    extract::{ValidJson, ValidPath, ValidQuery},
    state::AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/recipe/search", get(search_recipes))
        .route("/recipe/:id", get(get_recipe).put(update_recipe).delete(delete_recipe))
}

pub fn write_routes() -> Router<AppState> {
    Router::new().route("/recipe/new", post(add_recipe))
}

#[instrument(skip(state))]
pub async fn get_recipe(
    State(state): State<AppState>,
    AuthUser(email): AuthUser,
    ValidPath(id): ValidPath<i64>,
) -> Result<Json<Recipe>, AppError> {
    info!(recipe_id = id, "get request received");
    services::get_by_id(state.recipes.as_ref(), id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(id))
}

#[instrument(skip(state, body))]
pub async fn add_recipe(
    State(state): State<AppState>,
    AuthUser(email): AuthUser,
    ValidJson(body): ValidJson<RecipeRequest>,
) -> Result<Json<IdResponse>, AppError> {
    let owner = resolve_owner(&state, &email).await?;
    info!(name = %body.name, "post request received");

    let stored = services::upsert(state.recipes.as_ref(), None, body.owned_by(owner))
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("insert returned no recipe")))?;
    Ok(Json(IdResponse { id: stored.id }))
}

#[instrument(skip(state, body))]
pub async fn update_recipe(
    State(state): State<AppState>,
    AuthUser(email): AuthUser,
    ValidPath(id): ValidPath<i64>,
    ValidJson(body): ValidJson<RecipeRequest>,
) -> Result<(StatusCode, Json<IdResponse>), AppError> {
    let owner = resolve_owner(&state, &email).await?;
    info!(recipe_id = id, "put request received");

    check_owner(&state, id, &owner).await?;

    let stored = services::upsert(state.recipes.as_ref(), Some(id), body.owned_by(owner))
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok((StatusCode::NO_CONTENT, Json(IdResponse { id: stored.id })))
}

#[instrument(skip(state))]
pub async fn delete_recipe(
    State(state): State<AppState>,
    AuthUser(email): AuthUser,
    ValidPath(id): ValidPath<i64>,
) -> Result<StatusCode, AppError> {
    info!(recipe_id = id, "delete request received");

    check_owner(&state, id, &email).await?;

    if !services::delete_by_id(state.recipes.as_ref(), id).await? {
        return Err(not_found(id));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Empty results are reported as 404, not as an empty list.
#[instrument(skip(state))]
pub async fn search_recipes(
    State(state): State<AppState>,
    AuthUser(email): AuthUser,
    ValidQuery(params): ValidQuery<SearchParams>,
) -> Result<Json<Vec<Recipe>>, AppError> {
    let (criterion, Some(term)) = params.criterion() else {
        warn!(?params, "search needs exactly one of category or name");
        return Err(AppError::Validation(
            "Provide exactly one of 'category' or 'name'".into(),
        ));
    };

    match services::search(state.recipes.as_ref(), &term, criterion).await? {
        None => Err(AppError::Validation("Invalid search criterion".into())),
        Some(found) if found.is_empty() => {
            Err(AppError::NotFound("No matching recipes found".into()))
        }
        Some(found) => Ok(Json(found)),
    }
}

async fn resolve_owner(state: &AppState, email: &str) -> Result<String, AppError> {
    match get_by_email(state.users.as_ref(), email).await {
        Ok(user) => Ok(user.email),
        Err(AppError::NotFound(_)) => {
            warn!(%email, "authenticated identity has no user record");
            Err(AppError::Unauthenticated("User not found".into()))
        }
        Err(e) => Err(e),
    }
}

/// 404 when the recipe is missing, 403 when the stored owner is not the caller.
async fn check_owner(state: &AppState, id: i64, caller: &str) -> Result<(), AppError> {
    let existing = services::get_by_id(state.recipes.as_ref(), id)
        .await?
        .ok_or_else(|| {
            warn!(recipe_id = id, "recipe doesn't exist, request declined");
            not_found(id)
        })?;
    if existing.owner != caller {
        warn!(recipe_id = id, %caller, "caller is not the owner, request declined");
        return Err(AppError::Forbidden(
            "Only the owner may modify this recipe".into(),
        ));
    }
    Ok(())
}

fn not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Recipe {id} not found"))
}
