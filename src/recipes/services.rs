use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

use super::repo::RecipeStore;
use super::repo_types::{NewRecipe, Recipe};
use crate::error::AppError;

/// Which recipe field a search term is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchCriterion {
    /// Case-insensitive exact match on `category`.
    Category,
    /// Case-insensitive substring match on `name`.
    Name,
    Undefined,
}

/// Creates a recipe (`id == None`) or replaces an existing one.
///
/// `date` is stamped on every write. An update returns `None` when no recipe has
/// the id. The existence check and the write are separate store calls, so a
/// delete landing in between lets the write re-create the row.
pub async fn upsert(
    store: &dyn RecipeStore,
    id: Option<i64>,
    recipe: NewRecipe,
) -> Result<Option<Recipe>, AppError> {
    let date = stamp();

    let Some(id) = id else {
        let stored = store.insert(&recipe, date).await?;
        info!(recipe_id = stored.id, owner = %stored.owner, "recipe added");
        return Ok(Some(stored));
    };

    if store.find_by_id(id).await?.is_none() {
        warn!(recipe_id = id, "update failed, recipe not found");
        return Ok(None);
    }
    let stored = store.save(&recipe.into_recipe(id, date)).await?;
    info!(recipe_id = id, owner = %stored.owner, "recipe updated");
    Ok(Some(stored))
}

/// Current time at the microsecond precision Postgres keeps for `timestamptz`.
fn stamp() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now - Duration::nanoseconds(i64::from(now.nanosecond() % 1_000))
}

pub async fn get_by_id(store: &dyn RecipeStore, id: i64) -> Result<Option<Recipe>, AppError> {
    let found = store.find_by_id(id).await?;
    match &found {
        Some(_) => info!(recipe_id = id, "recipe found"),
        None => warn!(recipe_id = id, "recipe not found"),
    }
    Ok(found)
}

pub async fn delete_by_id(store: &dyn RecipeStore, id: i64) -> Result<bool, AppError> {
    if store.find_by_id(id).await?.is_none() {
        warn!(recipe_id = id, "recipe to be deleted cannot be found");
        return Ok(false);
    }
    let deleted = store.delete_by_id(id).await?;
    info!(recipe_id = id, deleted, "recipe deleted");
    Ok(deleted)
}

/// Runs the store query for `criterion`. `Undefined` yields `None`.
pub async fn search(
    store: &dyn RecipeStore,
    term: &str,
    criterion: SearchCriterion,
) -> Result<Option<Vec<Recipe>>, AppError> {
    let found = match criterion {
        SearchCriterion::Category => {
            info!(category = %term, "searching by category");
            store.find_by_category_ignore_case(term).await?
        }
        SearchCriterion::Name => {
            info!(name = %term, "searching by name");
            store.find_by_name_containing_ignore_case(term).await?
        }
        SearchCriterion::Undefined => return Ok(None),
    };
    Ok(Some(found))
}

#[cfg_attr(not(test), allow(dead_code))]
pub async fn list_by_owner(store: &dyn RecipeStore, owner: &str) -> Result<Vec<Recipe>, AppError> {
    Ok(store.find_by_owner(owner).await?)
}
