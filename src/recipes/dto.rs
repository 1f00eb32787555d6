use serde::{Deserialize, Serialize};

use super::repo_types::NewRecipe;
use super::services::SearchCriterion;
use crate::error::AppError;
use crate::extract::{require_items, require_text, Validate};

/// Recipe body accepted on create and update.
///
/// `id`, `date` and any owner field are not part of the body; unknown keys are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct RecipeRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub directions: Vec<String>,
}

impl Validate for RecipeRequest {
    fn validate(&self) -> Result<(), AppError> {
        require_text("name", &self.name)?;
        require_text("category", &self.category)?;
        require_text("description", &self.description)?;
        require_items("ingredients", &self.ingredients)?;
        require_items("directions", &self.directions)?;
        Ok(())
    }
}

impl RecipeRequest {
    pub fn owned_by(self, owner: String) -> NewRecipe {
        NewRecipe {
            name: self.name,
            category: self.category,
            description: self.description,
            ingredients: self.ingredients,
            directions: self.directions,
            owner,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IdResponse {
    pub id: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub category: Option<String>,
    pub name: Option<String>,
}

impl SearchParams {
    /// Picks the criterion when exactly one parameter was supplied.
    ///
    /// An absent or empty parameter counts as not supplied. A supplied value that
    /// is blank after trimming, or supplying both, yields `Undefined` with no term.
    /// The term is lower-cased and otherwise kept as typed.
    pub fn criterion(&self) -> (SearchCriterion, Option<String>) {
        fn supplied(v: &Option<String>) -> Option<&str> {
            v.as_deref().filter(|s| !s.is_empty())
        }
        match (supplied(&self.category), supplied(&self.name)) {
            (Some(term), None) if !term.trim().is_empty() => {
                (SearchCriterion::Category, Some(term.to_lowercase()))
            }
            (None, Some(term)) if !term.trim().is_empty() => {
                (SearchCriterion::Name, Some(term.to_lowercase()))
            }
            _ => (SearchCriterion::Undefined, None),
        }
    }
}
