use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

/// Stored recipe as read back from the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Recipe {
    #[serde(skip_serializing)]
    pub id: i64,
    pub name: String,
    pub category: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub description: String,
    pub ingredients: Vec<String>,
    pub directions: Vec<String>,
    #[serde(skip_serializing)]
    #[sqlx(rename = "added_by")]
    pub owner: String,
}

/// Client-settable content of a recipe plus the owner resolved by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecipe {
    pub name: String,
    pub category: String,
    pub description: String,
    pub ingredients: Vec<String>,
    pub directions: Vec<String>,
    pub owner: String,
}

impl NewRecipe {
    pub fn into_recipe(self, id: i64, date: OffsetDateTime) -> Recipe {
        Recipe {
            id,
            name: self.name,
            category: self.category,
            date,
            description: self.description,
            ingredients: self.ingredients,
            directions: self.directions,
            owner: self.owner,
        }
    }
}

#[cfg(test)]
impl NewRecipe {
    pub fn sample(name: &str, category: &str, owner: &str) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            description: "Light, aromatic and refreshing".into(),
            ingredients: vec!["fresh mint leaves".into(), "water".into()],
            directions: vec!["Steep for five minutes".into()],
            owner: owner.into(),
        }
    }
}
