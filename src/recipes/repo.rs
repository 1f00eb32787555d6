use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use time::OffsetDateTime;

use super::repo_types::{NewRecipe, Recipe};

/// Persistence for recipes. Every list is ordered by `date`, most recent first.
#[async_trait]
pub trait RecipeStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<Recipe>>;
    /// Inserts a new row; the store assigns the id.
    async fn insert(&self, recipe: &NewRecipe, date: OffsetDateTime) -> anyhow::Result<Recipe>;
    /// Writes the recipe under its id, replacing any existing row.
    async fn save(&self, recipe: &Recipe) -> anyhow::Result<Recipe>;
    async fn delete_by_id(&self, id: i64) -> anyhow::Result<bool>;
    #[cfg_attr(not(test), allow(dead_code))]
    async fn delete_by_owner(&self, owner: &str) -> anyhow::Result<u64>;
    async fn find_by_category_ignore_case(&self, category: &str) -> anyhow::Result<Vec<Recipe>>;
    async fn find_by_name_containing_ignore_case(&self, name: &str)
        -> anyhow::Result<Vec<Recipe>>;
    #[cfg_attr(not(test), allow(dead_code))]
    async fn find_by_owner(&self, owner: &str) -> anyhow::Result<Vec<Recipe>>;
}

const SELECT_RECIPES: &str = r#"
    SELECT r.id, r.name, r.category, r.date, r.description, r.added_by,
           ARRAY(SELECT i.value FROM recipe_ingredients i
                  WHERE i.recipe_id = r.id ORDER BY i.position) AS ingredients,
           ARRAY(SELECT d.value FROM recipe_directions d
                  WHERE d.recipe_id = r.id ORDER BY d.position) AS directions
      FROM recipes r
"#;

#[derive(Clone)]
pub struct PgRecipeStore {
    db: PgPool,
}

impl PgRecipeStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn fetch_where(&self, filter: &str, arg: &str) -> anyhow::Result<Vec<Recipe>> {
        let sql = format!("{SELECT_RECIPES} WHERE {filter} ORDER BY r.date DESC, r.id DESC");
        let rows = sqlx::query_as::<_, Recipe>(&sql)
            .bind(arg)
            .fetch_all(&self.db)
            .await
            .with_context(|| format!("list recipes where {filter}"))?;
        Ok(rows)
    }
}

/// Replace both element lists of a recipe within a transaction.
async fn write_lists_tx(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: i64,
    ingredients: &[String],
    directions: &[String],
) -> anyhow::Result<()> {
    for (table, values) in [
        ("recipe_ingredients", ingredients),
        ("recipe_directions", directions),
    ] {
        let clear = format!("DELETE FROM {table} WHERE recipe_id = $1");
        sqlx::query(&clear)
            .bind(recipe_id)
            .execute(&mut **tx)
            .await
            .with_context(|| format!("clear {table}"))?;

        let fill = format!(
            r#"
            INSERT INTO {table} (recipe_id, position, value)
            SELECT $1, (t.ord - 1)::int, t.value
              FROM UNNEST($2::text[]) WITH ORDINALITY AS t(value, ord)
            "#
        );
        sqlx::query(&fill)
            .bind(recipe_id)
            .bind(values)
            .execute(&mut **tx)
            .await
            .with_context(|| format!("insert {table}"))?;
    }
    Ok(())
}

#[async_trait]
impl RecipeStore for PgRecipeStore {
    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<Recipe>> {
        let sql = format!("{SELECT_RECIPES} WHERE r.id = $1");
        let row = sqlx::query_as::<_, Recipe>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("find recipe by id")?;
        Ok(row)
    }

    async fn insert(&self, recipe: &NewRecipe, date: OffsetDateTime) -> anyhow::Result<Recipe> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO recipes (name, category, description, date, added_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(&recipe.name)
        .bind(&recipe.category)
        .bind(&recipe.description)
        .bind(date)
        .bind(&recipe.owner)
        .fetch_one(&mut *tx)
        .await
        .context("insert recipe")?;
        write_lists_tx(&mut tx, id, &recipe.ingredients, &recipe.directions).await?;
        tx.commit().await.context("commit tx")?;

        Ok(recipe.clone().into_recipe(id, date))
    }

    async fn save(&self, recipe: &Recipe) -> anyhow::Result<Recipe> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        sqlx::query(
            r#"
            INSERT INTO recipes (id, name, category, description, date, added_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
               SET name = EXCLUDED.name,
                   category = EXCLUDED.category,
                   description = EXCLUDED.description,
                   date = EXCLUDED.date,
                   added_by = EXCLUDED.added_by
            "#,
        )
        .bind(recipe.id)
        .bind(&recipe.name)
        .bind(&recipe.category)
        .bind(&recipe.description)
        .bind(recipe.date)
        .bind(&recipe.owner)
        .execute(&mut *tx)
        .await
        .context("upsert recipe")?;
        write_lists_tx(&mut tx, recipe.id, &recipe.ingredients, &recipe.directions).await?;
        tx.commit().await.context("commit tx")?;

        Ok(recipe.clone())
    }

    async fn delete_by_id(&self, id: i64) -> anyhow::Result<bool> {
        let res = sqlx::query(r#"DELETE FROM recipes WHERE id = $1"#)
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete recipe")?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete_by_owner(&self, owner: &str) -> anyhow::Result<u64> {
        let res = sqlx::query(r#"DELETE FROM recipes WHERE added_by = $1"#)
            .bind(owner)
            .execute(&self.db)
            .await
            .context("delete recipes by owner")?;
        Ok(res.rows_affected())
    }

    async fn find_by_category_ignore_case(&self, category: &str) -> anyhow::Result<Vec<Recipe>> {
        self.fetch_where("lower(r.category) = lower($1)", category)
            .await
    }

    async fn find_by_name_containing_ignore_case(
        &self,
        name: &str,
    ) -> anyhow::Result<Vec<Recipe>> {
        // strpos avoids escaping LIKE wildcards in user input
        self.fetch_where("strpos(lower(r.name), lower($1)) > 0", name)
            .await
    }

    async fn find_by_owner(&self, owner: &str) -> anyhow::Result<Vec<Recipe>> {
        self.fetch_where("r.added_by = $1", owner).await
    }
}
