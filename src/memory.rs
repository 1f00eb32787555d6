//! In-memory stores backing `AppState::fake()` in tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::auth::{repo::UserStore, repo_types::User};
use crate::recipes::{
    repo::RecipeStore,
    repo_types::{NewRecipe, Recipe},
};

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<String, User>>,
    calls: AtomicUsize,
}

impl MemoryUserStore {
    /// Number of store operations performed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn exists(&self, email: &str) -> anyhow::Result<bool> {
        self.touch();
        Ok(self.users.lock().unwrap().contains_key(email))
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        self.touch();
        Ok(self.users.lock().unwrap().get(email).cloned())
    }

    async fn create(&self, email: &str, password_hash: &str) -> anyhow::Result<User> {
        self.touch();
        let mut users = self.users.lock().unwrap();
        anyhow::ensure!(!users.contains_key(email), "duplicate key users_pkey");
        let user = User {
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        users.insert(user.email.clone(), user.clone());
        Ok(user)
    }

    async fn delete(&self, email: &str) -> anyhow::Result<bool> {
        self.touch();
        Ok(self.users.lock().unwrap().remove(email).is_some())
    }
}

#[derive(Default)]
pub struct MemoryRecipeStore {
    state: Mutex<RecipeTable>,
    calls: AtomicUsize,
}

#[derive(Default)]
struct RecipeTable {
    next_id: i64,
    rows: BTreeMap<i64, Recipe>,
}

impl MemoryRecipeStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn select(&self, pred: impl Fn(&Recipe) -> bool) -> Vec<Recipe> {
        let table = self.state.lock().unwrap();
        let mut out: Vec<Recipe> = table.rows.values().filter(|r| pred(r)).cloned().collect();
        out.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
        out
    }
}

#[async_trait]
impl RecipeStore for MemoryRecipeStore {
    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<Recipe>> {
        self.touch();
        Ok(self.state.lock().unwrap().rows.get(&id).cloned())
    }

    async fn insert(&self, recipe: &NewRecipe, date: OffsetDateTime) -> anyhow::Result<Recipe> {
        self.touch();
        let mut table = self.state.lock().unwrap();
        table.next_id += 1;
        let stored = recipe.clone().into_recipe(table.next_id, date);
        table.rows.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn save(&self, recipe: &Recipe) -> anyhow::Result<Recipe> {
        self.touch();
        let mut table = self.state.lock().unwrap();
        table.next_id = table.next_id.max(recipe.id);
        table.rows.insert(recipe.id, recipe.clone());
        Ok(recipe.clone())
    }

    async fn delete_by_id(&self, id: i64) -> anyhow::Result<bool> {
        self.touch();
        Ok(self.state.lock().unwrap().rows.remove(&id).is_some())
    }

    async fn delete_by_owner(&self, owner: &str) -> anyhow::Result<u64> {
        self.touch();
        let mut table = self.state.lock().unwrap();
        let before = table.rows.len();
        table.rows.retain(|_, r| r.owner != owner);
        Ok((before - table.rows.len()) as u64)
    }

    async fn find_by_category_ignore_case(&self, category: &str) -> anyhow::Result<Vec<Recipe>> {
        self.touch();
        let wanted = category.to_lowercase();
        Ok(self.select(|r| r.category.to_lowercase() == wanted))
    }

    async fn find_by_name_containing_ignore_case(
        &self,
        name: &str,
    ) -> anyhow::Result<Vec<Recipe>> {
        self.touch();
        let needle = name.to_lowercase();
        Ok(self.select(|r| r.name.to_lowercase().contains(&needle)))
    }

    async fn find_by_owner(&self, owner: &str) -> anyhow::Result<Vec<Recipe>> {
        self.touch();
        Ok(self.select(|r| r.owner == owner))
    }
}
