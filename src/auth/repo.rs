use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;

use crate::auth::repo_types::User;

/// Persistence for user records, keyed by email.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn exists(&self, email: &str) -> anyhow::Result<bool>;
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn create(&self, email: &str, password_hash: &str) -> anyhow::Result<User>;
    #[cfg_attr(not(test), allow(dead_code))]
    async fn delete(&self, email: &str) -> anyhow::Result<bool>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn exists(&self, email: &str) -> anyhow::Result<bool> {
        let found: bool =
            sqlx::query_scalar(r#"SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)"#)
                .bind(email)
                .fetch_one(&self.db)
                .await
                .context("check user exists")?;
        Ok(found)
    }

    /// Find a user by email.
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT email, password_hash, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    /// Create a new user with hashed password.
    async fn create(&self, email: &str, password_hash: &str) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            RETURNING email, password_hash, created_at
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.db)
        .await
        .context("insert user")?;
        Ok(user)
    }

    async fn delete(&self, email: &str) -> anyhow::Result<bool> {
        let res = sqlx::query(r#"DELETE FROM users WHERE email = $1"#)
            .bind(email)
            .execute(&self.db)
            .await
            .context("delete user")?;
        Ok(res.rows_affected() > 0)
    }
}
