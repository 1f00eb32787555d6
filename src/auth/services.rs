pub(crate) use crate::auth::dto::{Claims, JwtKeys};
use crate::auth::repo::UserStore;
use crate::auth::repo_types::User;
use crate::config::{HashingConfig, JwtConfig};
use crate::error::AppError;
use crate::recipes::repo::RecipeStore;
use crate::state::AppState;
use argon2::{
    password_hash::SaltString, Algorithm, Argon2, Params, PasswordHash, PasswordHasher,
    PasswordVerifier, Version,
};
use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use regex::Regex;
use std::time::Duration;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, error, info, warn};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Canonical form of an email used as the user key.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn hash_password(plain: &str, cost: &HashingConfig) -> anyhow::Result<String> {
    let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
        .map_err(|e| anyhow::anyhow!("invalid argon2 params: {e}"))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// Cost parameters are read back from the PHC string, so any stored hash verifies.
pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Registers a new user. Returns `false` without touching the store when the email is taken.
pub async fn register(
    users: &dyn UserStore,
    cost: &HashingConfig,
    email: &str,
    raw_password: &str,
) -> Result<bool, AppError> {
    let email = normalize_email(email);
    if users.exists(&email).await? {
        warn!(%email, "user not created, already exists");
        return Ok(false);
    }
    let hash = hash_password(raw_password, cost)?;
    users.create(&email, &hash).await?;
    info!(%email, "user registered");
    Ok(true)
}

pub async fn get_by_email(users: &dyn UserStore, email: &str) -> Result<User, AppError> {
    let email = normalize_email(email);
    users
        .find_by_email(&email)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Couldn't find user '{email}'.")))
}

/// Returns the canonical identity when the email exists and the password matches.
pub async fn verify_credentials(
    users: &dyn UserStore,
    email: &str,
    raw_password: &str,
) -> Result<Option<String>, AppError> {
    let email = normalize_email(email);
    let Some(user) = users.find_by_email(&email).await? else {
        debug!(%email, "credentials for unknown user");
        return Ok(None);
    };
    if !verify_password(raw_password, &user.password_hash)? {
        debug!(%email, "password mismatch");
        return Ok(None);
    }
    Ok(Some(user.email))
}

/// Deletes a user after removing every recipe it owns.
#[cfg_attr(not(test), allow(dead_code))]
pub async fn delete(
    users: &dyn UserStore,
    recipes: &dyn RecipeStore,
    email: &str,
) -> Result<bool, AppError> {
    let email = normalize_email(email);
    if !users.exists(&email).await? {
        warn!(%email, "user to be deleted cannot be found");
        return Ok(false);
    }
    let removed = recipes.delete_by_owner(&email).await?;
    let deleted = users.delete(&email).await?;
    info!(%email, recipes_removed = removed, "user deleted");
    Ok(deleted)
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        let JwtConfig {
            secret,
            issuer,
            audience,
            ttl_minutes,
        } = state.config.jwt.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            ttl: Duration::from_secs((ttl_minutes.max(1) as u64) * 60),
        }
    }
}

impl JwtKeys {
    pub fn sign(&self, email: &str) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = Claims {
            sub: email.to_string(),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(%email, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(email = %data.claims.sub, "jwt verified");
        Ok(data.claims)
    }
}
