use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use tracing::debug;

use super::password::{dummy_verify, hash_password, verify_password};
use crate::{clock::Clock, error::StoreError};

/// Name of the unique constraint guarding `users.email`.
pub const EMAIL_UNIQUE_CONSTRAINT: &str = "users_uc_email";

/// Public view of a user, as shown on the profile page.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserProfile {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Hashes `password` and stores a new user.
    async fn insert(&self, name: &str, email: &str, password: &str) -> Result<(), StoreError>;
    /// Returns the user id when the credentials match. Unknown email and wrong
    /// password are both `InvalidCredentials`.
    async fn authenticate(&self, email: &str, password: &str) -> Result<i64, StoreError>;
    async fn exists(&self, id: i64) -> Result<bool, StoreError>;
    async fn get(&self, id: i64) -> Result<UserProfile, StoreError>;
    /// Replaces the password hash once `current_password` has been verified.
    async fn password_update(
        &self,
        id: i64,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct PgUserRepo {
    db: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgUserRepo {
    pub fn new(db: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }
}

fn is_duplicate_email(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.is_unique_violation() && db.constraint() == Some(EMAIL_UNIQUE_CONSTRAINT)
        }
        _ => false,
    }
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn insert(&self, name: &str, email: &str, password: &str) -> Result<(), StoreError> {
        let hash = hash_password(password)?;
        sqlx::query(
            r#"
            INSERT INTO users (name, email, hashed_password, created)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(&hash)
        .bind(self.clock.now())
        .execute(&self.db)
        .await
        .map_err(|e| {
            if is_duplicate_email(&e) {
                StoreError::DuplicateEmail
            } else {
                StoreError::Db(e)
            }
        })?;
        Ok(())
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<i64, StoreError> {
        let row = sqlx::query_as::<_, (i64, String)>(
            r#"SELECT id, hashed_password FROM users WHERE email = $1"#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;

        let Some((id, hash)) = row else {
            dummy_verify(password);
            return Err(StoreError::InvalidCredentials);
        };

        if !verify_password(password, &hash)? {
            return Err(StoreError::InvalidCredentials);
        }
        debug!(user_id = id, "credentials verified");
        Ok(id)
    }

    async fn exists(&self, id: i64) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"SELECT EXISTS(SELECT true FROM users WHERE id = $1)"#,
        )
        .bind(id)
        .fetch_one(&self.db)
        .await?;
        Ok(exists)
    }

    async fn get(&self, id: i64) -> Result<UserProfile, StoreError> {
        sqlx::query_as::<_, UserProfile>(
            r#"SELECT id, name, email, created FROM users WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn password_update(
        &self,
        id: i64,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), StoreError> {
        let current_hash = sqlx::query_scalar::<_, String>(
            r#"SELECT hashed_password FROM users WHERE id = $1"#,
        )
        .bind(id)
        .fetch_one(&self.db)
        .await?;

        if !verify_password(current_password, &current_hash)? {
            return Err(StoreError::InvalidCredentials);
        }

        let new_hash = hash_password(new_password)?;
        sqlx::query(r#"UPDATE users SET hashed_password = $1 WHERE id = $2"#)
            .bind(&new_hash)
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}
