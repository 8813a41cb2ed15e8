use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::{Duration, OffsetDateTime};

use crate::{clock::Clock, error::StoreError};

/// How many snippets the home page lists.
pub const LATEST_LIMIT: i64 = 10;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Snippet {
    pub id: i64,
    pub title: String,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires: OffsetDateTime,
}

impl Snippet {
    pub fn is_visible_at(&self, now: OffsetDateTime) -> bool {
        now < self.expires
    }
}

#[async_trait]
pub trait SnippetRepo: Send + Sync {
    /// Stores a snippet expiring `expires_in_days` from now and returns its id.
    async fn insert(
        &self,
        title: &str,
        content: &str,
        expires_in_days: i64,
    ) -> Result<i64, StoreError>;
    /// Expired and missing snippets are both `NotFound`.
    async fn get(&self, id: i64) -> Result<Snippet, StoreError>;
    /// Up to [`LATEST_LIMIT`] unexpired snippets, newest id first.
    async fn latest(&self) -> Result<Vec<Snippet>, StoreError>;
}

#[derive(Clone)]
pub struct PgSnippetRepo {
    db: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgSnippetRepo {
    pub fn new(db: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }
}

#[async_trait]
impl SnippetRepo for PgSnippetRepo {
    async fn insert(
        &self,
        title: &str,
        content: &str,
        expires_in_days: i64,
    ) -> Result<i64, StoreError> {
        let now = self.clock.now();
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO snippets (title, content, created, expires)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(title)
        .bind(content)
        .bind(now)
        .bind(now + Duration::days(expires_in_days))
        .fetch_one(&self.db)
        .await?;
        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<Snippet, StoreError> {
        sqlx::query_as::<_, Snippet>(
            r#"
            SELECT id, title, content, created, expires
            FROM snippets
            WHERE id = $1 AND expires > $2
            "#,
        )
        .bind(id)
        .bind(self.clock.now())
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn latest(&self) -> Result<Vec<Snippet>, StoreError> {
        let rows = sqlx::query_as::<_, Snippet>(
            r#"
            SELECT id, title, content, created, expires
            FROM snippets
            WHERE expires > $1
            ORDER BY id DESC
            LIMIT $2
            "#,
        )
        .bind(self.clock.now())
        .bind(LATEST_LIMIT)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ManualClock, MemorySnippetRepo};

    fn memory() -> (Arc<ManualClock>, MemorySnippetRepo) {
        let clock = Arc::new(ManualClock::default());
        let repo = MemorySnippetRepo::new(clock.clone());
        (clock, repo)
    }

    #[tokio::test]
    async fn get_hides_expired_snippets() {
        let (clock, repo) = memory();
        let id = repo.insert("T", "C", 1).await.unwrap();
        assert_eq!(repo.get(id).await.unwrap().title, "T");

        clock.advance(Duration::days(1));
        assert!(matches!(repo.get(id).await, Err(StoreError::NotFound)));
        assert_eq!(repo.stored(), 1);
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let (_, repo) = memory();
        assert!(matches!(repo.get(42).await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn latest_is_bounded_unexpired_and_descending() {
        let (clock, repo) = memory();
        for i in 0..12 {
            repo.insert(&format!("long {i}"), "body", 7).await.unwrap();
        }
        for i in 0..3 {
            repo.insert(&format!("short {i}"), "body", 1).await.unwrap();
        }
        clock.advance(Duration::days(2));

        let latest = repo.latest().await.unwrap();
        assert_eq!(latest.len(), LATEST_LIMIT as usize);
        assert!(latest.iter().all(|s| s.is_visible_at(clock.now())));
        assert!(latest.windows(2).all(|w| w[0].id > w[1].id));
        assert_eq!(latest[0].title, "long 11");
    }

    #[test]
    fn visibility_boundary_is_exclusive() {
        let now = OffsetDateTime::UNIX_EPOCH;
        let snippet = Snippet {
            id: 1,
            title: "T".into(),
            content: "C".into(),
            created: now,
            expires: now + Duration::days(1),
        };
        assert!(snippet.is_visible_at(now));
        assert!(!snippet.is_visible_at(now + Duration::days(1)));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn pg_insert_then_get() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let db = PgPool::connect(&url).await.expect("connect to database");
        sqlx::migrate!("./migrations").run(&db).await.expect("migrations");
        let repo = PgSnippetRepo::new(db, Arc::new(crate::clock::SystemClock));

        let id = repo.insert("T", "C", 1).await.unwrap();
        let snippet = repo.get(id).await.unwrap();
        assert_eq!(snippet.content, "C");
        assert!(repo.latest().await.unwrap().len() <= LATEST_LIMIT as usize);
    }
}
