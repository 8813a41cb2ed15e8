//! In-memory stand-ins for the Postgres-backed repos, a controllable clock
//! and a small cookie-aware client for driving the full router.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use cookie::Cookie;
use lazy_static::lazy_static;
use regex::Regex;
use time::{macros::datetime, Duration, OffsetDateTime};
use tower::ServiceExt;

use crate::{
    clock::Clock,
    error::StoreError,
    snippets::repo::{Snippet, SnippetRepo, LATEST_LIMIT},
    users::{
        password::{dummy_verify, hash_password, verify_password},
        repo::{UserProfile, UserRepo},
    },
};

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<OffsetDateTime>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(datetime!(2024-01-01 12:00 UTC)),
        }
    }
}

impl ManualClock {
    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().unwrap()
    }
}

pub struct MemorySnippetRepo {
    clock: Arc<dyn Clock>,
    rows: Mutex<Vec<Snippet>>,
}

impl MemorySnippetRepo {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            rows: Mutex::new(Vec::new()),
        }
    }

    /// Rows held, expired ones included.
    pub fn stored(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl SnippetRepo for MemorySnippetRepo {
    async fn insert(
        &self,
        title: &str,
        content: &str,
        expires_in_days: i64,
    ) -> Result<i64, StoreError> {
        let now = self.clock.now();
        let mut rows = self.rows.lock().unwrap();
        let id = rows.len() as i64 + 1;
        rows.push(Snippet {
            id,
            title: title.to_string(),
            content: content.to_string(),
            created: now,
            expires: now + Duration::days(expires_in_days),
        });
        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<Snippet, StoreError> {
        let now = self.clock.now();
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id && s.is_visible_at(now))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn latest(&self) -> Result<Vec<Snippet>, StoreError> {
        let now = self.clock.now();
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|s| s.is_visible_at(now))
            .take(LATEST_LIMIT as usize)
            .cloned()
            .collect())
    }
}

struct StoredUser {
    profile: UserProfile,
    hashed_password: String,
}

pub struct MemoryUserRepo {
    clock: Arc<dyn Clock>,
    rows: Mutex<Vec<StoredUser>>,
}

impl MemoryUserRepo {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            rows: Mutex::new(Vec::new()),
        }
    }

    /// Deletes the row outright, leaving any session that refers to it dangling.
    pub fn remove(&self, id: i64) {
        self.rows.lock().unwrap().retain(|u| u.profile.id != id);
    }

    pub fn hash_of(&self, id: i64) -> Option<String> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.profile.id == id)
            .map(|u| u.hashed_password.clone())
    }

    fn find<T>(&self, pred: impl Fn(&StoredUser) -> bool, f: impl Fn(&StoredUser) -> T) -> Option<T> {
        self.rows.lock().unwrap().iter().find(|u| pred(u)).map(f)
    }
}

#[async_trait]
impl UserRepo for MemoryUserRepo {
    async fn insert(&self, name: &str, email: &str, password: &str) -> Result<(), StoreError> {
        let hashed_password = hash_password(password)?;
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|u| u.profile.email == email) {
            return Err(StoreError::DuplicateEmail);
        }
        let id = rows.iter().map(|u| u.profile.id).max().unwrap_or(0) + 1;
        rows.push(StoredUser {
            profile: UserProfile {
                id,
                name: name.to_string(),
                email: email.to_string(),
                created: self.clock.now(),
            },
            hashed_password,
        });
        Ok(())
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<i64, StoreError> {
        let Some((id, hash)) = self.find(
            |u| u.profile.email == email,
            |u| (u.profile.id, u.hashed_password.clone()),
        ) else {
            dummy_verify(password);
            return Err(StoreError::InvalidCredentials);
        };
        if !verify_password(password, &hash)? {
            return Err(StoreError::InvalidCredentials);
        }
        Ok(id)
    }

    async fn exists(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.find(|u| u.profile.id == id, |_| ()).is_some())
    }

    async fn get(&self, id: i64) -> Result<UserProfile, StoreError> {
        self.find(|u| u.profile.id == id, |u| u.profile.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn password_update(
        &self,
        id: i64,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), StoreError> {
        let hash = self
            .hash_of(id)
            .ok_or(StoreError::Db(sqlx::Error::RowNotFound))?;
        if !verify_password(current_password, &hash)? {
            return Err(StoreError::InvalidCredentials);
        }
        let new_hash = hash_password(new_password)?;
        if let Some(user) = self
            .rows
            .lock()
            .unwrap()
            .iter_mut()
            .find(|u| u.profile.id == id)
        {
            user.hashed_password = new_hash;
        }
        Ok(())
    }
}

lazy_static! {
    static ref CSRF_FIELD_RE: Regex =
        Regex::new(r#"name=['"]csrf_token['"]\s+value=['"]([^'"]+)['"]"#).unwrap();
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }

    /// Masked token from the first hidden CSRF field on the page.
    pub fn csrf_token(&self) -> String {
        CSRF_FIELD_RE
            .captures(&self.body)
            .map(|c| c[1].to_string())
            .expect("page has a csrf_token field")
    }
}

/// Drives a router like a browser would, keeping cookies between requests.
pub struct TestClient {
    app: Router,
    cookies: HashMap<String, String>,
}

impl TestClient {
    pub fn new(app: Router) -> Self {
        Self {
            app,
            cookies: HashMap::new(),
        }
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn forget_cookies(&mut self) {
        self.cookies.clear();
    }

    pub async fn get(&mut self, path: &str) -> TestResponse {
        let req = self.request(Method::GET, path).body(Body::empty()).unwrap();
        self.send(req).await
    }

    pub async fn post_form(&mut self, path: &str, fields: &[(&str, &str)]) -> TestResponse {
        let body = serde_urlencoded::to_string(fields).unwrap();
        let req = self
            .request(Method::POST, path)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();
        self.send(req).await
    }

    fn request(&self, method: Method, path: &str) -> axum::http::request::Builder {
        let builder = Request::builder().method(method).uri(path);
        if self.cookies.is_empty() {
            return builder;
        }
        let jar = self
            .cookies
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; ");
        builder.header(header::COOKIE, jar)
    }

    async fn send(&mut self, req: Request<Body>) -> TestResponse {
        let res = self.app.clone().oneshot(req).await.unwrap();
        for value in res.headers().get_all(header::SET_COOKIE) {
            let cookie = Cookie::parse(value.to_str().unwrap().to_string()).unwrap();
            let removed = cookie.value().is_empty()
                || cookie.max_age().map_or(false, |age| age.is_zero());
            if removed {
                self.cookies.remove(cookie.name());
            } else {
                self.cookies
                    .insert(cookie.name().to_string(), cookie.value().to_string());
            }
        }
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        TestResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        }
    }
}
