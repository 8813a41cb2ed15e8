//! Session wiring over `tower-sessions`.
//!
//! Handlers read and write through the helpers below rather than calling
//! [`Session`] directly. The first write pins an absolute deadline in the
//! session data and every later write reapplies it, so activity never extends
//! a session. Only [`renew_token`] moves the deadline.

use serde::Serialize;
use time::{Duration, OffsetDateTime};
use tower_sessions::{cookie::SameSite, Expiry, Session, SessionManagerLayer, SessionStore};

use crate::{config::SessionConfig, error::AppError};

pub const SESSION_COOKIE: &str = "session";
pub const LIFETIME: Duration = Duration::hours(12);

pub const AUTHENTICATED_USER_ID: &str = "authenticatedUserID";
pub const FLASH: &str = "flash";
pub const REDIRECT_PATH_AFTER_LOGIN: &str = "redirectPathAfterLogin";

const DEADLINE: &str = "deadline";

/// Cookie settings shared by every deployment; only `Secure` is configurable.
pub fn layer<S>(store: S, config: &SessionConfig) -> SessionManagerLayer<S>
where
    S: SessionStore + Clone,
{
    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE)
        .with_path("/")
        .with_http_only(true)
        .with_same_site(SameSite::Lax)
        .with_secure(config.cookie_secure)
}

async fn pin_deadline(session: &Session) -> Result<(), AppError> {
    let deadline = match session.get::<i64>(DEADLINE).await? {
        Some(ts) => OffsetDateTime::from_unix_timestamp(ts).map_err(anyhow::Error::from)?,
        None => start_deadline(session).await?,
    };
    session.set_expiry(Some(Expiry::AtDateTime(deadline)));
    Ok(())
}

async fn start_deadline(session: &Session) -> Result<OffsetDateTime, AppError> {
    let deadline = OffsetDateTime::now_utc() + LIFETIME;
    session.insert(DEADLINE, deadline.unix_timestamp()).await?;
    Ok(deadline)
}

pub async fn put<T: Serialize + Send + Sync>(
    session: &Session,
    key: &str,
    value: T,
) -> Result<(), AppError> {
    pin_deadline(session).await?;
    session.insert(key, value).await?;
    Ok(())
}

/// Integer stored under `key`, or 0.
pub async fn get_int(session: &Session, key: &str) -> Result<i64, AppError> {
    Ok(session.get::<i64>(key).await?.unwrap_or(0))
}

/// String stored under `key`, or the empty string. The key is deleted.
pub async fn pop_string(session: &Session, key: &str) -> Result<String, AppError> {
    match session.remove::<String>(key).await? {
        Some(value) => {
            pin_deadline(session).await?;
            Ok(value)
        }
        None => Ok(String::new()),
    }
}

pub async fn remove(session: &Session, key: &str) -> Result<(), AppError> {
    if session.remove_value(key).await?.is_some() {
        pin_deadline(session).await?;
    }
    Ok(())
}

/// New session id for the same data, with a fresh deadline. Call on every
/// privilege change.
pub async fn renew_token(session: &Session) -> Result<(), AppError> {
    session.cycle_id().await?;
    let deadline = start_deadline(session).await?;
    session.set_expiry(Some(Expiry::AtDateTime(deadline)));
    Ok(())
}
