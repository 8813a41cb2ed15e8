//! Request interceptors shared by every route.

pub mod csrf;

use std::{any::Any, convert::Infallible, net::SocketAddr, time::Duration};

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;
use tracing::{debug, error, info, info_span, Span};
use uuid::Uuid;

use crate::{
    error::{status_page, AppError},
    session::{self, AUTHENTICATED_USER_ID, REDIRECT_PATH_AFTER_LOGIN},
    state::AppState,
};

const CONTENT_SECURITY_POLICY: &str =
    "default-src 'self'; style-src 'self' fonts.googleapis.com; font-src fonts.gstatic.com";

/// Per-request facts computed by the interceptors and read by handlers.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Set only when the session's user id still names an existing user.
    pub authenticated_user_id: Option<i64>,
    /// Masked CSRF token to embed in forms.
    pub csrf_token: String,
}

impl RequestContext {
    pub fn is_authenticated(&self) -> bool {
        self.authenticated_user_id.is_some()
    }

    fn update(req: &mut Request, f: impl FnOnce(&mut RequestContext)) {
        let mut ctx = req
            .extensions()
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_default();
        f(&mut ctx);
        req.extensions_mut().insert(ctx);
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_default())
    }
}

pub async fn secure_headers(req: Request, next: Next) -> Response {
    let mut res = next.run(req).await;
    let headers = res.headers_mut();
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(CONTENT_SECURITY_POLICY),
    );
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("origin-when-cross-origin"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("deny"));
    headers.insert(header::X_XSS_PROTECTION, HeaderValue::from_static("0"));
    res
}

pub fn make_span(req: &Request<Body>) -> Span {
    let request_id = Uuid::new_v4();
    info_span!(
        "http_request",
        %request_id,
        method = %req.method(),
        uri = %req.uri(),
        status = tracing::field::Empty,
    )
}

pub fn log_request(req: &Request<Body>, _span: &Span) {
    let remote_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "-".into());
    info!(
        ip = %remote_addr,
        proto = ?req.version(),
        method = %req.method(),
        uri = %req.uri().path(),
        "received request"
    );
}

pub fn log_response<B>(res: &axum::http::Response<B>, latency: Duration, span: &Span) {
    let status = res.status();
    span.record("status", tracing::field::display(status));
    let latency_ms = latency.as_millis() as u64;
    if status.is_server_error() {
        error!(%status, latency_ms, "response");
    } else {
        info!(%status, latency_ms, "response");
    }
}

/// Turns a handler panic into an opaque 500 and asks the client to drop the
/// connection.
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    error!(panic = %detail, "handler panicked");

    let mut res = status_page(StatusCode::INTERNAL_SERVER_ERROR);
    res.headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    res
}

/// Marks the request authenticated when the session's user id still exists.
pub async fn authenticate(
    State(state): State<AppState>,
    session: Session,
    mut req: Request,
    next: Next,
) -> Response {
    let id = match session::get_int(&session, AUTHENTICATED_USER_ID).await {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };
    if id == 0 {
        return next.run(req).await;
    }

    match state.users.exists(id).await {
        Ok(true) => RequestContext::update(&mut req, |ctx| ctx.authenticated_user_id = Some(id)),
        Ok(false) => debug!(user_id = id, "session refers to a user that no longer exists"),
        Err(e) => return AppError::from(e).into_response(),
    }
    next.run(req).await
}

/// Sends anonymous visitors to the login page, remembering where they were
/// headed. Authenticated responses are marked uncacheable.
pub async fn require_authentication(
    ctx: RequestContext,
    session: Session,
    req: Request,
    next: Next,
) -> Response {
    if !ctx.is_authenticated() {
        let path = req.uri().path().to_string();
        if let Err(e) = session::put(&session, REDIRECT_PATH_AFTER_LOGIN, path).await {
            return e.into_response();
        }
        return Redirect::to("/user/login").into_response();
    }

    let mut res = next.run(req).await;
    res.headers_mut()
        .append(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    res
}
