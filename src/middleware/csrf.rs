//! Double-submit CSRF protection.
//!
//! The real token lives in the `csrf_token` cookie. Pages embed a masked copy
//! (`pad || pad XOR token`, base64url) which differs on every render, so the
//! token never appears verbatim in a response body. Unsafe requests must send
//! a masked copy back in the `csrf_token` form field or the `X-CSRF-Token`
//! header.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::Response,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use cookie::Cookie;
use rand::{rngs::OsRng, RngCore};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tracing::{error, warn};

use super::RequestContext;
use crate::error::status_page;

pub const CSRF_COOKIE: &str = "csrf_token";
pub const CSRF_HEADER: &str = "x-csrf-token";

const TOKEN_LEN: usize = 32;
const MAX_FORM_BYTES: usize = 2 * 1024 * 1024;
const COOKIE_MAX_AGE_DAYS: i64 = 365;

#[derive(Debug, Clone, Copy)]
pub struct CsrfConfig {
    pub cookie_secure: bool,
}

#[derive(Deserialize)]
struct CsrfField {
    csrf_token: Option<String>,
}

/// Value of the first cookie called `name` across all `Cookie` headers.
fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|c| c.name() == name)
        .map(|c| c.value().to_string())
}

fn append_cookie(headers: &mut HeaderMap, cookie: &Cookie<'_>) {
    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            headers.append(header::SET_COOKIE, value);
        }
        Err(e) => error!(error = %e, name = cookie.name(), "cookie is not a valid header value"),
    }
}

fn new_token() -> Vec<u8> {
    let mut token = vec![0u8; TOKEN_LEN];
    OsRng.fill_bytes(&mut token);
    token
}

fn decode_token(raw: &str) -> Option<Vec<u8>> {
    Base64UrlUnpadded::decode_vec(raw)
        .ok()
        .filter(|t| t.len() == TOKEN_LEN)
}

pub fn mask_token(token: &[u8]) -> String {
    let mut pad = [0u8; TOKEN_LEN];
    OsRng.fill_bytes(&mut pad);
    let mut out = Vec::with_capacity(TOKEN_LEN * 2);
    out.extend_from_slice(&pad);
    out.extend(token.iter().zip(pad.iter()).map(|(t, p)| t ^ p));
    Base64UrlUnpadded::encode_string(&out)
}

fn unmask_token(sent: &str) -> Option<Vec<u8>> {
    let bytes = Base64UrlUnpadded::decode_vec(sent).ok()?;
    if bytes.len() != TOKEN_LEN * 2 {
        return None;
    }
    let (pad, masked) = bytes.split_at(TOKEN_LEN);
    Some(masked.iter().zip(pad).map(|(m, p)| m ^ p).collect())
}

/// Constant-time check of a masked token against the real one.
pub fn verify_token(real: &[u8], sent: &str) -> bool {
    match unmask_token(sent) {
        Some(unmasked) => unmasked.as_slice().ct_eq(real).into(),
        None => false,
    }
}

fn is_safe(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

fn token_cookie(token: &[u8], config: CsrfConfig) -> Cookie<'static> {
    Cookie::build((CSRF_COOKIE, Base64UrlUnpadded::encode_string(token)))
        .path("/")
        .http_only(true)
        .secure(config.cookie_secure)
        .max_age(cookie::time::Duration::days(COOKIE_MAX_AGE_DAYS))
        .build()
}

pub async fn protect(State(config): State<CsrfConfig>, req: Request, next: Next) -> Response {
    let existing = read_cookie(req.headers(), CSRF_COOKIE).and_then(|v| decode_token(&v));
    let issued = existing.is_none();
    let token = existing.unwrap_or_else(new_token);

    let mut req = if is_safe(req.method()) {
        req
    } else {
        let (parts, body) = req.into_parts();
        let bytes = match axum::body::to_bytes(body, MAX_FORM_BYTES).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "could not read request body for csrf check");
                return reject(&token, issued, config);
            }
        };

        let sent = parts
            .headers
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| {
                serde_urlencoded::from_bytes::<CsrfField>(&bytes)
                    .ok()
                    .and_then(|f| f.csrf_token)
            });

        let valid = !issued && sent.is_some_and(|s| verify_token(&token, &s));
        if !valid {
            warn!(method = %parts.method, path = %parts.uri.path(), "csrf token missing or invalid");
            return reject(&token, issued, config);
        }
        Request::from_parts(parts, Body::from(bytes))
    };

    let masked = mask_token(&token);
    RequestContext::update(&mut req, |ctx| ctx.csrf_token = masked);

    let mut res = next.run(req).await;
    res.headers_mut()
        .append(header::VARY, HeaderValue::from_static("Cookie"));
    if issued {
        append_cookie(res.headers_mut(), &token_cookie(&token, config));
    }
    res
}

fn reject(token: &[u8], issued: bool, config: CsrfConfig) -> Response {
    let mut res = status_page(StatusCode::BAD_REQUEST);
    if issued {
        append_cookie(res.headers_mut(), &token_cookie(token, config));
    }
    res
}
