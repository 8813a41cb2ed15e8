use std::collections::HashMap;

use anyhow::Context as _;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use serde::Serialize;
use tera::{Tera, Value};
use time::{format_description::FormatItem, macros::format_description, OffsetDateTime};
use tower_sessions::Session;
use tracing::debug;

use crate::{
    error::AppError,
    middleware::RequestContext,
    session::{self, FLASH},
    snippets::repo::Snippet,
    state::AppState,
    users::repo::UserProfile,
};

const HUMAN_DATE: &[FormatItem<'static>] =
    format_description!("[day] [month repr:short] [year] at [hour]:[minute]");

/// Page templates parsed once at startup. Pages live under `pages/` and
/// extend `base.html`; shared fragments live under `partials/`.
pub struct Templates {
    tera: Tera,
}

impl Templates {
    pub fn new(dir: &str) -> anyhow::Result<Self> {
        let glob = format!("{}/**/*.html", dir.trim_end_matches('/'));
        let mut tera =
            Tera::new(&glob).with_context(|| format!("load templates from {}", dir))?;
        tera.register_filter("human_date", human_date);
        debug!(count = tera.get_template_names().count(), "templates loaded");
        Ok(Self { tera })
    }

    pub fn render(&self, page: &str, data: &TemplateData) -> Result<String, AppError> {
        let ctx = tera::Context::from_serialize(data)?;
        Ok(self.tera.render(&format!("pages/{}", page), &ctx)?)
    }
}

/// Everything a page template may reference.
#[derive(Debug, Default, Serialize)]
pub struct TemplateData {
    pub current_year: i32,
    pub flash: String,
    pub is_authenticated: bool,
    pub csrf_token: String,
    pub snippet: Option<Snippet>,
    pub snippets: Vec<Snippet>,
    pub user: Option<UserProfile>,
    pub form: Option<serde_json::Value>,
}

impl TemplateData {
    /// Consumes the pending flash message, if any.
    pub async fn new(
        state: &AppState,
        session: &Session,
        ctx: &RequestContext,
    ) -> Result<Self, AppError> {
        Ok(Self {
            current_year: state.clock.now().year(),
            flash: session::pop_string(session, FLASH).await?,
            is_authenticated: ctx.is_authenticated(),
            csrf_token: ctx.csrf_token.clone(),
            ..Self::default()
        })
    }

    pub fn with_form<T: Serialize>(mut self, form: &T) -> Result<Self, AppError> {
        let value = serde_json::to_value(form).context("serialize form")?;
        self.form = Some(value);
        Ok(self)
    }
}

/// Renders `page` fully before anything is written, so a template error is a clean 500.
pub fn render(
    state: &AppState,
    status: StatusCode,
    page: &str,
    data: TemplateData,
) -> Result<Response, AppError> {
    let html = state.templates.render(page, &data)?;
    Ok((status, Html(html)).into_response())
}

fn human_date(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let Some(raw) = value.as_str().filter(|s| !s.is_empty()) else {
        return Ok(Value::String(String::new()));
    };
    let parsed = OffsetDateTime::parse(raw, &time::format_description::well_known::Rfc3339)
        .map_err(|e| tera::Error::msg(format!("human_date: {}", e)))?;
    let formatted = parsed
        .to_offset(time::UtcOffset::UTC)
        .format(HUMAN_DATE)
        .map_err(|e| tera::Error::msg(format!("human_date: {}", e)))?;
    Ok(Value::String(formatted))
}
