use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Form, Router,
};
use tower_sessions::Session;
use tracing::{debug, info, instrument};

use super::dto::SnippetCreateForm;
use crate::{
    error::AppError,
    middleware::RequestContext,
    session::{self, FLASH},
    state::AppState,
    templates::{render, TemplateData},
};

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/snippet/view/:id", get(snippet_view))
}

pub fn protected_routes() -> Router<AppState> {
    Router::new().route(
        "/snippet/create",
        get(snippet_create).post(snippet_create_post),
    )
}

#[instrument(skip_all)]
pub async fn home(
    State(state): State<AppState>,
    session: Session,
    ctx: RequestContext,
) -> Result<Response, AppError> {
    let snippets = state.snippets.latest().await?;
    let mut data = TemplateData::new(&state, &session, &ctx).await?;
    data.snippets = snippets;
    render(&state, StatusCode::OK, "home.html", data)
}

#[instrument(skip_all)]
pub async fn snippet_view(
    State(state): State<AppState>,
    session: Session,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = id
        .parse::<i64>()
        .ok()
        .filter(|id| *id >= 1)
        .ok_or(AppError::NotFound)?;
    let snippet = state.snippets.get(id).await?;

    let mut data = TemplateData::new(&state, &session, &ctx).await?;
    data.snippet = Some(snippet);
    render(&state, StatusCode::OK, "view.html", data)
}

#[instrument(skip_all)]
pub async fn snippet_create(
    State(state): State<AppState>,
    session: Session,
    ctx: RequestContext,
) -> Result<Response, AppError> {
    let data = TemplateData::new(&state, &session, &ctx)
        .await?
        .with_form(&SnippetCreateForm::default())?;
    render(&state, StatusCode::OK, "create.html", data)
}

#[instrument(skip_all)]
pub async fn snippet_create_post(
    State(state): State<AppState>,
    session: Session,
    ctx: RequestContext,
    Form(mut form): Form<SnippetCreateForm>,
) -> Result<Response, AppError> {
    if !form.validate() {
        debug!(errors = ?form.validator.field_errors, "snippet form rejected");
        let data = TemplateData::new(&state, &session, &ctx)
            .await?
            .with_form(&form)?;
        return render(&state, StatusCode::UNPROCESSABLE_ENTITY, "create.html", data);
    }

    let days = form.expires_in_days();
    let id = state.snippets.insert(&form.title, &form.content, days).await?;
    info!(snippet_id = id, expires_in_days = days, "snippet created");

    session::put(&session, FLASH, "Snippet successfully created!").await?;
    Ok(Redirect::to(&format!("/snippet/view/{}", id)).into_response())
}
