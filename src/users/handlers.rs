use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use tower_sessions::Session;
use tracing::{info, instrument, warn};

use super::dto::{LoginForm, PasswordUpdateForm, SignupForm};
use crate::{
    error::{AppError, StoreError},
    middleware::RequestContext,
    session::{self, AUTHENTICATED_USER_ID, FLASH, REDIRECT_PATH_AFTER_LOGIN},
    state::AppState,
    templates::{render, TemplateData},
};

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/user/signup", get(signup).post(signup_post))
        .route("/user/login", get(login).post(login_post))
}

pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/user/logout", post(logout_post))
        .route("/user/profile", get(profile))
        .route("/user/password", get(password_update).post(password_update_post))
}

#[instrument(skip_all)]
pub async fn signup(
    State(state): State<AppState>,
    session: Session,
    ctx: RequestContext,
) -> Result<Response, AppError> {
    let data = TemplateData::new(&state, &session, &ctx)
        .await?
        .with_form(&SignupForm::default())?;
    render(&state, StatusCode::OK, "signup.html", data)
}

#[instrument(skip_all)]
pub async fn signup_post(
    State(state): State<AppState>,
    session: Session,
    ctx: RequestContext,
    Form(mut form): Form<SignupForm>,
) -> Result<Response, AppError> {
    if form.validate() {
        match state
            .users
            .insert(&form.name, &form.email, &form.password)
            .await
        {
            Ok(()) => {
                info!("user signed up");
                let flash = "Your signup was successful. Please log in.";
                session::put(&session, FLASH, flash).await?;
                return Ok(Redirect::to("/user/login").into_response());
            }
            Err(StoreError::DuplicateEmail) => {
                form.validator
                    .add_field_error("email", "Email address is already in use");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let data = TemplateData::new(&state, &session, &ctx)
        .await?
        .with_form(&form)?;
    render(&state, StatusCode::UNPROCESSABLE_ENTITY, "signup.html", data)
}

#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    ctx: RequestContext,
) -> Result<Response, AppError> {
    let data = TemplateData::new(&state, &session, &ctx)
        .await?
        .with_form(&LoginForm::default())?;
    render(&state, StatusCode::OK, "login.html", data)
}

#[instrument(skip_all)]
pub async fn login_post(
    State(state): State<AppState>,
    session: Session,
    ctx: RequestContext,
    Form(mut form): Form<LoginForm>,
) -> Result<Response, AppError> {
    if form.validate() {
        match state.users.authenticate(&form.email, &form.password).await {
            Ok(id) => {
                session::renew_token(&session).await?;
                session::put(&session, AUTHENTICATED_USER_ID, id).await?;
                info!(user_id = id, "user logged in");

                let target = session::pop_string(&session, REDIRECT_PATH_AFTER_LOGIN).await?;
                let target = if target.is_empty() {
                    "/snippet/create".to_string()
                } else {
                    target
                };
                return Ok(Redirect::to(&target).into_response());
            }
            Err(StoreError::InvalidCredentials) => {
                warn!("failed login attempt");
                form.validator
                    .add_non_field_error("Email or password is incorrect");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let data = TemplateData::new(&state, &session, &ctx)
        .await?
        .with_form(&form)?;
    render(&state, StatusCode::UNPROCESSABLE_ENTITY, "login.html", data)
}

#[instrument(skip_all)]
pub async fn logout_post(session: Session) -> Result<Response, AppError> {
    session::renew_token(&session).await?;
    session::remove(&session, AUTHENTICATED_USER_ID).await?;
    session::put(&session, FLASH, "You've been logged out successfully!").await?;
    Ok(Redirect::to("/").into_response())
}

#[instrument(skip_all)]
pub async fn profile(
    State(state): State<AppState>,
    session: Session,
    ctx: RequestContext,
) -> Result<Response, AppError> {
    let id = session::get_int(&session, AUTHENTICATED_USER_ID).await?;
    let user = match state.users.get(id).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => return Ok(Redirect::to("/user/login").into_response()),
        Err(e) => return Err(e.into()),
    };

    let mut data = TemplateData::new(&state, &session, &ctx).await?;
    data.user = Some(user);
    render(&state, StatusCode::OK, "profile.html", data)
}

#[instrument(skip_all)]
pub async fn password_update(
    State(state): State<AppState>,
    session: Session,
    ctx: RequestContext,
) -> Result<Response, AppError> {
    let data = TemplateData::new(&state, &session, &ctx)
        .await?
        .with_form(&PasswordUpdateForm::default())?;
    render(&state, StatusCode::OK, "password.html", data)
}

#[instrument(skip_all)]
pub async fn password_update_post(
    State(state): State<AppState>,
    session: Session,
    ctx: RequestContext,
    Form(mut form): Form<PasswordUpdateForm>,
) -> Result<Response, AppError> {
    if form.validate() {
        let id = session::get_int(&session, AUTHENTICATED_USER_ID).await?;
        match state
            .users
            .password_update(id, &form.current_password, &form.new_password)
            .await
        {
            Ok(()) => {
                info!(user_id = id, "password changed");
                session::put(&session, FLASH, "Your password has been updated!").await?;
                return Ok(Redirect::to("/user/profile").into_response());
            }
            Err(StoreError::InvalidCredentials) => {
                form.validator
                    .add_field_error("current_password", "Current password is incorrect");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let data = TemplateData::new(&state, &session, &ctx)
        .await?
        .with_form(&form)?;
    render(&state, StatusCode::UNPROCESSABLE_ENTITY, "password.html", data)
}
