use std::{net::SocketAddr, time::Duration};

use axum::{
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    response::Response,
    routing::get,
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer, services::ServeDir, timeout::TimeoutLayer, trace::TraceLayer,
};
use tower_sessions::SessionStore;

use crate::{
    error::status_page,
    middleware::{
        authenticate, csrf, handle_panic, log_request, log_response, make_span,
        require_authentication, secure_headers,
    },
    session, snippets,
    state::AppState,
    users,
};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub fn build_app<S: SessionStore + Clone>(state: AppState, sessions: S) -> Router {
    let protected = Router::new()
        .merge(snippets::protected_router())
        .merge(users::protected_router())
        .route_layer(from_fn(require_authentication));

    let dynamic = Router::new()
        .merge(snippets::router())
        .merge(users::router())
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(session::layer(sessions, &state.config.session))
                .layer(from_fn_with_state(state.csrf_config(), csrf::protect))
                .layer(from_fn_with_state(state.clone(), authenticate)),
        );

    let router = Router::new()
        .merge(dynamic)
        .route("/health", get(|| async { "ok" }))
        .nest_service("/static", ServeDir::new(&state.config.static_dir))
        .fallback(not_found)
        .with_state(state);

    with_standard_layers(router)
}

/// Security headers, request logging, panic recovery and the request
/// timeout, outermost first.
pub fn with_standard_layers(router: Router) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(from_fn(secure_headers))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(make_span)
                    .on_request(log_request)
                    .on_response(log_response),
            )
            .layer(CatchPanicLayer::custom(handle_panic))
            .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
    )
}

async fn not_found() -> Response {
    status_page(StatusCode::NOT_FOUND)
}

pub async fn serve(app: Router, host: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
