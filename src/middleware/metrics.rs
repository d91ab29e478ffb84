use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};

use crate::{handlers::AppState, services::metrics::RouteTimer};

pub async fn metrics_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    // Route templates keep label cardinality bounded
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or("unmatched", |path| path.as_str())
        .to_string();
    let mut timer = RouteTimer::start(request.method().as_str(), route);

    let response = next.run(request).await;

    let status = response.status();
    timer.finish(status.as_u16());
    match status.as_u16() {
        500..=599 => state.metrics.record_error("server_error"),
        400..=499 => state.metrics.record_error("client_error"),
        _ => {}
    }

    response
}
