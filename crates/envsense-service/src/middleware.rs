//! HTTP middleware applied to every route.
//!
//! Requests get an `x-request-id` (generated unless the client sent one),
//! which is echoed on the response and recorded on the request's trace span.
//! Handler panics become a JSON 500 instead of dropping the connection.

use std::any::Any;

use axum::{
    Router,
    body::Body,
    http::{HeaderName, Request, Response, StatusCode, header},
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{self, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{Span, error, info_span};

/// Header carrying the per-request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

fn request_id_header() -> HeaderName {
    HeaderName::from_static(REQUEST_ID_HEADER)
}

/// Wrap a router in the service's middleware stack.
///
/// Layers run outermost first: request id assignment, tracing, id
/// propagation, panic recovery, then CORS.
pub fn apply<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(cors_layer())
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(PropagateRequestIdLayer::new(request_id_header()))
        .layer(TraceLayer::new_for_http().make_span_with(make_span))
        .layer(SetRequestIdLayer::new(request_id_header(), MakeRequestUuid))
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(cors::Any)
        .allow_methods(cors::Any)
        .allow_headers(cors::Any)
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");

    info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id,
    )
}

fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic"
    };
    error!("Handler panicked: {}", detail);

    let body = serde_json::json!({ "error": "internal server error" }).to_string();
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    response
}
