// HTTP surface: axum router mapping routes onto the hop pipeline

use crate::capture::RequestCapture;
use crate::pipeline::{HopResponse, Pipeline};
use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, Method};
use axum::routing::{get, post};
use axum::Router;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

/// Build the full route table.
///
/// The collection and operator routes carry a permissive CORS layer since
/// hop 3 is always a cross-origin XHR from the destination page context.
pub fn router(pipeline: Arc<Pipeline>) -> Router {
    let state = AppState { pipeline };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let cross_origin = Router::new()
        .route("/p/:edid/*rest", post(collect_postdata))
        .route("/create", post(create_collector))
        .route("/events/:eid", get(audit_event))
        .route("/sessions/:sid", get(audit_session))
        .layer(cors);

    Router::new()
        .route("/l/:did", get(resolve_link))
        .route("/s/:edid/*rest", get(dispatch_script))
        .merge(cross_origin)
        .with_state(state)
}

/// Every handler error collapses to the same empty 400. The cause is kept
/// server-side in the logs.
fn drop_on_error(result: crate::error::Result<HopResponse>) -> HopResponse {
    match result {
        Ok(response) => response,
        Err(err) => {
            tracing::debug!(error = %err, "request dropped");
            HopResponse::drop_response()
        }
    }
}

fn build_capture(
    state: &AppState,
    method: &str,
    path: &str,
    headers: &HeaderMap,
    body: Option<Value>,
) -> RequestCapture {
    let origin = match &state.pipeline.config().public_origin {
        Some(origin) => origin.clone(),
        None => {
            let proto = headers
                .get("x-forwarded-proto")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("http");
            let host = headers
                .get("host")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("localhost");
            format!("{}://{}", proto, host)
        }
    };
    let mut capture = RequestCapture::new(method, &origin, path);
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            capture = capture.with_header(name.as_str(), value);
        }
    }
    match body {
        Some(body) => capture.with_body(body),
        None => capture,
    }
}

async fn resolve_link(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(did): Path<String>,
    headers: HeaderMap,
) -> HopResponse {
    let capture = build_capture(&state, "GET", &format!("/l/{}", did), &headers, None);
    let socket_ip = addr.ip().to_string();
    drop_on_error(
        state
            .pipeline
            .resolve_link(&did, &capture, Some(&socket_ip))
            .await,
    )
}

async fn dispatch_script(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path((edid, rest)): Path<(String, String)>,
    headers: HeaderMap,
) -> HopResponse {
    let capture = build_capture(
        &state,
        "GET",
        &format!("/s/{}/{}", edid, rest),
        &headers,
        None,
    );
    let socket_ip = addr.ip().to_string();
    drop_on_error(
        state
            .pipeline
            .dispatch_script(&edid, &capture, Some(&socket_ip))
            .await,
    )
}

async fn collect_postdata(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path((edid, rest)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> HopResponse {
    // Undecodable bodies become a missing body, which the pipeline
    // rejects as malformed before touching any record.
    let body = serde_json::from_slice::<Value>(&body).ok();
    let capture = build_capture(
        &state,
        "POST",
        &format!("/p/{}/{}", edid, rest),
        &headers,
        body,
    );
    let socket_ip = addr.ip().to_string();
    drop_on_error(
        state
            .pipeline
            .collect_postdata(&edid, &capture, Some(&socket_ip))
            .await,
    )
}

async fn create_collector(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> HopResponse {
    let body = serde_json::from_slice::<Value>(&body).ok();
    let capture = build_capture(&state, "POST", "/create", &headers, body);
    drop_on_error(state.pipeline.create_collector(&capture).await)
}

async fn audit_event(
    State(state): State<AppState>,
    Path(eid): Path<String>,
    headers: HeaderMap,
) -> HopResponse {
    let capture = build_capture(&state, "GET", &format!("/events/{}", eid), &headers, None);
    drop_on_error(state.pipeline.audit_event(&eid, &capture).await)
}

async fn audit_session(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    headers: HeaderMap,
) -> HopResponse {
    let capture = build_capture(&state, "GET", &format!("/sessions/{}", sid), &headers, None);
    drop_on_error(state.pipeline.audit_session(&sid, &capture).await)
}
