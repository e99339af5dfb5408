//! # HTTP API
//!
//! Builds the axum router in front of [`SqrlService`]. All endpoints share
//! application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path        | Description                                     |
//! |--------|-------------|-------------------------------------------------|
//! | GET    | `/health`   | Liveness probe                                  |
//! | GET    | `/nut.json` | Fresh nut bound to the requester's IP           |
//! | GET    | `/login`    | Fresh nut plus the `sqrl://` URL to show        |
//! | POST   | `/cli.sqrl` | SQRL client transactions                        |
//! | GET    | `/pag.sqrl` | Browser poll: redirect URL once ident succeeded |
//! | GET    | `/token`    | Resource server: token to user id               |

use axum::{
    extract::{
        rejection::{FormRejection, QueryRejection},
        ConnectInfo, Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

use sqrl_protocol::config::FORM_CONTENT_TYPE;
use sqrl_protocol::identity::Signature;
use sqrl_protocol::message::{ClientMsg, Command, ServerMsg, Tif};
use sqrl_protocol::token::Token;
use sqrl_protocol::transaction::Request;
use sqrl_protocol::{Nut, SqrlService};

use crate::metrics::SharedMetrics;

/// Host used in login URLs when the request carries no `Host` header.
const FALLBACK_HOST: &str = "localhost";

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SqrlService>,
    pub metrics: SharedMetrics,
    /// Bearer key guarding `/token`; open when `None`.
    pub api_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/nut.json", get(nut_handler))
        .route("/login", get(login_handler))
        .route("/cli.sqrl", post(cli_handler))
        .route("/pag.sqrl", get(pag_handler))
        .route("/token", get(token_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request Types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct NutParam {
    pub nut: Nut,
}

#[derive(Debug, Deserialize)]
pub struct TokenParam {
    pub token: Token,
}

/// The three fields every SQRL client posts.
#[derive(Debug, Deserialize)]
pub struct CliForm {
    pub client: String,
    pub server: String,
    pub ids: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /nut.json`: a nut bound to the caller, for pages that build their
/// own login link.
async fn nut_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
) -> Response {
    let ip = client_ip(&headers, connect.as_ref());
    match state.service.issue_nut(Some(&ip)) {
        Ok(nut) => {
            state.metrics.nuts_issued_total.inc();
            Json(serde_json::json!({ "nut": nut })).into_response()
        }
        Err(e) => internal_error("failed to issue nut", &e),
    }
}

/// `GET /login`: a nut bound to the caller and the `sqrl://` URL carrying it.
async fn login_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
) -> Response {
    let ip = client_ip(&headers, connect.as_ref());
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(FALLBACK_HOST);

    match state.service.issue_nut(Some(&ip)) {
        Ok(nut) => {
            state.metrics.nuts_issued_total.inc();
            let url = state.service.login_url(host, &nut);
            Json(serde_json::json!({ "nut": nut, "url": url })).into_response()
        }
        Err(e) => internal_error("failed to issue nut", &e),
    }
}

/// `POST /cli.sqrl?nut=`: one client transaction.
///
/// Always answers with an encoded server message, even when the form is
/// unusable, so the client can read the TIF.
async fn cli_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    param: Result<Query<NutParam>, QueryRejection>,
    form: Result<Form<CliForm>, FormRejection>,
) -> Response {
    let started = Instant::now();
    let ip = client_ip(&headers, connect.as_ref());

    let mut ident = false;
    let reply = match (param, form) {
        (Ok(Query(param)), Ok(Form(form))) => {
            ident = ClientMsg::decode(&form.client).is_ok_and(|msg| msg.command == Command::Ident);
            let req = Request {
                nut: param.nut,
                client: form.client,
                server: form.server,
                ids: Signature::new(form.ids),
                client_ip: ip,
            };
            state.service.handle_client(req).await
        }
        (param, form) => {
            tracing::warn!(
                ip = %ip,
                has_nut = param.is_ok(),
                form_error = ?form.err().map(|e| e.body_text()),
                "unusable client request"
            );
            state.service.client_failure_reply()
        }
    };
    state
        .metrics
        .verification_latency_seconds
        .observe(started.elapsed().as_secs_f64());

    let reply = match reply {
        Ok(reply) => reply,
        Err(e) => return internal_error("failed to seal reply nut", &e),
    };
    record_outcome(&state, &reply, ident);

    match reply.encode() {
        Ok(body) => (StatusCode::OK, [(header::CONTENT_TYPE, FORM_CONTENT_TYPE)], body).into_response(),
        Err(e) => internal_error("failed to encode reply", &e),
    }
}

/// `GET /pag.sqrl?nut=`: polled by the login page with the nut it showed.
///
/// Answers 404 until ident succeeds, and always to a caller other than the
/// one the nut was issued to.
async fn pag_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    Query(param): Query<NutParam>,
) -> Response {
    let ip = client_ip(&headers, connect.as_ref());
    match state.service.pending_redirect(&param.nut, &ip).await {
        Ok(Some(url)) => {
            state.metrics.redirects_served_total.inc();
            (StatusCode::OK, url).into_response()
        }
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => internal_error("failed to look up ident result", &e),
    }
}

/// `GET /token?token=`: trades a token for the user id it was issued to.
async fn token_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(param): Query<TokenParam>,
) -> Response {
    if let Some(key) = &state.api_key {
        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if presented != Some(key.as_str()) {
            return (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "invalid api key" })),
            )
                .into_response();
        }
    }

    match state.service.exchange_token(&param.token) {
        Ok(user) => {
            state.metrics.tokens_exchanged_total.inc();
            Json(serde_json::json!({ "user": user })).into_response()
        }
        Err(e) => {
            tracing::debug!(error = %e, "token rejected");
            (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The requester's address: first `X-Forwarded-For` hop, then `X-Real-Ip`,
/// then the socket peer.
fn client_ip(headers: &HeaderMap, connect: Option<&ConnectInfo<SocketAddr>>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or(real_ip)
        .map(str::to_string)
        .or_else(|| connect.map(|ConnectInfo(addr)| addr.ip().to_string()))
        .unwrap_or_default()
}

/// Counts a handled transaction. A successful `ident` is the one place a
/// token gets minted.
fn record_outcome(state: &AppState, reply: &ServerMsg, ident: bool) {
    if reply.is(Tif::COMMAND_FAILED) {
        state.metrics.transactions_rejected_total.inc();
        return;
    }
    state.metrics.transactions_verified_total.inc();
    if ident {
        state.metrics.tokens_issued_total.inc();
    }
}

fn internal_error(what: &str, err: &dyn std::fmt::Display) -> Response {
    tracing::error!(error = %err, "{what}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": what })),
    )
        .into_response()
}
