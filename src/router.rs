//! Guest portal HTTP routes
//!
//! A guest's flow is three requests:
//!
//! 1. The controller redirects the device to `/guest/s/<site>/?id=<mac>&ap=<ap mac>`.
//!    A pending login is created and its token embedded in the login page.
//! 2. The page posts `{cacheId, username, email}` to `/api/login`. The token is
//!    claimed, the controller is asked to authorize the device, the audit
//!    record is written and only then is the token consumed. A second
//!    submission racing the first finds the token already claimed.
//! 3. The guest is redirected to `/success`, whatever the outcome of step 2.

use crate::audit::AuditSink;
use crate::cache::PendingLogins;
use crate::controller::GuestAuthorizer;
use crate::frontend::{is_entry_path, Frontend, Page};
use crate::models::{AuditRecord, GuestGrant, LoginRequest};
use axum::body::Bytes;
use axum::extract::{Query, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub const SUCCESS_PATH: &str = "/success";

/// Shared state for route handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<PendingLogins>,
    pub authorizer: Arc<dyn GuestAuthorizer>,
    pub audit: Arc<dyn AuditSink>,
    pub frontend: Arc<Frontend>,
    /// Minutes of access granted per guest
    pub grant_minutes: u32,
}

pub fn build(state: AppState) -> Router {
    Router::new()
        .route("/api/login", post(submit_login))
        .route(SUCCESS_PATH, get(success_page))
        .route("/", get(portal_page))
        .route("/*path", get(portal_page))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Query parameters the controller appends to the redirect
#[derive(Debug, Default)]
struct PortalParams {
    /// Client MAC
    id: Option<String>,
    /// Access point MAC
    ap: Option<String>,
    /// Token from an earlier render of the same login page
    cache_id: Option<String>,
}

impl PortalParams {
    /// Repeated keys keep their first value; unknown keys are ignored.
    fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut params = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "id" => &mut params.id,
                "ap" => &mut params.ap,
                "cacheId" => &mut params.cache_id,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        params
    }
}

async fn portal_page(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
    request: Request,
) -> Response {
    let params = PortalParams::from_pairs(pairs);
    if let Some(device_id) = params.id.filter(|id| !id.is_empty()) {
        let existing = params
            .cache_id
            .as_deref()
            .and_then(|token| state.store.resolve(token))
            .filter(|pending| pending.device_id == device_id);

        let token = match existing {
            Some(pending) => pending.token,
            None => {
                let ap_id = params.ap.unwrap_or_default();
                tracing::info!("Guest {} arrived via AP {}", device_id, ap_id);
                state.store.create(device_id, ap_id)
            }
        };
        return state.frontend.render(Page::Login, Some(&token)).await;
    }

    if is_entry_path(request.uri().path()) {
        return state.frontend.render(Page::Login, None).await;
    }

    state.frontend.asset(request).await
}

async fn success_page(State(state): State<AppState>) -> Response {
    state.frontend.render(Page::Success, None).await
}

async fn submit_login(State(state): State<AppState>, body: Bytes) -> Response {
    let req: LoginRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            tracing::warn!("Rejected login submission: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid JSON body").into_response();
        }
    };

    complete_login(&state, req).await;
    Redirect::to(SUCCESS_PATH).into_response()
}

/// Authorize, audit, then retire the token. Failures are logged only: the
/// guest is sent on to the success page either way.
async fn complete_login(state: &AppState, req: LoginRequest) {
    if req.cache_id.is_empty() {
        tracing::debug!("Login submitted without a token");
        return;
    }

    // Held until `consume` below, so a racing duplicate stops here.
    let Some(pending) = state.store.claim(&req.cache_id) else {
        tracing::debug!(
            "Login for unknown, expired or in-flight token {}",
            req.cache_id
        );
        return;
    };

    let grant = GuestGrant {
        device_id: pending.device_id.clone(),
        ap_id: pending.ap_id.clone(),
        minutes: state.grant_minutes,
    };

    // Runs outside any store lock.
    if let Err(e) = state.authorizer.authorize_guest(&grant).await {
        tracing::error!("Authorizing guest {} failed: {}", grant.device_id, e);
    }

    let record = AuditRecord {
        token: pending.token.clone(),
        device_id: pending.device_id,
        ap_id: pending.ap_id,
        display_name: req.username,
        email: req.email,
        duration_minutes: state.grant_minutes,
        created_at: chrono::Utc::now(),
    };
    if let Err(e) = state.audit.record(&record).await {
        tracing::error!("Audit record for {} not written: {}", record.token, e);
    }

    if !state.store.consume(&pending.token) {
        tracing::debug!("Token {} was already consumed", pending.token);
    }
}
