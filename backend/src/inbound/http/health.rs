//! `GET /health`: the sync-state health report as JSON.
//!
//! Responds 200 for `ok` and `warning`, 503 for `error`. When credentials
//! are configured the request must carry matching HTTP basic auth;
//! otherwise it gets a 401 with a `WWW-Authenticate` challenge.

use std::sync::Arc;

use actix_web::http::header::{self, HeaderValue};
use actix_web::{HttpRequest, HttpResponse, get, web};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;
use tracing::{info, warn};

use crate::domain::{HealthReporter, HealthStatus};

const CHALLENGE: &str = "Basic realm=\"Health Check\"";

/// Basic-auth pair accepted by the endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct HealthCredentials {
    username: String,
    password: String,
}

impl std::fmt::Debug for HealthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl HealthCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Whether an `Authorization` header carries this pair.
    pub fn accepts(&self, header: Option<&HeaderValue>) -> bool {
        let Some(encoded) = header
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Basic "))
        else {
            return false;
        };
        let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
            return false;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return false;
        };
        decoded
            .split_once(':')
            .is_some_and(|(user, pass)| user == self.username && pass == self.password)
    }
}

/// Shared state behind the handler.
pub struct HealthEndpoint {
    reporter: Arc<HealthReporter>,
    credentials: Option<HealthCredentials>,
}

impl HealthEndpoint {
    pub fn new(reporter: Arc<HealthReporter>, credentials: Option<HealthCredentials>) -> Self {
        Self {
            reporter,
            credentials,
        }
    }

    fn authorised(&self, request: &HttpRequest) -> bool {
        self.credentials.as_ref().is_none_or(|credentials| {
            credentials.accepts(request.headers().get(header::AUTHORIZATION))
        })
    }
}

/// Health report handler.
#[get("/health")]
pub async fn health(state: web::Data<HealthEndpoint>, request: HttpRequest) -> HttpResponse {
    if !state.authorised(&request) {
        warn!(peer = ?request.peer_addr(), "health check rejected: bad credentials");
        return HttpResponse::Unauthorized()
            .insert_header((header::WWW_AUTHENTICATE, CHALLENGE))
            .json(json!({ "error": "Unauthorized" }));
    }

    let report = state.reporter.report().await;
    info!(
        status = %report.status,
        warnings = report.warnings.len(),
        errors = report.errors.len(),
        "health check performed"
    );

    let mut response = if report.status == HealthStatus::Error {
        HttpResponse::ServiceUnavailable()
    } else {
        HttpResponse::Ok()
    };
    response
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .json(report)
}

/// Register the health routes on an actix `App` or scope.
pub fn health_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health);
}
