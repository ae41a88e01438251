use std::any::Any;
use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{HeaderName, HeaderValue, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use denuncia_types::api::ErrorBody;
use tracing::{error, warn};

use crate::error::{AppError, InternalDetail};
use crate::state::AppState;

const UNKNOWN: &str = "unknown";

/// Audit information about the caller.
///
/// The address comes from the TCP peer only. Proxy headers such as
/// `X-Forwarded-For` are ignored since clients can forge them to dodge the
/// rate limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: String,
}

impl ClientInfo {
    pub fn from_parts(parts: &Parts) -> Self {
        let ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| UNKNOWN.to_string());

        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN)
            .to_string();

        Self { ip, user_agent }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for ClientInfo {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}

/// Admission under the report-submission policy. Extract it before the body
/// so throttled clients are turned away without parsing anything.
#[derive(Debug, Clone)]
pub struct SubmissionPermit {
    pub client: ClientInfo,
}

impl FromRequestParts<AppState> for SubmissionPermit {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let client = ClientInfo::from_parts(parts);

        match state.submission_limiter.check(&client.ip) {
            Ok(_) => Ok(Self { client }),
            Err(exceeded) => {
                warn!(ip = %client.ip, "Report submission limit exceeded");
                Err(AppError::SubmissionLimited {
                    retry_after_secs: exceeded.retry_after_secs,
                })
            }
        }
    }
}

static RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
static RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
static RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// General per-IP throttle applied to every route, unmatched ones included.
pub async fn general_rate_limit(
    State(state): State<AppState>,
    client: ClientInfo,
    request: Request,
    next: Next,
) -> Response {
    match state.general_limiter.check(&client.ip) {
        Ok(status) => {
            let mut response = next.run(request).await;

            let headers = response.headers_mut();
            headers.insert(RATELIMIT_LIMIT.clone(), HeaderValue::from(status.limit));
            headers.insert(RATELIMIT_REMAINING.clone(), HeaderValue::from(status.remaining));
            headers.insert(
                RATELIMIT_RESET.clone(),
                HeaderValue::from(status.reset_after.as_secs()),
            );

            response
        }
        Err(exceeded) => {
            warn!(ip = %client.ip, path = %request.uri().path(), "Rate limit exceeded");

            let mut response = AppError::RateLimited {
                retry_after_secs: exceeded.retry_after_secs,
            }
            .into_response();

            let headers = response.headers_mut();
            headers.insert(RATELIMIT_LIMIT.clone(), HeaderValue::from(exceeded.limit));
            headers.insert(RATELIMIT_REMAINING.clone(), HeaderValue::from(0u32));
            headers.insert(
                RATELIMIT_RESET.clone(),
                HeaderValue::from(exceeded.retry_after_secs),
            );

            response
        }
    }
}

/// Outside production, re-render `INTERNAL_ERROR` bodies with the detail
/// carried in [`InternalDetail`].
pub async fn expose_error_detail(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;

    if !state.environment.exposes_error_detail() {
        return response;
    }

    let Some(InternalDetail(detail)) = response.extensions_mut().remove::<InternalDetail>() else {
        return response;
    };

    let body = ErrorBody {
        error: "Erro interno do servidor".into(),
        code: "INTERNAL_ERROR".into(),
        path: None,
        message: Some(detail),
    };

    match serde_json::to_vec(&body) {
        Ok(bytes) => {
            response.headers_mut().remove(header::CONTENT_LENGTH);
            *response.body_mut() = Body::from(bytes);
        }
        Err(e) => error!("Failed to render error detail: {}", e),
    }

    response
}

/// Hardening headers for a JSON-only API.
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN"));
    headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("no-referrer"));
    headers.insert(header::X_DNS_PREFETCH_CONTROL, HeaderValue::from_static("off"));
    headers.insert(
        header::STRICT_TRANSPORT_SECURITY,
        HeaderValue::from_static("max-age=15552000; includeSubDomains"),
    );
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );

    response
}

/// Render a handler panic as `INTERNAL_ERROR` instead of dropping the
/// connection.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    AppError::Internal(detail).into_response()
}
