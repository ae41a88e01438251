//! Error taxonomy for the HTTP API and its JSON rendering.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{debug, error};

use denuncia_types::api::ErrorBody;

use crate::validation::CoordinateError;

pub type Result<T> = std::result::Result<T, AppError>;

const GENERIC_MESSAGE: &str = "Erro interno do servidor";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("general rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("report submission limit exceeded, retry in {retry_after_secs}s")]
    SubmissionLimited { retry_after_secs: u64 },

    #[error("missing coordinates")]
    MissingCoordinates,

    #[error("invalid coordinates: {0}")]
    InvalidCoordinates(CoordinateError),

    #[error("invalid pagination parameters")]
    InvalidPagination,

    #[error("database error: {0:#}")]
    Database(anyhow::Error),

    #[error("statistics query failed: {0:#}")]
    Statistics(anyhow::Error),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("route not found: {0}")]
    NotFound(String),
}

/// Detail of an `INTERNAL_ERROR`, attached to the response so the
/// environment-aware middleware can decide whether to echo it.
#[derive(Debug, Clone)]
pub struct InternalDetail(pub String);

impl From<CoordinateError> for AppError {
    fn from(e: CoordinateError) -> Self {
        match e {
            CoordinateError::Missing => Self::MissingCoordinates,
            other => Self::InvalidCoordinates(other),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RateLimited { .. } | Self::SubmissionLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::MissingCoordinates | Self::InvalidCoordinates(_) | Self::InvalidPagination => {
                StatusCode::BAD_REQUEST
            }
            Self::Database(_) | Self::Statistics(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            Self::SubmissionLimited { .. } => "DENUNCIA_LIMIT_EXCEEDED",
            Self::MissingCoordinates => "MISSING_COORDINATES",
            Self::InvalidCoordinates(_) => "INVALID_COORDINATES",
            Self::InvalidPagination => "INVALID_PAGINATION",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Statistics(_) => "STATISTICS_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
        }
    }

    /// Client-facing message. Never includes internal detail.
    fn public_message(&self) -> String {
        match self {
            Self::RateLimited { .. } => "Muitas tentativas. Tente novamente em 15 minutos.".into(),
            Self::SubmissionLimited { .. } => {
                "Limite de denúncias excedido. Tente novamente em 1 hora.".into()
            }
            Self::MissingCoordinates => CoordinateError::Missing.to_string(),
            Self::InvalidCoordinates(e) => e.to_string(),
            Self::InvalidPagination => {
                "Parâmetros de paginação inválidos. Limit deve estar entre 1-1000 e offset >= 0."
                    .into()
            }
            Self::Statistics(_) => "Erro interno do servidor ao buscar estatísticas".into(),
            Self::Database(_) | Self::Internal(_) => GENERIC_MESSAGE.into(),
            Self::NotFound(_) => "Rota não encontrada".into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        if status.is_server_error() {
            error!(error = %self, code, "Request failed");
        } else {
            debug!(error = %self, code, "Request rejected");
        }

        let body = ErrorBody {
            error: self.public_message(),
            code: code.to_string(),
            path: match &self {
                Self::NotFound(path) => Some(path.clone()),
                _ => None,
            },
            message: None,
        };

        let mut response = (status, Json(body)).into_response();

        match self {
            Self::RateLimited { retry_after_secs } | Self::SubmissionLimited { retry_after_secs } => {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            }
            Self::Internal(detail) => {
                response.extensions_mut().insert(InternalDetail(detail));
            }
            _ => {}
        }

        response
    }
}
