use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Report;

// -- Health --

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

// -- Reports --

/// Coordinates arrive untyped: clients send either JSON numbers or strings,
/// and validation needs the raw text to enforce the precision limit.
#[derive(Debug, Default, Deserialize)]
pub struct CreateReportRequest {
    #[serde(default)]
    pub latitude: Option<Value>,
    #[serde(default)]
    pub longitude: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateReportResponse {
    pub id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Query string for `GET /denuncias`. Kept as raw text so out-of-range and
/// negative values surface as `INVALID_PAGINATION` instead of an extractor error.
#[derive(Debug, Default, Deserialize)]
pub struct ListReportsQuery {
    pub limit: Option<String>,
    pub offset: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListReportsResponse {
    #[serde(rename = "denuncias")]
    pub reports: Vec<Report>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

// -- Statistics --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsResponse {
    pub total: i64,
    #[serde(rename = "hoje")]
    pub today: i64,
    #[serde(rename = "semana")]
    pub this_week: i64,
    #[serde(rename = "mes")]
    pub this_month: i64,
}

// -- Errors --

/// Body of every 4xx/5xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
    /// Requested path, only on `NOT_FOUND`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub path: Option<String>,
    /// Internal detail, only echoed outside production.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
}
