use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, info, warn};

use denuncia_db::{NewReport, ReportRow};
use denuncia_types::api::{
    CreateReportRequest, CreateReportResponse, ListReportsQuery, ListReportsResponse,
};
use denuncia_types::models::Report;

use crate::error::{AppError, Result};
use crate::middleware::SubmissionPermit;
use crate::state::AppState;
use crate::validation::validate_coordinates;

pub const DEFAULT_LIMIT: i64 = 100;
pub const MAX_LIMIT: i64 = 1000;

/// POST /denuncias
///
/// The submission limit is charged before the body is read, so malformed or
/// invalid requests still count against it.
pub async fn create_report(
    State(state): State<AppState>,
    permit: SubmissionPermit,
    body: std::result::Result<Json<CreateReportRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    // An unreadable body carries no coordinates at all.
    let Json(req) = body.map_err(|e| {
        debug!("Rejected report body: {}", e);
        AppError::MissingCoordinates
    })?;

    let coords = validate_coordinates(req.latitude.as_ref(), req.longitude.as_ref())?;

    let client = permit.client;
    let new_report = NewReport {
        latitude: coords.latitude,
        longitude: coords.longitude,
        client_ip: client.ip.clone(),
        client_agent: client.user_agent,
    };

    let row = state
        .blocking(move |session| session.insert_report(&new_report))
        .await
        .map_err(AppError::Database)?;

    info!(id = row.id, ip = %client.ip, "New report stored");

    let report = to_report(row);
    Ok((
        StatusCode::CREATED,
        Json(CreateReportResponse {
            id: report.id,
            latitude: report.latitude,
            longitude: report.longitude,
            timestamp: report.created_at,
            message: "Denúncia registrada com sucesso".to_string(),
        }),
    ))
}

/// GET /denuncias?limit=&offset=
pub async fn list_reports(
    State(state): State<AppState>,
    query: std::result::Result<Query<ListReportsQuery>, QueryRejection>,
) -> Result<Json<ListReportsResponse>> {
    let Query(query) = query.map_err(|_| AppError::InvalidPagination)?;
    let (limit, offset) = parse_pagination(&query)?;

    let page = state
        .blocking(move |session| session.list_reports(limit, offset))
        .await
        .map_err(AppError::Database)?;

    Ok(Json(ListReportsResponse {
        reports: page.rows.into_iter().map(to_report).collect(),
        total: page.total,
        limit,
        offset,
    }))
}

/// Resolve `limit` (1..=1000, default 100) and `offset` (>= 0, default 0).
pub fn parse_pagination(query: &ListReportsQuery) -> Result<(i64, i64)> {
    let limit = parse_param(query.limit.as_deref(), DEFAULT_LIMIT)?;
    let offset = parse_param(query.offset.as_deref(), 0)?;

    if !(1..=MAX_LIMIT).contains(&limit) || offset < 0 {
        return Err(AppError::InvalidPagination);
    }
    Ok((limit, offset))
}

fn parse_param(raw: Option<&str>, default: i64) -> Result<i64> {
    match raw {
        None => Ok(default),
        Some(s) => s.trim().parse().map_err(|_| AppError::InvalidPagination),
    }
}

fn to_report(row: ReportRow) -> Report {
    Report {
        id: row.id,
        latitude: row.latitude,
        longitude: row.longitude,
        created_at: parse_created_at(&row.created_at).unwrap_or_else(|| {
            warn!("Corrupt created_at '{}' on report {}", row.created_at, row.id);
            DateTime::default()
        }),
    }
}

/// SQLite stores `YYYY-MM-DD HH:MM:SS` without a zone; values are UTC.
fn parse_created_at(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .map(|ndt| ndt.and_utc())
        })
}
