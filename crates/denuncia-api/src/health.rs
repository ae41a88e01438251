use axum::Json;
use chrono::Utc;

use denuncia_types::api::HealthResponse;

/// Liveness check. Does not touch the database.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
        message: "Servidor funcionando corretamente".to_string(),
        timestamp: Utc::now(),
    })
}
