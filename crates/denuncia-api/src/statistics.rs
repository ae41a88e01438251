use axum::{Json, extract::State};

use denuncia_db::CountWindow;
use denuncia_types::api::StatisticsResponse;

use crate::error::{AppError, Result};
use crate::state::{AppState, AppStateInner};

/// GET /estatisticas
pub async fn get_statistics(State(state): State<AppState>) -> Result<Json<StatisticsResponse>> {
    let stats = gather(&state).await.map_err(AppError::Statistics)?;
    Ok(Json(stats))
}

/// Run the four counts concurrently. All of them succeed or the first
/// failure is returned; there are no partial results.
pub async fn gather(state: &AppStateInner) -> anyhow::Result<StatisticsResponse> {
    let (total, today, this_week, this_month) = tokio::try_join!(
        state.blocking(|session| session.count_reports(CountWindow::AllTime)),
        state.blocking(|session| session.count_reports(CountWindow::Today)),
        state.blocking(|session| session.count_reports(CountWindow::LastDays(7))),
        state.blocking(|session| session.count_reports(CountWindow::LastDays(30))),
    )?;

    Ok(StatisticsResponse {
        total,
        today,
        this_week,
        this_month,
    })
}
