//! GET /api/health

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::types::ApiContext;
use crate::api::ApiError;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub models: ModelAvailability,
}

#[derive(Serialize)]
pub struct ModelAvailability {
    pub vision: bool,
    pub report: bool,
}

/// Liveness plus a model-availability probe. A missing model degrades
/// the status but keeps the endpoint at 200: the service itself is up.
pub async fn check(State(ctx): State<ApiContext>) -> Result<Json<HealthResponse>, ApiError> {
    // A trivial query proves the database is reachable.
    {
        let conn = ctx.lock_db()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
    }

    let models = ModelAvailability {
        vision: ctx.annotator.is_available().await,
        report: ctx.generator.is_available().await,
    };
    let status = if models.vision && models.report {
        "ok"
    } else {
        "degraded"
    };

    Ok(Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        models,
    }))
}
