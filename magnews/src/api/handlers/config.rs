//! HTTP handlers for configuration retrieval endpoints.

use axum::{Json, extract::State};

use crate::{
    AppState,
    api::models::{ApiResponse, phase::PhaseConfigResponse},
    phase::LaunchPhase,
};

/// Get the launch phase and the features it enables
#[utoipa::path(
    get,
    path = "/config",
    tag = "config",
    responses(
        (status = 200, description = "Current launch phase", body = ApiResponse<PhaseConfigResponse>),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_config(State(state): State<AppState>) -> Json<ApiResponse<PhaseConfigResponse>> {
    Json(ApiResponse::ok(LaunchPhase(state.config.phase).into()))
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{create_test_app_with_config, create_test_config};
    use serde_json::Value;
    use sqlx::PgPool;

    #[sqlx::test]
    async fn test_get_config_reports_phase(pool: PgPool) {
        let mut config = create_test_config();
        config.phase = 2;
        let server = create_test_app_with_config(pool, config).await;

        let response = server.get("/api/config").await;
        response.assert_status_ok();
        let data = response.json::<Value>()["data"].clone();
        assert_eq!(data["phase"], 2);
        assert_eq!(data["phase_name"], "Community & Shop Partnerships");
        assert_eq!(data["payment_active"], true);
        assert_eq!(data["registration_open"], false);
        assert_eq!(data["founding_member_price"], 1);
    }
}
