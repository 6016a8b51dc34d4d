use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use std::sync::Arc;
use crate::{
    AppState,
    error::AppError,
    services::test_runner::{self, TestKind, TestReport, TestRequest},
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/statistical-tests/ttest", post(ttest))
        .route("/statistical-tests/paired-ttest", post(paired_ttest))
        .route("/statistical-tests/anova", post(anova))
        .route("/statistical-tests/mann-whitney", post(mann_whitney))
        .route("/statistical-tests/wilcoxon-signed-rank", post(wilcoxon_signed_rank))
        .route("/statistical-tests/kruskal-wallis", post(kruskal_wallis))
        .route("/statistical-tests/chi-square", post(chi_square))
        .route("/statistical-tests/pearson-correlation", post(pearson))
        .route("/statistical-tests/spearman-correlation", post(spearman))
        .route("/statistical-tests/kendall-correlation", post(kendall))
}

type TestPayload = Result<Json<TestRequest>, JsonRejection>;
type TestResponse = Result<Json<TestReport>, AppError>;

async fn run(state: Arc<AppState>, kind: TestKind, payload: TestPayload) -> TestResponse {
    let Json(request) = payload?;
    let start = std::time::Instant::now();
    let table = state.store.get(&request.file_id)?;
    let report = test_runner::run_test(&table.dataframe, kind, &request.variables)?;

    tracing::info!(
        "{} on {} finished in {:?} ({})",
        report.test_name,
        request.file_id,
        start.elapsed(),
        report.interpretation
    );
    Ok(Json(report))
}

async fn ttest(State(state): State<Arc<AppState>>, payload: TestPayload) -> TestResponse {
    run(state, TestKind::TTest, payload).await
}

async fn paired_ttest(State(state): State<Arc<AppState>>, payload: TestPayload) -> TestResponse {
    run(state, TestKind::PairedTTest, payload).await
}

async fn anova(State(state): State<Arc<AppState>>, payload: TestPayload) -> TestResponse {
    run(state, TestKind::Anova, payload).await
}

async fn mann_whitney(State(state): State<Arc<AppState>>, payload: TestPayload) -> TestResponse {
    run(state, TestKind::MannWhitney, payload).await
}

async fn wilcoxon_signed_rank(State(state): State<Arc<AppState>>, payload: TestPayload) -> TestResponse {
    run(state, TestKind::WilcoxonSignedRank, payload).await
}

async fn kruskal_wallis(State(state): State<Arc<AppState>>, payload: TestPayload) -> TestResponse {
    run(state, TestKind::KruskalWallis, payload).await
}

async fn chi_square(State(state): State<Arc<AppState>>, payload: TestPayload) -> TestResponse {
    run(state, TestKind::ChiSquare, payload).await
}

async fn pearson(State(state): State<Arc<AppState>>, payload: TestPayload) -> TestResponse {
    run(state, TestKind::Pearson, payload).await
}

async fn spearman(State(state): State<Arc<AppState>>, payload: TestPayload) -> TestResponse {
    run(state, TestKind::Spearman, payload).await
}

async fn kendall(State(state): State<Arc<AppState>>, payload: TestPayload) -> TestResponse {
    run(state, TestKind::Kendall, payload).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{fixture, state_with};
    use axum::http::StatusCode;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> TestPayload {
        Ok(Json(serde_json::from_value(value).unwrap()))
    }

    #[tokio::test]
    async fn ttest_endpoint_returns_envelope() {
        let (state, id) = state_with(fixture());
        let request = payload(json!({
            "file_id": id,
            "variables": {"numeric": "score", "categorical": "group"}
        }));
        let Json(report) = ttest(State(state), request).await.unwrap();
        assert_eq!(report.test_name, "t-Test (Independent)");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["groups"]["a"]["n"], 20);
        assert_eq!(json["statistics"]["df"], 38);
    }

    #[tokio::test]
    async fn correlation_endpoints_share_inputs() {
        let (state, id) = state_with(fixture());
        let body = json!({"file_id": id, "variables": {"var1": "hours", "var2": "score"}});

        let Json(report) = spearman(State(state.clone()), payload(body.clone())).await.unwrap();
        assert_eq!(report.test_type, "spearman_correlation");
        let Json(report) = kendall(State(state), payload(body)).await.unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["statistics"]["n"], 40);
        assert!(json["statistics"]["tau"].is_number());
    }

    #[tokio::test]
    async fn chi_square_endpoint_builds_table() {
        let (state, id) = state_with(fixture());
        let request = payload(json!({"file_id": id, "variables": {"var1": "group", "var2": "passed"}}));
        let Json(report) = chi_square(State(state), request).await.unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["contingency_table"]["rows"], json!(["a", "b"]));
        assert_eq!(json["contingency_table"]["columns"], json!(["no", "yes"]));
    }

    #[tokio::test]
    async fn unknown_file_and_missing_variables() {
        let (state, id) = state_with(fixture());
        let err = anova(State(state.clone()), payload(json!({"file_id": "gone", "variables": {}})))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = paired_ttest(State(state), payload(json!({"file_id": id, "variables": {"var1": "hours"}})))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "Missing required variables: var1 and var2");
    }
}
