use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use crate::{
    AppState,
    error::AppError,
    services::{
        analysis::{self, AnalysisResults, AnalysisType},
        visualize::{self, VisualizeRequest, VisualizeResponse},
    },
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/analyze", post(analyze_data))
        .route("/visualize/:file_id", post(visualize_data))
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    file_id: String,
    #[serde(default)]
    analysis_type: AnalysisType,
    #[serde(default)]
    columns: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    analysis_type: AnalysisType,
    columns_analyzed: Vec<String>,
    results: AnalysisResults,
}

async fn analyze_data(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let Json(request) = payload?;
    let start = std::time::Instant::now();
    let table = state.store.get(&request.file_id)?;

    let columns = analysis::numeric_columns(&table.dataframe, &request.columns)?;
    let results = analysis::run(&table.dataframe, request.analysis_type, &columns, state.config.random_seed)?;

    tracing::info!(
        "{:?} analysis of {} columns for {} in {:?}",
        request.analysis_type,
        columns.len(),
        request.file_id,
        start.elapsed()
    );
    Ok(Json(AnalyzeResponse {
        analysis_type: request.analysis_type,
        columns_analyzed: columns,
        results,
    }))
}

async fn visualize_data(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
    payload: Result<Json<VisualizeRequest>, JsonRejection>,
) -> Result<Json<VisualizeResponse>, AppError> {
    let table = state.store.get(&file_id)?;
    let Json(request) = payload?;
    let plot = visualize::build(&table.dataframe, &request)?;

    tracing::debug!("Built {:?} plot with {} traces for {}", request.plot_type, plot.data.len(), file_id);
    Ok(Json(VisualizeResponse {
        file_id,
        plot_type: request.plot_type,
        plotly_data: plot.data,
        plotly_layout: plot.layout,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{fixture, state_with};
    use axum::http::StatusCode;
    use serde_json::json;

    fn body<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<Json<T>, JsonRejection> {
        Ok(Json(serde_json::from_value(value).unwrap()))
    }

    #[tokio::test]
    async fn descriptive_analysis_filters_columns() {
        let (state, id) = state_with(fixture());
        let request = body(json!({"file_id": id, "columns": ["hours", "group"]}));
        let Json(response) = analyze_data(State(state), request).await.unwrap();
        assert_eq!(response.columns_analyzed, vec!["hours".to_string()]);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["analysis_type"], "descriptive");
        assert_eq!(json["results"]["hours"]["count"], 40);
    }

    #[tokio::test]
    async fn correlation_analysis_returns_matrix() {
        let (state, id) = state_with(fixture());
        let request = body(json!({"file_id": id, "analysis_type": "correlation", "columns": ["hours", "score"]}));
        let Json(response) = analyze_data(State(state), request).await.unwrap();
        let json = serde_json::to_value(&response).unwrap();
        let r = json["results"]["correlation_matrix"]["hours"]["hours"].as_f64().unwrap();
        assert!((r - 1.0).abs() < 1e-12);
        assert_eq!(json["results"]["columns"], json!(["hours", "score"]));
    }

    #[tokio::test]
    async fn analysis_without_numeric_columns_is_rejected() {
        let (state, id) = state_with(fixture());
        let request = body(json!({"file_id": id, "columns": ["group"]}));
        let err = analyze_data(State(state), request).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "No valid numeric columns found");
    }

    #[tokio::test]
    async fn visualize_wraps_plot() {
        let (state, id) = state_with(fixture());
        let request = body(json!({"plot_type": "boxplot", "variables": {"numeric": "score", "categorical": "group"}}));
        let Json(response) = visualize_data(State(state), Path(id.clone()), request).await.unwrap();
        assert_eq!(response.file_id, id);
        assert_eq!(response.plot_type, visualize::PlotKind::Boxplot);
        assert_eq!(response.plotly_data.len(), 2);
        assert_eq!(response.plotly_layout["title"], "Box Plot of score");
    }

    #[tokio::test]
    async fn visualize_unknown_file() {
        let (state, _) = state_with(fixture());
        let request = body(json!({"plot_type": "histogram", "variables": {"numeric": "score"}}));
        let err = visualize_data(State(state), Path("missing".to_string()), request).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
