use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use std::sync::Arc;
use crate::{
    AppState,
    error::AppError,
    services::regression::{self, LinearReport, LogisticReport, RegressionRequest},
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/regression/linear", post(linear_regression))
        .route("/regression/logistic", post(logistic_regression))
}

async fn linear_regression(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegressionRequest>, JsonRejection>,
) -> Result<Json<LinearReport>, AppError> {
    let Json(request) = payload?;
    let start = std::time::Instant::now();
    let table = state.store.get(&request.file_id)?;
    let report = regression::linear(&table.dataframe, &request.variables, state.config.random_seed)?;
    tracing::info!("Linear regression on {} finished in {:?}", request.file_id, start.elapsed());
    Ok(Json(report))
}

async fn logistic_regression(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegressionRequest>, JsonRejection>,
) -> Result<Json<LogisticReport>, AppError> {
    let Json(request) = payload?;
    let start = std::time::Instant::now();
    let table = state.store.get(&request.file_id)?;
    let report = regression::logistic(&table.dataframe, &request.variables)?;
    tracing::info!("Logistic regression on {} finished in {:?}", request.file_id, start.elapsed());
    Ok(Json(report))
}
