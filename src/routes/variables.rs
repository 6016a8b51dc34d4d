use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::post,
    Json, Router,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use crate::{
    AppState,
    error::AppError,
    models::{DateRounding, VariableInfo, VariableType},
    services::{
        columns::column,
        detection::TypeDetector,
        summary::{self, SummaryOptions, VariableSummary, DEFAULT_TEXT_SAMPLE_SIZE, DEFAULT_TEXT_SEED},
    },
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/analyze-variables/:file_id", post(analyze_variables))
        .route("/summary-statistics/:file_id", post(summary_statistics))
        .route("/summary-statistics/:file_id/:variable_name", post(single_variable_summary))
}

#[derive(Debug, Serialize)]
pub struct VariablesResponse {
    file_id: String,
    variables: Vec<VariableInfo>,
}

#[derive(Debug, Deserialize)]
pub struct RequestedVariable {
    name: String,
    #[serde(rename = "currentType")]
    current_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRequest {
    #[serde(default)]
    variables: Vec<RequestedVariable>,
    #[serde(default)]
    date_rounding: HashMap<String, DateRounding>,
    text_seed: Option<u64>,
    text_sample_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleSummaryRequest {
    var_type: Option<String>,
    date_rounding: Option<DateRounding>,
    text_seed: Option<u64>,
    text_sample_size: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    file_id: String,
    summaries: IndexMap<String, VariableSummary>,
}

#[derive(Debug, Serialize)]
pub struct SingleSummaryResponse {
    file_id: String,
    variable_name: String,
    summary: VariableSummary,
}

fn options(state: &AppState, rounding: Option<DateRounding>, seed: Option<u64>, size: Option<usize>) -> SummaryOptions {
    SummaryOptions {
        date_rounding: rounding.unwrap_or_default(),
        text_seed: seed.unwrap_or(DEFAULT_TEXT_SEED),
        text_sample_size: size.unwrap_or(DEFAULT_TEXT_SAMPLE_SIZE),
        shapiro_seed: state.config.random_seed,
    }
}

async fn analyze_variables(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Result<Json<VariablesResponse>, AppError> {
    let start = std::time::Instant::now();
    let table = state.store.get(&file_id)?;
    let variables = TypeDetector::new(&state.config.detection).analyze_frame(&table.dataframe)?;

    tracing::info!(
        "Variable analysis completed for {}: {} variables in {:?}",
        file_id,
        variables.len(),
        start.elapsed()
    );
    Ok(Json(VariablesResponse { file_id, variables }))
}

async fn summary_statistics(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
    payload: Result<Json<SummaryRequest>, JsonRejection>,
) -> Result<Json<SummaryResponse>, AppError> {
    let table = state.store.get(&file_id)?;
    let Json(request) = payload?;
    if request.variables.is_empty() {
        return Err(AppError::InvalidInput("No variables specified".to_string()));
    }

    let mut summaries = IndexMap::new();
    for variable in &request.variables {
        let Ok(series) = table.dataframe.column(&variable.name) else {
            tracing::warn!("Variable {} not found in table {}", variable.name, file_id);
            continue;
        };
        let var_type = match variable.current_type.as_deref().map(str::parse::<VariableType>) {
            Some(Ok(var_type)) => var_type,
            other => {
                tracing::warn!("Skipping {}: unusable type {:?}", variable.name, other);
                continue;
            }
        };
        let opts = options(
            &state,
            request.date_rounding.get(&variable.name).copied(),
            request.text_seed,
            request.text_sample_size,
        );
        summaries.insert(variable.name.clone(), summary::summarize(series, var_type, &opts)?);
    }

    tracing::info!("Summary statistics computed for {}: {} variables", file_id, summaries.len());
    Ok(Json(SummaryResponse { file_id, summaries }))
}

async fn single_variable_summary(
    State(state): State<Arc<AppState>>,
    Path((file_id, variable_name)): Path<(String, String)>,
    payload: Result<Json<SingleSummaryRequest>, JsonRejection>,
) -> Result<Json<SingleSummaryResponse>, AppError> {
    let table = state.store.get(&file_id)?;
    let series = column(&table.dataframe, &variable_name)?;
    let Json(request) = payload?;

    let var_type: VariableType = request
        .var_type
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::InvalidInput("Variable type (varType) is required".to_string()))?
        .parse()
        .map_err(AppError::InvalidInput)?;

    let opts = options(&state, request.date_rounding, request.text_seed, request.text_sample_size);
    let summary = summary::summarize(series, var_type, &opts)?;

    tracing::info!(
        "Single variable summary computed for {}/{} (type: {})",
        file_id,
        variable_name,
        var_type
    );
    Ok(Json(SingleSummaryResponse { file_id, variable_name, summary }))
}
