use axum::{
    extract::{Multipart, Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use crate::{
    AppState,
    error::AppError,
    services::ingest::{self, SampleFile, UploadSummary},
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/upload", post(upload_file))
        .route("/sample-data", get(list_sample_data))
        .route("/load-sample/:filename", post(load_sample))
}

#[derive(Debug, Serialize)]
pub struct SampleList {
    samples: Vec<SampleFile>,
}

async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadSummary>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::InvalidInput("No filename provided".to_string()))?;
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::FileProcessingError(format!("Error processing file: {}", e)))?;

        tracing::info!("Received upload {} ({}KB)", filename, data.len() / 1024);
        return Ok(Json(ingest::ingest(&state.store, data, &filename)?));
    }

    Err(AppError::InvalidInput("No file provided".to_string()))
}

async fn list_sample_data(State(state): State<Arc<AppState>>) -> Result<Json<SampleList>, AppError> {
    let samples = ingest::list_sample_files(&state.config.sample_data_dir)?;
    tracing::debug!("Found {} sample files", samples.len());
    Ok(Json(SampleList { samples }))
}

async fn load_sample(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Json<UploadSummary>, AppError> {
    let path = ingest::resolve_sample_path(&state.config.sample_data_dir, &filename)?;
    let data = tokio::fs::read(&path).await?;
    tracing::info!("Loading sample {}", filename);
    Ok(Json(ingest::ingest(&state.store, data.into(), &filename)?))
}
