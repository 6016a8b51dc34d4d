use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use crate::{config::Config, AppState};

pub mod analysis;
pub mod files;
pub mod regression;
pub mod statistical_tests;
pub mod variables;

const SERVICE_NAME: &str = "Stats Services API";

/// Every API route, mounted by `main` under `/api`.
pub fn routes(config: &Config) -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .merge(files::routes())
        .merge(variables::routes())
        .merge(analysis::routes())
        .merge(statistical_tests::routes())
        .merge(regression::routes())
        .layer(cors(config))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(config.max_file_size))
}

fn cors(config: &Config) -> CorsLayer {
    let origins = if config.allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            config
                .allowed_origins
                .iter()
                .filter_map(|o| o.parse::<HeaderValue>().ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600))
}

async fn health_check() -> Json<Value> {
    Json(json!({"status": "ok", "service": SERVICE_NAME}))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_reports_ok() {
        let Json(body) = health_check().await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], SERVICE_NAME);
    }

    #[test]
    fn router_builds_with_wildcard_and_listed_origins() {
        let mut config = Config::default();
        let _ = routes(&config);
        config.allowed_origins = vec!["*".to_string()];
        let _ = routes(&config);
    }
}
