//! HTTP request handlers for the local extraction endpoint.
//!
//! Lets the coordinator or an operator run an extractor synchronously,
//! outside the task-assignment loop.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router as AxumRouter,
};
use serde::{Deserialize, Serialize};
use siphon_domain::{Content, Extracted, ExtractorDescription, Feature};
use siphon_extractor::{ExtractionExecutor, ExtractorError};
use siphon_store::TaskStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Executor running the requested extractions
    pub executor: Arc<dyn ExtractionExecutor>,
    /// Task store, for the load figure in health checks
    pub store: Arc<TaskStore>,
    /// Identity of this agent
    pub executor_id: String,
    /// Descriptions of the advertised extractors
    pub extractors: Arc<Vec<ExtractorDescription>>,
}

/// Extraction request
#[derive(Debug, Serialize, Deserialize)]
pub struct ExtractRequest {
    /// Extractor to run
    pub extractor_name: String,
    /// Input content
    pub content: Content,
    /// Extractor parameters, as a JSON value or a JSON-encoded string
    #[serde(default)]
    pub input_params: Option<serde_json::Value>,
}

impl ExtractRequest {
    /// Parameters in the serialized form extractors receive
    pub fn params(&self) -> Option<String> {
        match &self.input_params {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(value) => Some(value.to_string()),
        }
    }
}

/// Extraction response
#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractResponse {
    /// Produced content
    pub content: Vec<Content>,
    /// Produced standalone features
    pub features: Vec<Feature>,
}

impl From<Vec<Extracted>> for ExtractResponse {
    fn from(outputs: Vec<Extracted>) -> Self {
        let mut response = Self::default();
        for output in outputs {
            match output {
                Extracted::Content(c) => response.content.push(c),
                Extracted::Feature(f) => response.features.push(f),
            }
        }
        response
    }
}

/// Agent banner
#[derive(Debug, Serialize, Deserialize)]
pub struct InfoResponse {
    /// Service name
    pub name: String,
    /// Identity of this agent
    pub executor_id: String,
    /// Advertised extractor names
    pub extractors: Vec<String>,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    /// Overall health status
    pub status: String,
    /// Pending plus running tasks
    pub pending_tasks: usize,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    /// No such extractor
    UnknownExtractor(String),
    /// The extractor ran and failed
    ExtractionFailed(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::UnknownExtractor(name) => (StatusCode::NOT_FOUND, format!("Unknown extractor: {name}")),
            AppError::ExtractionFailed(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
        };

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}

impl From<ExtractorError> for AppError {
    fn from(e: ExtractorError) -> Self {
        match e {
            ExtractorError::UnknownExtractor(name) => AppError::UnknownExtractor(name),
            other => AppError::ExtractionFailed(other.to_string()),
        }
    }
}

/// GET / - Agent banner
async fn root(State(state): State<AppState>) -> Json<InfoResponse> {
    Json(InfoResponse {
        name: "siphon".to_string(),
        executor_id: state.executor_id.clone(),
        extractors: state.extractors.iter().map(|d| d.name.clone()).collect(),
    })
}

/// GET /health - Liveness and load
async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "ok".to_string(),
        pending_tasks: state.store.num_pending_tasks(),
    })
}

/// GET /extractors - Advertised extractor descriptions
async fn list_extractors(State(state): State<AppState>) -> Json<Vec<ExtractorDescription>> {
    Json(state.extractors.as_ref().clone())
}

/// POST /extract - Run one extraction synchronously
async fn extract(
    State(state): State<AppState>,
    Json(request): Json<ExtractRequest>,
) -> Result<Json<ExtractResponse>, AppError> {
    let params = request.params();
    debug!(extractor = %request.extractor_name, bytes = request.content.len(), "Local extraction");

    let outputs = state
        .executor
        .extract_one(&request.extractor_name, request.content, params)
        .await
        .map_err(|e| {
            warn!(extractor = %request.extractor_name, error = %e, "Local extraction failed");
            AppError::from(e)
        })?;

    Ok(Json(outputs.into()))
}

/// Create the axum router with all routes
pub fn create_router(state: AppState) -> AxumRouter {
    AxumRouter::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/extractors", get(list_extractors))
        .route("/extract", post(extract))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use siphon_extractor::{ExtractorRegistry, InlineExecutor};
    use tower::ServiceExt; // for oneshot

    fn create_test_state() -> AppState {
        AppState {
            executor: Arc::new(InlineExecutor::new(ExtractorRegistry::builtins())),
            store: Arc::new(TaskStore::new()),
            executor_id: "agent-1".to_string(),
            extractors: Arc::new(vec![ExtractorDescription::new("echo", "0.1.0", "echo")]),
        }
    }

    #[test]
    fn test_params_forms() {
        let parse = |body: &str| serde_json::from_str::<ExtractRequest>(body).unwrap().params();
        let content = r#""content": {"content_type": "text/plain", "bytes": []}"#;

        assert_eq!(parse(&format!(r#"{{"extractor_name": "x", {content}}}"#)), None);
        assert_eq!(
            parse(&format!(r#"{{"extractor_name": "x", {content}, "input_params": {{"a": 1}}}}"#)),
            Some(r#"{"a":1}"#.to_string())
        );
        assert_eq!(
            parse(&format!(r#"{{"extractor_name": "x", {content}, "input_params": "{{\"a\": 1}}"}}"#)),
            Some(r#"{"a": 1}"#.to_string())
        );
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = create_router(create_test_state());

        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_extractor_is_404() {
        let app = create_router(create_test_state());

        let request = Request::builder()
            .method("POST")
            .uri("/extract")
            .header("content-type", "application/json")
            .body(Body::from(
                r#"{"extractor_name": "model-x", "content": {"content_type": "text/plain", "bytes": [104, 105]}}"#,
            ))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
