//! HTTP interface
//!
//! Thin JSON layer over [`Executor`]: request validation and response mapping
//! only. All execution semantics live in the executor.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::SandboxConfig;
use crate::executor::{ExecutionRequest, ExecutionResponse, Executor};
use crate::runner::Secret;

pub fn router(executor: Arc<Executor>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/execute", post(execute))
        .route("/execute-docker", post(execute))
        .with_state(executor)
}

#[derive(Debug, Deserialize)]
pub struct ExecuteBody {
    pub code: String,
    #[serde(default)]
    pub timeout: Option<i64>,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl ExecuteBody {
    /// Check bounds and build the executor request
    fn into_request(self, config: &SandboxConfig) -> Result<ExecutionRequest, ApiError> {
        let timeout = self.timeout.unwrap_or(config.default_timeout_secs as i64);
        let max = config.max_timeout_secs as i64;
        if !(1..=max).contains(&timeout) {
            return Err(ApiError::unprocessable(format!(
                "timeout must be between 1 and {} seconds",
                max
            )));
        }

        let mut request = ExecutionRequest::new(self.code, timeout as u64);
        if let Some(key) = self.api_key.filter(|k| !k.is_empty()) {
            request = request.with_secret(Secret::new(key));
        }
        Ok(request)
    }
}

/// Error body in the `{"detail": ...}` shape
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn unprocessable(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::unprocessable(rejection.body_text())
    }
}

async fn root() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "Python Code Executor API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health(State(executor): State<Arc<Executor>>) -> Json<Value> {
    let mut features = vec!["code_execution"];
    if executor.container_available().await {
        features.push("docker_sandbox");
    }

    Json(json!({
        "status": "ok",
        "max_timeout": executor.config().max_timeout_secs,
        "features": features,
    }))
}

async fn execute(
    State(executor): State<Arc<Executor>>,
    body: Result<Json<ExecuteBody>, JsonRejection>,
) -> Result<Json<ExecutionResponse>, ApiError> {
    let Json(body) = body?;
    let request = body.into_request(executor.config())?;
    let outcome = executor.execute(request).await;
    Ok(Json(outcome.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendPolicy;

    fn body(timeout: Option<i64>, api_key: Option<&str>) -> ExecuteBody {
        ExecuteBody {
            code: "print(1)".into(),
            timeout,
            api_key: api_key.map(String::from),
        }
    }

    fn process_only() -> Arc<Executor> {
        let config = SandboxConfig {
            backend: BackendPolicy::Process,
            ..SandboxConfig::default()
        };
        Arc::new(Executor::new(config))
    }

    #[test]
    fn test_timeout_bounds() {
        let config = SandboxConfig::default();

        let request = body(None, None).into_request(&config).unwrap();
        assert_eq!(request.timeout_secs, 10);
        assert!(body(Some(1), None).into_request(&config).is_ok());
        assert!(body(Some(30), None).into_request(&config).is_ok());

        for bad in [0, -5, 31] {
            let err = body(Some(bad), None).into_request(&config).unwrap_err();
            assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
            assert!(err.detail.contains("between 1 and 30"));
        }
    }

    #[test]
    fn test_api_key_becomes_secret() {
        let config = SandboxConfig::default();

        let request = body(None, Some("sk-1")).into_request(&config).unwrap();
        assert_eq!(request.secret.unwrap().expose(), "sk-1");

        let request = body(None, Some("")).into_request(&config).unwrap();
        assert!(request.secret.is_none());
    }

    #[test]
    fn test_body_defaults() {
        let body: ExecuteBody = serde_json::from_str(r#"{"code": "print(1)"}"#).unwrap();
        assert_eq!(body.timeout, None);
        assert_eq!(body.api_key, None);
        assert!(serde_json::from_str::<ExecuteBody>(r#"{"timeout": 5}"#).is_err());
    }

    #[tokio::test]
    async fn test_root_and_health() {
        let Json(value) = root().await;
        assert_eq!(value["status"], "healthy");
        assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));

        let Json(value) = health(State(process_only())).await;
        assert_eq!(value["status"], "ok");
        assert_eq!(value["max_timeout"], 30);
        assert_eq!(value["features"], json!(["code_execution"]));
    }

    #[tokio::test]
    async fn test_execute_rejects_denied_code() {
        let request = ExecuteBody {
            code: "import socket".into(),
            timeout: Some(5),
            api_key: None,
        };
        let Json(response) = execute(State(process_only()), Ok(Json(request)))
            .await
            .unwrap();

        assert!(!response.success);
        assert!(response.error.unwrap().contains("network access"));
        assert!(response.execution_time.is_none());
    }

    #[tokio::test]
    async fn test_execute_out_of_range_timeout() {
        let err = execute(State(process_only()), Ok(Json(body(Some(99), None))))
            .await
            .unwrap_err();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
