//! Axum handlers for the upload server.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::middleware::{from_fn, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};

use ingest_kernel::UploadRequest;

use crate::api_errors::ApiError;
use crate::api_models::{
    ApiEnvelope, ApiMeta, DatasetView, DisplayQuery, HistoryResponse, JobRef, JobView,
    RunToolRequest, RunToolResponse, UPLOAD_TOOL_ID,
};
use crate::executor::UploadExecutor;
use crate::registry::InMemoryOutputRegistry;
use crate::repository::OutputRepository;

#[derive(Clone)]
pub struct UploadApiState {
    pub executor: Arc<UploadExecutor<InMemoryOutputRegistry>>,
}

impl UploadApiState {
    pub fn new(executor: Arc<UploadExecutor<InMemoryOutputRegistry>>) -> Self {
        Self { executor }
    }

    fn repository(&self) -> &InMemoryOutputRegistry {
        self.executor.repository()
    }
}

pub fn build_router(state: UploadApiState) -> Router {
    Router::new()
        .route("/api/histories", post(create_history))
        .route("/api/histories/:history_id", delete(drop_history))
        .route("/api/histories/:history_id/contents", get(list_contents))
        .route(
            "/api/histories/:history_id/contents/:dataset_id",
            get(show_content),
        )
        .route(
            "/api/histories/:history_id/contents/:dataset_id/display",
            get(display_content),
        )
        .route("/api/tools", post(run_tool))
        .route("/api/jobs/:job_id", get(show_job))
        .layer(from_fn(request_log_middleware))
        .with_state(state)
}

fn request_id(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

async fn request_log_middleware(
    headers: HeaderMap,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    let rid = request_id(&headers);
    log::info!(
        "upload_api_request request_id={} method={} path={}",
        rid,
        request.method(),
        request.uri().path()
    );
    next.run(request).await
}

fn envelope<T>(request_id: String, data: T) -> Json<ApiEnvelope<T>> {
    Json(ApiEnvelope {
        meta: ApiMeta::ok(),
        request_id,
        data,
    })
}

pub async fn create_history(
    State(state): State<UploadApiState>,
    headers: HeaderMap,
) -> Result<Json<ApiEnvelope<HistoryResponse>>, ApiError> {
    let rid = request_id(&headers);
    let id = state
        .repository()
        .create_history()
        .map_err(|e| ApiError::from_upload(e).with_request_id(rid.clone()))?;
    log::info!("upload_history_created request_id={} history_id={}", rid, id);
    Ok(envelope(rid, HistoryResponse { id }))
}

pub async fn drop_history(
    State(state): State<UploadApiState>,
    Path(history_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ApiEnvelope<HistoryResponse>>, ApiError> {
    let rid = request_id(&headers);
    state
        .executor
        .drop_history(&history_id)
        .map_err(|e| ApiError::from_upload(e).with_request_id(rid.clone()))?;
    log::info!(
        "upload_history_dropped request_id={} history_id={}",
        rid,
        history_id
    );
    Ok(envelope(rid, HistoryResponse { id: history_id }))
}

pub async fn run_tool(
    State(state): State<UploadApiState>,
    headers: HeaderMap,
    Json(req): Json<RunToolRequest>,
) -> Result<Json<ApiEnvelope<RunToolResponse>>, ApiError> {
    let rid = request_id(&headers);
    if req.tool_id != UPLOAD_TOOL_ID {
        return Err(
            ApiError::bad_request(format!("unsupported tool_id '{}'", req.tool_id))
                .with_request_id(rid),
        );
    }
    let request = UploadRequest::from_directives(req.history_id.clone(), &req.inputs)
        .map_err(|e| ApiError::from_upload(e).with_request_id(rid.clone()))?;
    let handle = state
        .executor
        .upload(&request)
        .map_err(|e| ApiError::from_upload(e).with_request_id(rid.clone()))?;

    let mut outputs = Vec::with_capacity(handle.record_ids.len());
    for record_id in &handle.record_ids {
        let record = state
            .repository()
            .get(&handle.history_id, record_id)
            .map_err(|e| ApiError::from_upload(e).with_request_id(rid.clone()))?;
        outputs.push(DatasetView::from(&record));
    }
    let status = state
        .executor
        .poll(&handle.job_id)
        .map_err(|e| ApiError::from_upload(e).with_request_id(rid.clone()))?;
    log::info!(
        "upload_tool_run request_id={} history_id={} job_id={} outputs={}",
        rid,
        handle.history_id,
        handle.job_id,
        outputs.len()
    );
    Ok(envelope(
        rid,
        RunToolResponse {
            outputs,
            jobs: vec![JobRef {
                id: handle.job_id,
                state: status.label().to_string(),
            }],
        },
    ))
}

pub async fn show_job(
    State(state): State<UploadApiState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ApiEnvelope<JobView>>, ApiError> {
    let rid = request_id(&headers);
    let snapshot = state
        .executor
        .snapshot(&job_id)
        .map_err(|e| ApiError::from_upload(e).with_request_id(rid.clone()))?;
    Ok(envelope(rid, JobView::from(snapshot)))
}

pub async fn list_contents(
    State(state): State<UploadApiState>,
    Path(history_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ApiEnvelope<Vec<DatasetView>>>, ApiError> {
    let rid = request_id(&headers);
    let records = state
        .repository()
        .list(&history_id)
        .map_err(|e| ApiError::from_upload(e).with_request_id(rid.clone()))?;
    Ok(envelope(rid, records.iter().map(DatasetView::from).collect()))
}

pub async fn show_content(
    State(state): State<UploadApiState>,
    Path((history_id, dataset_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<ApiEnvelope<DatasetView>>, ApiError> {
    let rid = request_id(&headers);
    let record = state
        .repository()
        .get(&history_id, &dataset_id)
        .map_err(|e| ApiError::from_upload(e).with_request_id(rid.clone()))?;
    Ok(envelope(rid, DatasetView::from(&record)))
}

pub async fn display_content(
    State(state): State<UploadApiState>,
    Path((history_id, dataset_id)): Path<(String, String)>,
    Query(query): Query<DisplayQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let rid = request_id(&headers);
    let bytes = state
        .repository()
        .content(&history_id, &dataset_id, query.filename.as_deref())
        .map_err(|e| ApiError::from_upload(e).with_request_id(rid.clone()))?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use tower::util::ServiceExt;

    use ingest_kernel::DatatypeRegistry;

    use super::{build_router, UploadApiState};
    use crate::config::ExecutorConfig;
    use crate::executor::UploadExecutor;
    use crate::registry::InMemoryOutputRegistry;

    fn test_state() -> UploadApiState {
        let executor = UploadExecutor::new(
            Arc::new(InMemoryOutputRegistry::new()),
            Arc::new(DatatypeRegistry::builtin()),
            ExecutorConfig::default(),
        )
        .expect("executor");
        UploadApiState::new(Arc::new(executor))
    }

    #[tokio::test]
    async fn unknown_tool_is_bad_request() {
        let router = build_router(test_state());
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/tools")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({
                    "tool_id": "cat1",
                    "history_id": "h",
                    "inputs": {}
                })
                .to_string(),
            ))
            .expect("request");
        let resp = router.oneshot(req).await.expect("response");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_history_is_not_found() {
        let router = build_router(test_state());
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/tools")
            .header("content-type", "application/json")
            .header("x-request-id", "rid-404")
            .body(Body::from(
                serde_json::json!({
                    "tool_id": "upload1",
                    "history_id": "missing",
                    "inputs": { "url_paste": "Hello World" }
                })
                .to_string(),
            ))
            .expect("request");
        let resp = router.oneshot(req).await.expect("response");
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("body");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(json["request_id"], "rid-404");
        assert_eq!(json["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let router = build_router(test_state());
        let req = Request::builder()
            .method(Method::GET)
            .uri("/api/jobs/nope")
            .body(Body::empty())
            .expect("request");
        let resp = router.oneshot(req).await.expect("response");
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
