//! Upload runtime: output registry, asynchronous batch executor, remote fetching and the
//! HTTP upload API.

#[cfg(feature = "upload-server")]
pub mod api_errors;
#[cfg(feature = "upload-server")]
pub mod api_handlers;
#[cfg(feature = "upload-server")]
pub mod api_models;
pub mod config;
pub mod executor;
pub mod fetcher;
pub mod models;
pub mod observability;
pub mod registry;
pub mod repository;

#[cfg(feature = "upload-server")]
pub use api_errors::ApiError;
#[cfg(feature = "upload-server")]
pub use api_handlers::{build_router, UploadApiState};
#[cfg(feature = "upload-server")]
pub use api_models::{ApiEnvelope, ApiMeta, DatasetView, JobView, RunToolRequest, UPLOAD_TOOL_ID};
pub use config::{ExecutorConfig, ServerConfig};
pub use executor::UploadExecutor;
pub use fetcher::{ContentFetcher, HttpContentFetcher};
pub use models::{
    BatchStatus, JobHandle, JobSnapshot, OutputRecord, RecordOutcome, RecordState, UnitStatus,
    PRIMARY_PART,
};
pub use observability::BatchSummary;
pub use registry::InMemoryOutputRegistry;
pub use repository::OutputRepository;

pub use ingest_kernel::{DatatypeRegistry, UploadError, UploadPlanner, UploadRequest};
