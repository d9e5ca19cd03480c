//! API DTOs for the upload server.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use ingest_kernel::{HistoryId, JobId, RecordId};

use crate::models::{BatchStatus, JobSnapshot, OutputRecord, RecordState, UnitStatus};
use crate::observability::BatchSummary;

/// Only tool accepted by `POST /api/tools`.
pub const UPLOAD_TOOL_ID: &str = "upload1";

#[derive(Clone, Debug, Serialize)]
pub struct ApiEnvelope<T> {
    pub meta: ApiMeta,
    pub request_id: String,
    pub data: T,
}

#[derive(Clone, Debug, Serialize)]
pub struct ApiMeta {
    pub status: &'static str,
    pub api_version: &'static str,
}

impl ApiMeta {
    pub fn ok() -> Self {
        Self {
            status: "ok",
            api_version: "v1",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub id: HistoryId,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RunToolRequest {
    pub tool_id: String,
    pub history_id: HistoryId,
    #[serde(default)]
    pub inputs: Map<String, Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobRef {
    pub id: JobId,
    pub state: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct RunToolResponse {
    pub outputs: Vec<DatasetView>,
    pub jobs: Vec<JobRef>,
}

/// Metadata view of one output record; content is served by `display`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatasetView {
    pub id: RecordId,
    pub history_id: HistoryId,
    /// One-based history item number.
    pub hid: usize,
    pub name: String,
    pub state: RecordState,
    pub file_ext: String,
    pub genome_build: String,
    pub parts: Vec<String>,
    pub job_id: Option<JobId>,
    pub failure: Option<String>,
    pub file_size: usize,
    pub create_time: String,
    pub update_time: String,
}

impl From<&OutputRecord> for DatasetView {
    fn from(record: &OutputRecord) -> Self {
        Self {
            id: record.record_id.clone(),
            history_id: record.history_id.clone(),
            hid: record.position + 1,
            name: record.name.clone(),
            state: record.state,
            file_ext: record.file_ext.clone(),
            genome_build: record.genome_build.clone(),
            parts: record.part_names().into_iter().map(str::to_string).collect(),
            job_id: record.job_id.clone(),
            failure: record.failure.clone(),
            file_size: record.content.len(),
            create_time: record.created_at.to_rfc3339(),
            update_time: record.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct JobView {
    pub id: JobId,
    pub history_id: HistoryId,
    pub state: &'static str,
    pub status: BatchStatus,
    pub summary: BatchSummary,
    pub units: Vec<UnitStatus>,
    pub output_ids: Vec<RecordId>,
    pub create_time: String,
}

impl From<JobSnapshot> for JobView {
    fn from(snapshot: JobSnapshot) -> Self {
        Self {
            id: snapshot.job_id,
            history_id: snapshot.history_id,
            state: snapshot.status.label(),
            summary: BatchSummary::from_units(&snapshot.units),
            status: snapshot.status,
            units: snapshot.units,
            output_ids: snapshot.record_ids,
            create_time: snapshot.submitted_at.to_rfc3339(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct DisplayQuery {
    /// Composite part name; absent or `primary` selects the primary file.
    pub filename: Option<String>,
}
