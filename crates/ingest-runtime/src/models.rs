//! Runtime domain models: unit/batch status, output records and job handles.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ingest_kernel::{HistoryId, JobId, RecordId, UploadError};

/// Name of the primary file of a record.
pub const PRIMARY_PART: &str = "primary";

/// Execution status of one planned unit: `pending -> running -> {ok, failed}`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UnitStatus {
    Pending,
    Running,
    Ok,
    Failed { reason: String },
}

impl UnitStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UnitStatus::Ok | UnitStatus::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            UnitStatus::Pending => "pending",
            UnitStatus::Running => "running",
            UnitStatus::Ok => "ok",
            UnitStatus::Failed { .. } => "failed",
        }
    }

    /// Validates a state transition. Terminal states are final.
    pub fn transition(&self, next: UnitStatus) -> Result<UnitStatus, UploadError> {
        let allowed = matches!(
            (self, &next),
            (UnitStatus::Pending, UnitStatus::Running)
                | (UnitStatus::Running, UnitStatus::Ok)
                | (UnitStatus::Running, UnitStatus::Failed { .. })
        );
        if !allowed {
            return Err(UploadError::InvalidTransition {
                from: self.label().to_string(),
                to: next.label().to_string(),
            });
        }
        Ok(next)
    }
}

/// Aggregate status of a submitted batch.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BatchStatus {
    /// No unit has started.
    Pending,
    /// At least one unit started and at least one is not terminal.
    Running,
    Ok,
    /// Every unit failed.
    Failed { reason: String },
    /// All units terminal, some failed. Keyed by unit position.
    Partial { units: BTreeMap<usize, UnitStatus> },
}

impl BatchStatus {
    pub fn from_units(units: &[UnitStatus]) -> Self {
        if units.iter().all(|unit| *unit == UnitStatus::Pending) && !units.is_empty() {
            return BatchStatus::Pending;
        }
        if !units.iter().all(UnitStatus::is_terminal) {
            return BatchStatus::Running;
        }
        let failures: Vec<&str> = units
            .iter()
            .filter_map(|unit| match unit {
                UnitStatus::Failed { reason } => Some(reason.as_str()),
                _ => None,
            })
            .collect();
        if failures.is_empty() {
            BatchStatus::Ok
        } else if failures.len() == units.len() {
            BatchStatus::Failed {
                reason: failures.join("; "),
            }
        } else {
            BatchStatus::Partial {
                units: units.iter().cloned().enumerate().collect(),
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BatchStatus::Pending | BatchStatus::Running)
    }

    pub fn label(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Running => "running",
            BatchStatus::Ok => "ok",
            BatchStatus::Failed { .. } => "failed",
            BatchStatus::Partial { .. } => "partial",
        }
    }
}

/// Lifecycle of an output record.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    Pending,
    Ok,
    Failed,
}

/// Persisted result of executing one planned unit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputRecord {
    /// Assigned by the repository on append.
    pub record_id: RecordId,
    pub history_id: HistoryId,
    /// Zero-based position within the history; assigned on append.
    pub position: usize,
    pub job_id: Option<JobId>,
    pub name: String,
    pub state: RecordState,
    pub file_ext: String,
    pub genome_build: String,
    pub content: Vec<u8>,
    /// Named sub-parts of composite records.
    pub parts: BTreeMap<String, Vec<u8>>,
    pub failure: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OutputRecord {
    /// New pending record; ids and position are filled in by the repository.
    pub fn pending(
        name: impl Into<String>,
        file_ext: impl Into<String>,
        genome_build: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            record_id: String::new(),
            history_id: String::new(),
            position: 0,
            job_id: None,
            name: name.into(),
            state: RecordState::Pending,
            file_ext: file_ext.into(),
            genome_build: genome_build.into(),
            content: Vec::new(),
            parts: BTreeMap::new(),
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_job(mut self, job_id: impl Into<JobId>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn is_composite(&self) -> bool {
        !self.parts.is_empty()
    }

    pub fn part_names(&self) -> Vec<&str> {
        self.parts.keys().map(String::as_str).collect()
    }

    /// Named part bytes; `primary` addresses the main content.
    pub fn part(&self, name: &str) -> Result<&[u8], UploadError> {
        if name == PRIMARY_PART {
            return Ok(&self.content);
        }
        self.parts
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| UploadError::PartNotFound {
                record_id: self.record_id.clone(),
                part: name.to_string(),
            })
    }
}

/// Final content/metadata of a record, or the reason it failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    Ok {
        content: Vec<u8>,
        parts: BTreeMap<String, Vec<u8>>,
        file_ext: String,
        genome_build: String,
    },
    Failed {
        reason: String,
    },
}

/// Returned by submit; identifies the batch and its records, in plan order.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: JobId,
    pub history_id: HistoryId,
    pub record_ids: Vec<RecordId>,
}

/// Point-in-time view of a job.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub history_id: HistoryId,
    pub record_ids: Vec<RecordId>,
    pub units: Vec<UnitStatus>,
    pub status: BatchStatus,
    pub submitted_at: DateTime<Utc>,
}
