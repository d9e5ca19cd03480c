//! Error type shared by planning, execution and the output registry.

use crate::identity::{HistoryId, JobId, RecordId, SlotIndex};

/// Upload-level error type.
///
/// Planning errors (`InvalidSlotSpec`) reject a whole request synchronously. Resolution
/// errors (`MissingCompositePart`, `UnsupportedType`, `Fetch`) fail a single unit and are
/// surfaced through batch polling.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("invalid slot spec{}: {reason}", slot_suffix(.index))]
    InvalidSlotSpec {
        index: Option<SlotIndex>,
        reason: String,
    },
    #[error("composite datatype '{datatype}' is missing required part '{part}'")]
    MissingCompositePart { datatype: String, part: String },
    #[error("unsupported datatype: {0}")]
    UnsupportedType(String),
    #[error("record {record_id} has no part named '{part}'")]
    PartNotFound { record_id: RecordId, part: String },
    #[error("history not found: {0}")]
    HistoryNotFound(HistoryId),
    #[error("record not found: {0}")]
    RecordNotFound(RecordId),
    #[error("job not found: {0}")]
    JobNotFound(JobId),
    #[error("invalid state transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("fetch error: {0}")]
    Fetch(String),
    #[error("registry error: {0}")]
    Registry(String),
    #[error("runtime error: {0}")]
    Runtime(String),
}

fn slot_suffix(index: &Option<SlotIndex>) -> String {
    match index {
        Some(index) => format!(" for files_{}", index),
        None => String::new(),
    }
}

impl UploadError {
    pub fn invalid_slot(index: SlotIndex, reason: impl Into<String>) -> Self {
        Self::InvalidSlotSpec {
            index: Some(index),
            reason: reason.into(),
        }
    }

    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidSlotSpec {
            index: None,
            reason: reason.into(),
        }
    }

    /// True for errors raised while planning, before anything was submitted.
    pub fn is_planning_error(&self) -> bool {
        matches!(self, Self::InvalidSlotSpec { .. })
    }
}
