//! In-memory output registry.
//!
//! One log per history, positions assigned on append. Each history has its own lock, so
//! concurrent writers to different histories do not contend.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use uuid::Uuid;

use ingest_kernel::{HistoryId, RecordId, UploadError};

use super::models::{OutputRecord, RecordOutcome, RecordState};
use super::repository::OutputRepository;

#[derive(Default)]
struct HistoryLog {
    records: Vec<OutputRecord>,
    /// record_id -> position
    index: HashMap<RecordId, usize>,
}

impl HistoryLog {
    fn position(&self, record_id: &str) -> Result<usize, UploadError> {
        self.index
            .get(record_id)
            .copied()
            .ok_or_else(|| UploadError::RecordNotFound(record_id.to_string()))
    }
}

pub struct InMemoryOutputRegistry {
    histories: RwLock<HashMap<HistoryId, Arc<RwLock<HistoryLog>>>>,
}

impl InMemoryOutputRegistry {
    pub fn new() -> Self {
        Self {
            histories: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a history under a caller-chosen id. Existing histories are kept.
    pub fn insert_history(&self, history_id: impl Into<HistoryId>) -> Result<(), UploadError> {
        let mut histories = self
            .histories
            .write()
            .map_err(|e| UploadError::Registry(e.to_string()))?;
        histories.entry(history_id.into()).or_default();
        Ok(())
    }

    fn history(&self, history_id: &str) -> Result<Arc<RwLock<HistoryLog>>, UploadError> {
        let histories = self
            .histories
            .read()
            .map_err(|e| UploadError::Registry(e.to_string()))?;
        histories
            .get(history_id)
            .cloned()
            .ok_or_else(|| UploadError::HistoryNotFound(history_id.to_string()))
    }
}

impl Default for InMemoryOutputRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputRepository for InMemoryOutputRegistry {
    fn create_history(&self) -> Result<HistoryId, UploadError> {
        let history_id = Uuid::new_v4().to_string();
        self.insert_history(history_id.clone())?;
        log::debug!("history_created history_id={}", history_id);
        Ok(history_id)
    }

    fn drop_history(&self, history_id: &str) -> Result<(), UploadError> {
        let mut histories = self
            .histories
            .write()
            .map_err(|e| UploadError::Registry(e.to_string()))?;
        histories
            .remove(history_id)
            .map(|_| ())
            .ok_or_else(|| UploadError::HistoryNotFound(history_id.to_string()))
    }

    fn has_history(&self, history_id: &str) -> Result<bool, UploadError> {
        let histories = self
            .histories
            .read()
            .map_err(|e| UploadError::Registry(e.to_string()))?;
        Ok(histories.contains_key(history_id))
    }

    fn append_all(
        &self,
        history_id: &str,
        records: Vec<OutputRecord>,
    ) -> Result<Vec<RecordId>, UploadError> {
        let history = self.history(history_id)?;
        let mut log = history
            .write()
            .map_err(|e| UploadError::Registry(e.to_string()))?;
        let mut ids = Vec::with_capacity(records.len());
        for mut record in records {
            let position = log.records.len();
            let record_id = Uuid::new_v4().to_string();
            record.record_id = record_id.clone();
            record.history_id = history_id.to_string();
            record.position = position;
            log.index.insert(record_id.clone(), position);
            log.records.push(record);
            ids.push(record_id);
        }
        Ok(ids)
    }

    fn get(&self, history_id: &str, record_id: &str) -> Result<OutputRecord, UploadError> {
        let history = self.history(history_id)?;
        let log = history
            .read()
            .map_err(|e| UploadError::Registry(e.to_string()))?;
        let position = log.position(record_id)?;
        Ok(log.records[position].clone())
    }

    fn list(&self, history_id: &str) -> Result<Vec<OutputRecord>, UploadError> {
        let history = self.history(history_id)?;
        let log = history
            .read()
            .map_err(|e| UploadError::Registry(e.to_string()))?;
        Ok(log.records.clone())
    }

    fn finalize(
        &self,
        history_id: &str,
        record_id: &str,
        outcome: RecordOutcome,
    ) -> Result<OutputRecord, UploadError> {
        let history = self.history(history_id)?;
        let mut log = history
            .write()
            .map_err(|e| UploadError::Registry(e.to_string()))?;
        let position = log.position(record_id)?;
        let record = &mut log.records[position];
        if record.state != RecordState::Pending {
            return Err(UploadError::InvalidTransition {
                from: format!("{:?}", record.state).to_lowercase(),
                to: "finalized".to_string(),
            });
        }
        match outcome {
            RecordOutcome::Ok {
                content,
                parts,
                file_ext,
                genome_build,
            } => {
                record.state = RecordState::Ok;
                record.content = content;
                record.parts = parts;
                record.file_ext = file_ext;
                record.genome_build = genome_build;
            }
            RecordOutcome::Failed { reason } => {
                record.state = RecordState::Failed;
                record.failure = Some(reason);
            }
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }
}
