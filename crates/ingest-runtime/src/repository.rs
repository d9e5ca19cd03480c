//! Storage façade for output records.

use ingest_kernel::{HistoryId, RecordId, UploadError};

use super::models::{OutputRecord, RecordOutcome, PRIMARY_PART};

/// Output record repository used by the executor and the HTTP surface.
///
/// Implementations must keep records of one history in append order:
/// - `append_all` assigns contiguous positions to the whole batch atomically, so two
///   batches appended to the same history never interleave.
/// - `finalize` only moves records out of `pending`; finalized records are immutable.
/// - Histories are independent; appends to one never wait on another.
pub trait OutputRepository: Send + Sync {
    /// Creates an empty history and returns its id.
    fn create_history(&self) -> Result<HistoryId, UploadError>;

    /// Removes a history with all its records.
    fn drop_history(&self, history_id: &str) -> Result<(), UploadError>;

    fn has_history(&self, history_id: &str) -> Result<bool, UploadError>;

    /// Appends records in order; returns their ids in the same order.
    fn append_all(
        &self,
        history_id: &str,
        records: Vec<OutputRecord>,
    ) -> Result<Vec<RecordId>, UploadError>;

    fn append(&self, history_id: &str, record: OutputRecord) -> Result<RecordId, UploadError> {
        self.append_all(history_id, vec![record])?
            .pop()
            .ok_or_else(|| UploadError::Registry("append returned no record id".to_string()))
    }

    fn get(&self, history_id: &str, record_id: &str) -> Result<OutputRecord, UploadError>;

    /// Records of a history in position order.
    fn list(&self, history_id: &str) -> Result<Vec<OutputRecord>, UploadError>;

    /// Moves a pending record to `ok` or `failed`.
    fn finalize(
        &self,
        history_id: &str,
        record_id: &str,
        outcome: RecordOutcome,
    ) -> Result<OutputRecord, UploadError>;

    /// Bytes of one named composite part.
    fn get_part(
        &self,
        history_id: &str,
        record_id: &str,
        part_name: &str,
    ) -> Result<Vec<u8>, UploadError> {
        let record = self.get(history_id, record_id)?;
        record
            .parts
            .get(part_name)
            .cloned()
            .ok_or_else(|| UploadError::PartNotFound {
                record_id: record_id.to_string(),
                part: part_name.to_string(),
            })
    }

    /// Primary content when `part` is absent or `primary`, else the named part.
    fn content(
        &self,
        history_id: &str,
        record_id: &str,
        part: Option<&str>,
    ) -> Result<Vec<u8>, UploadError> {
        match part.filter(|name| !name.is_empty() && *name != PRIMARY_PART) {
            Some(name) => self.get_part(history_id, record_id, name),
            None => Ok(self.get(history_id, record_id)?.content),
        }
    }
}
