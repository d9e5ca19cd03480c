//! Identity types for uploads.
//!
//! HistoryId names the collection that owns output records; RecordId addresses a single
//! record inside it; JobId names one submitted batch.

/// Identifies a history (the collection that owns output records).
pub type HistoryId = String;

/// Opaque identifier of an output record within a history.
pub type RecordId = String;

/// Identifies one submitted upload batch.
pub type JobId = String;

/// Zero-based slot index (`files_N`) inside an upload request.
pub type SlotIndex = usize;
