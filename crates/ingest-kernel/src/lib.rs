//! Upload kernel: request model, content normalization, datatype resolution and batch
//! planning.
//!
//! Everything here is pure and synchronous. Execution, storage of output records and the
//! HTTP surface live in `ingest-runtime`.

pub mod datatypes;
pub mod directives;
pub mod error;
pub mod identity;
pub mod normalize;
pub mod planner;
pub mod request;
pub mod resolver;
pub mod sniff;

pub use datatypes::{
    CompositePart, Datatype, DatatypeKind, DatatypeRegistry, SignatureSniffer, Sniffer,
    AUTO_TYPE, FALLBACK_TYPE,
};
pub use error::UploadError;
pub use identity::{HistoryId, JobId, RecordId, SlotIndex};
pub use normalize::{
    normalize, normalize_with_report, NormalizeOptions, NormalizeReport, PosixLines,
};
pub use planner::{PartPayload, PlannedPart, PlannedUnit, UnitContent, UploadPlan, UploadPlanner};
pub use request::{FileSlot, SlotSource, UploadRequest, MAX_SLOTS};
pub use resolver::{resolve_genome_build, Resolution, Resolver, UNSPECIFIED_GENOME_BUILD};
