//! Upload batch planning: expands one [UploadRequest] into ordered [PlannedUnit]s.
//!
//! Planning is pure and synchronous. Inline content is normalized here; remote content
//! keeps its directives and is normalized by the executor after it is fetched. Any slot
//! error rejects the whole request.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::datatypes::{DatatypeRegistry, AUTO_TYPE};
use crate::error::UploadError;
use crate::identity::{HistoryId, SlotIndex};
use crate::normalize::{normalize_with_report, NormalizeOptions};
use crate::request::{FileSlot, SlotSource, UploadRequest};
use crate::resolver::{is_auto, resolve_genome_build, Resolver};

/// Content of one planned part.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartPayload {
    /// Normalized bytes, ready to be written.
    Ready(Vec<u8>),
    /// Reference still to be fetched and normalized.
    Remote { url: String },
}

/// One input file of a unit, with its own normalization directives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedPart {
    /// Composite part name (`Roadmaps`, ...); `None` for single-file units.
    pub part_name: Option<String>,
    pub slot: SlotIndex,
    pub payload: PartPayload,
    pub options: NormalizeOptions,
    /// Inline content was recognized as binary and left untouched.
    pub binary: bool,
}

impl PlannedPart {
    pub fn is_ready(&self) -> bool {
        matches!(self.payload, PartPayload::Ready(_))
    }

    /// Normalized bytes, when ready.
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.payload {
            PartPayload::Ready(bytes) => Some(bytes),
            PartPayload::Remote { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitContent {
    Single(PlannedPart),
    /// Parts of one composite target, in slot order.
    Composite { parts: Vec<PlannedPart> },
}

/// Resolved unit ready for execution; consumed exactly once by the executor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedUnit {
    /// Output position within the batch.
    pub position: usize,
    pub name: String,
    pub content: UnitContent,
    /// Requested type, or the sniffed type for inline `auto` content. Remote `auto`
    /// content stays `auto` until fetched.
    pub file_type: String,
    pub genome_build: String,
}

impl PlannedUnit {
    pub fn parts(&self) -> &[PlannedPart] {
        match &self.content {
            UnitContent::Single(part) => std::slice::from_ref(part),
            UnitContent::Composite { parts } => parts,
        }
    }

    pub fn part(&self, name: &str) -> Option<&PlannedPart> {
        self.parts()
            .iter()
            .find(|part| part.part_name.as_deref() == Some(name))
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.content, UnitContent::Composite { .. })
    }

    /// True when no part still needs fetching.
    pub fn is_ready(&self) -> bool {
        self.parts().iter().all(PlannedPart::is_ready)
    }
}

/// Ordered output of planning one request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadPlan {
    pub history_id: HistoryId,
    pub units: Vec<PlannedUnit>,
}

impl UploadPlan {
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Slots sharing one composite target.
struct CompositeGroup {
    ext: String,
    name: Option<String>,
    genome_build: String,
    parts: Vec<PlannedPart>,
}

enum Entry {
    Unit(PlannedUnit),
    Group(usize),
}

pub struct UploadPlanner {
    registry: Arc<DatatypeRegistry>,
}

impl UploadPlanner {
    pub fn new(registry: Arc<DatatypeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<DatatypeRegistry> {
        &self.registry
    }

    /// Plans every slot from 0 to `slot_count - 1`.
    pub fn plan(&self, request: &UploadRequest) -> Result<UploadPlan, UploadError> {
        request.validate()?;
        let default_slot = FileSlot::default();
        let mut entries: Vec<Entry> = Vec::new();
        let mut groups: Vec<CompositeGroup> = Vec::new();

        for index in 0..request.slot_count() {
            let slot = request.slots.get(&index).unwrap_or(&default_slot);
            let source = match slot.source(index)? {
                Some(source) => source,
                None if index == 0 => request
                    .primary
                    .clone()
                    .map(SlotSource::from_paste)
                    .unwrap_or_else(|| SlotSource::Paste(String::new())),
                None => SlotSource::Paste(String::new()),
            };
            let requested_type = slot
                .file_type
                .as_deref()
                .or(request.default_type.as_deref())
                .unwrap_or(AUTO_TYPE)
                .trim()
                .to_string();
            let genome_build = resolve_genome_build(
                slot.genome_build
                    .as_deref()
                    .or(request.default_genome_build.as_deref()),
            );
            let name = slot.name.clone();
            let part = plan_part(index, &source, slot.normalize_options());

            if let Some(datatype) = self.registry.composite(&requested_type) {
                let group_index = match groups
                    .iter()
                    .position(|group| group.ext == datatype.ext && group.name == name)
                {
                    Some(existing) => existing,
                    None => {
                        groups.push(CompositeGroup {
                            ext: datatype.ext.clone(),
                            name,
                            genome_build,
                            parts: Vec::new(),
                        });
                        entries.push(Entry::Group(groups.len() - 1));
                        groups.len() - 1
                    }
                };
                let group = &mut groups[group_index];
                let declared = datatype.composite_parts();
                let Some(declared_part) = declared.get(group.parts.len()) else {
                    return Err(UploadError::invalid_slot(
                        index,
                        format!(
                            "composite datatype '{}' declares only {} parts",
                            datatype.ext,
                            declared.len()
                        ),
                    ));
                };
                group.parts.push(PlannedPart {
                    part_name: Some(declared_part.name.clone()),
                    ..part
                });
                continue;
            }

            let file_type = match (&part.payload, is_auto(Some(&requested_type))) {
                (PartPayload::Ready(bytes), true) => self.registry.sniff(bytes).to_string(),
                (PartPayload::Remote { .. }, true) => AUTO_TYPE.to_string(),
                (_, false) => requested_type,
            };
            entries.push(Entry::Unit(PlannedUnit {
                position: 0,
                name: name.unwrap_or_else(|| source.default_name()),
                content: UnitContent::Single(part),
                file_type,
                genome_build,
            }));
        }

        let mut groups: Vec<Option<CompositeGroup>> = groups.into_iter().map(Some).collect();
        let mut units = Vec::with_capacity(entries.len());
        for (position, entry) in entries.into_iter().enumerate() {
            let mut unit = match entry {
                Entry::Unit(unit) => unit,
                Entry::Group(group_index) => {
                    let group = groups[group_index].take().ok_or_else(|| {
                        UploadError::invalid_request("composite group planned twice")
                    })?;
                    PlannedUnit {
                        position,
                        name: group.name.unwrap_or_else(|| {
                            format!("Uploaded Composite Dataset ({})", group.ext)
                        }),
                        content: UnitContent::Composite { parts: group.parts },
                        file_type: group.ext,
                        genome_build: group.genome_build,
                    }
                }
            };
            unit.position = position;
            units.push(unit);
        }

        log::debug!(
            "upload_plan history_id={} slots={} units={}",
            request.history_id,
            request.slot_count(),
            units.len()
        );
        Ok(UploadPlan {
            history_id: request.history_id.clone(),
            units,
        })
    }

    /// Resolver bound to this planner's registry.
    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.registry)
    }
}

fn plan_part(slot: SlotIndex, source: &SlotSource, options: NormalizeOptions) -> PlannedPart {
    let (payload, binary) = match source {
        SlotSource::Paste(text) => ready(text.as_bytes(), options),
        SlotSource::FileData(bytes) => ready(bytes, options),
        SlotSource::Url(url) => (PartPayload::Remote { url: url.clone() }, false),
    };
    PlannedPart {
        part_name: None,
        slot,
        payload,
        options,
        binary,
    }
}

fn ready(content: &[u8], options: NormalizeOptions) -> (PartPayload, bool) {
    let (bytes, report) = normalize_with_report(content, options);
    (PartPayload::Ready(bytes), report.binary)
}
