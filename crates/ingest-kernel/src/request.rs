//! Upload request model: one submission made of index-addressed file slots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::UploadError;
use crate::identity::{HistoryId, SlotIndex};
use crate::normalize::{NormalizeOptions, PosixLines};

const REMOTE_SCHEMES: [&str; 3] = ["http://", "https://", "ftp://"];

/// Upper bound on slots per request; slot indices must stay below it.
pub const MAX_SLOTS: usize = 256;

/// Where a slot's content comes from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotSource {
    Paste(String),
    /// Remote reference, fetched by the executor before normalization.
    Url(String),
    FileData(Vec<u8>),
}

impl SlotSource {
    /// Pasted text that looks like a URL becomes a remote reference.
    pub fn from_paste(text: impl Into<String>) -> Self {
        let text = text.into();
        let trimmed = text.trim();
        if REMOTE_SCHEMES
            .iter()
            .any(|scheme| trimmed.starts_with(scheme))
            && !trimmed.contains(char::is_whitespace)
        {
            return SlotSource::Url(trimmed.to_string());
        }
        SlotSource::Paste(text)
    }

    /// Dataset name used when the slot has no `NAME`.
    pub fn default_name(&self) -> String {
        match self {
            SlotSource::Paste(_) => "Pasted Entry".to_string(),
            SlotSource::Url(url) => url.clone(),
            SlotSource::FileData(_) => "Uploaded File".to_string(),
        }
    }
}

/// One `files_N` slot and its per-slot overrides.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSlot {
    pub url_paste: Option<String>,
    pub file_data: Option<Vec<u8>>,
    pub name: Option<String>,
    pub file_type: Option<String>,
    pub genome_build: Option<String>,
    pub to_posix_lines: PosixLines,
    pub space_to_tab: bool,
}

impl FileSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_paste(mut self, text: impl Into<String>) -> Self {
        self.url_paste = Some(text.into());
        self
    }

    pub fn with_file_data(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.file_data = Some(bytes.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_file_type(mut self, file_type: impl Into<String>) -> Self {
        self.file_type = Some(file_type.into());
        self
    }

    pub fn with_genome_build(mut self, genome_build: impl Into<String>) -> Self {
        self.genome_build = Some(genome_build.into());
        self
    }

    pub fn with_posix_lines(mut self, to_posix_lines: PosixLines) -> Self {
        self.to_posix_lines = to_posix_lines;
        self
    }

    pub fn with_space_to_tab(mut self, space_to_tab: bool) -> Self {
        self.space_to_tab = space_to_tab;
        self
    }

    /// Explicit content of this slot, if any. Empty pasted text counts as no content.
    pub fn source(&self, index: SlotIndex) -> Result<Option<SlotSource>, UploadError> {
        let paste = self.url_paste.as_ref().filter(|text| !text.is_empty());
        match (paste, &self.file_data) {
            (Some(_), Some(_)) => Err(UploadError::invalid_slot(
                index,
                "both url_paste and file_data were supplied",
            )),
            (Some(text), None) => Ok(Some(SlotSource::from_paste(text.clone()))),
            (None, Some(bytes)) => Ok(Some(SlotSource::FileData(bytes.clone()))),
            (None, None) => Ok(None),
        }
    }

    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions::new()
            .with_posix_lines(self.to_posix_lines)
            .with_space_to_tab(self.space_to_tab)
    }
}

/// One logical upload submission. Never mutated once handed to the planner.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    pub history_id: HistoryId,
    /// Primary pasted content; feeds slot 0 unless `files_0` has its own content.
    pub primary: Option<String>,
    pub slots: BTreeMap<SlotIndex, FileSlot>,
    /// Declared slot count (`file_count`).
    pub file_count: Option<usize>,
    pub default_type: Option<String>,
    pub default_genome_build: Option<String>,
}

impl UploadRequest {
    pub fn new(history_id: impl Into<HistoryId>) -> Self {
        Self {
            history_id: history_id.into(),
            ..Self::default()
        }
    }

    pub fn with_primary(mut self, content: impl Into<String>) -> Self {
        self.primary = Some(content.into());
        self
    }

    pub fn with_slot(mut self, index: SlotIndex, slot: FileSlot) -> Self {
        self.slots.insert(index, slot);
        self
    }

    pub fn with_file_count(mut self, file_count: usize) -> Self {
        self.file_count = Some(file_count);
        self
    }

    pub fn with_default_type(mut self, file_type: impl Into<String>) -> Self {
        self.default_type = Some(file_type.into());
        self
    }

    pub fn with_default_genome_build(mut self, genome_build: impl Into<String>) -> Self {
        self.default_genome_build = Some(genome_build.into());
        self
    }

    /// Mutable access to slot `index`, creating a default slot on first use.
    pub fn slot_mut(&mut self, index: SlotIndex) -> &mut FileSlot {
        self.slots.entry(index).or_default()
    }

    /// Number of slots to plan: the declared `file_count`, else one past the highest
    /// addressed slot, and never less than one.
    pub fn slot_count(&self) -> usize {
        let addressed = self
            .slots
            .keys()
            .next_back()
            .map_or(0, |max| max.checked_add(1).unwrap_or(usize::MAX));
        self.file_count.unwrap_or(addressed).max(1)
    }

    /// Checks that every addressed slot is below [MAX_SLOTS] and that `file_count`, when
    /// declared, is within bounds and covers every addressed slot.
    pub fn validate(&self) -> Result<(), UploadError> {
        let highest = self.slots.keys().next_back().copied();
        if let Some(index) = highest.filter(|index| *index >= MAX_SLOTS) {
            return Err(UploadError::invalid_slot(
                index,
                format!("slot index exceeds the limit of {} slots", MAX_SLOTS),
            ));
        }
        if let Some(file_count) = self.file_count {
            if file_count == 0 {
                return Err(UploadError::invalid_request(
                    "file_count must be a positive integer",
                ));
            }
            if file_count > MAX_SLOTS {
                return Err(UploadError::invalid_request(format!(
                    "file_count {} exceeds the limit of {} slots",
                    file_count, MAX_SLOTS
                )));
            }
            if let Some(&index) = self.slots.keys().find(|index| **index >= file_count) {
                return Err(UploadError::invalid_slot(
                    index,
                    format!("slot index is outside declared file_count {}", file_count),
                ));
            }
        }
        Ok(())
    }
}
