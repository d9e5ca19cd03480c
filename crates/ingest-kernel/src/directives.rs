//! Flat `files_N|field` directive maps, as posted by upload tool forms, parsed into an
//! [UploadRequest].

use base64::Engine;
use serde_json::{Map, Value};

use crate::error::UploadError;
use crate::identity::{HistoryId, SlotIndex};
use crate::normalize::PosixLines;
use crate::request::{UploadRequest, MAX_SLOTS};

const SLOT_PREFIX: &str = "files_";
const UPLOAD_DATASET: &str = "upload_dataset";

/// Textual form of a directive value; `None` for null.
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn non_empty(value: &Value) -> Option<String> {
    value_text(value)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        other => value_text(other)
            .map(|text| {
                matches!(
                    text.trim().to_ascii_lowercase().as_str(),
                    "yes" | "true" | "1" | "on"
                )
            })
            .unwrap_or(false),
    }
}

/// Splits `files_3|NAME` into `(3, "NAME")`. Keys without the slot prefix yield `None`.
fn split_slot_key(key: &str) -> Result<Option<(SlotIndex, &str)>, UploadError> {
    let Some(rest) = key.strip_prefix(SLOT_PREFIX) else {
        return Ok(None);
    };
    let Some((index, field)) = rest.split_once('|') else {
        return Ok(None);
    };
    let index = index.parse::<SlotIndex>().map_err(|_| {
        UploadError::invalid_request(format!("'{}' does not name a numeric slot index", key))
    })?;
    if index >= MAX_SLOTS {
        return Err(UploadError::invalid_slot(
            index,
            format!("slot index exceeds the limit of {} slots", MAX_SLOTS),
        ));
    }
    Ok(Some((index, field)))
}

fn parse_file_count(value: &Value) -> Result<usize, UploadError> {
    let invalid = || UploadError::invalid_request("file_count must be a positive integer");
    let text = value_text(value).ok_or_else(invalid)?;
    match text.trim().parse::<usize>() {
        Ok(count) if count > MAX_SLOTS => Err(UploadError::invalid_request(format!(
            "file_count {} exceeds the limit of {} slots",
            count, MAX_SLOTS
        ))),
        Ok(count) if count > 0 => Ok(count),
        _ => Err(invalid()),
    }
}

impl UploadRequest {
    /// Builds a request from flat tool inputs.
    ///
    /// Recognized keys: `url_paste`, `file_count`, `file_type`, `dbkey`, and per slot
    /// `files_N|url_paste`, `files_N|file_data` (base64), `files_N|NAME`,
    /// `files_N|file_type`, `files_N|dbkey`, `files_N|to_posix_lines`,
    /// `files_N|space_to_tab`, `files_N|type`. Other keys are ignored.
    pub fn from_directives(
        history_id: impl Into<HistoryId>,
        inputs: &Map<String, Value>,
    ) -> Result<Self, UploadError> {
        let mut request = UploadRequest::new(history_id);

        for (key, value) in inputs {
            match key.as_str() {
                "url_paste" => request.primary = value_text(value),
                "file_count" => request.file_count = Some(parse_file_count(value)?),
                "file_type" => request.default_type = non_empty(value),
                "dbkey" => request.default_genome_build = non_empty(value),
                _ => {}
            }

            let Some((index, field)) = split_slot_key(key)? else {
                continue;
            };
            match field {
                "url_paste" => request.slot_mut(index).url_paste = value_text(value),
                "file_data" => {
                    let Some(encoded) = non_empty(value) else {
                        continue;
                    };
                    let bytes = base64::engine::general_purpose::STANDARD
                        .decode(encoded.as_bytes())
                        .map_err(|e| {
                            UploadError::invalid_slot(
                                index,
                                format!("invalid base64 file_data: {}", e),
                            )
                        })?;
                    request.slot_mut(index).file_data = Some(bytes);
                }
                "NAME" => request.slot_mut(index).name = non_empty(value),
                "file_type" => request.slot_mut(index).file_type = non_empty(value),
                "dbkey" => request.slot_mut(index).genome_build = non_empty(value),
                "to_posix_lines" => {
                    request.slot_mut(index).to_posix_lines = if is_truthy(value) {
                        PosixLines::Enabled
                    } else {
                        PosixLines::Disabled
                    };
                }
                "space_to_tab" => request.slot_mut(index).space_to_tab = is_truthy(value),
                "type" => {
                    let kind = value_text(value).unwrap_or_default();
                    if kind != UPLOAD_DATASET {
                        return Err(UploadError::invalid_slot(
                            index,
                            format!("unsupported slot type '{}'", kind),
                        ));
                    }
                    request.slot_mut(index);
                }
                _ => {}
            }
        }

        request.validate()?;
        Ok(request)
    }
}
