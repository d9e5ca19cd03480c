//! File type and genome build resolution.

use serde::{Deserialize, Serialize};

use crate::datatypes::{DatatypeRegistry, AUTO_TYPE};
use crate::error::UploadError;

/// Genome build recorded when none was requested.
pub const UNSPECIFIED_GENOME_BUILD: &str = "?";

/// Outcome of resolving one unit's metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub file_ext: String,
    pub genome_build: String,
}

/// Genome builds pass through verbatim; absent or blank becomes [UNSPECIFIED_GENOME_BUILD].
pub fn resolve_genome_build(genome_build: Option<&str>) -> String {
    genome_build
        .map(str::trim)
        .filter(|build| !build.is_empty())
        .unwrap_or(UNSPECIFIED_GENOME_BUILD)
        .to_string()
}

/// True for an absent type or the `auto` sentinel.
pub fn is_auto(explicit_type: Option<&str>) -> bool {
    explicit_type
        .map(str::trim)
        .map_or(true, |ext| ext.is_empty() || ext == AUTO_TYPE)
}

/// Assigns output type and genome build against a [DatatypeRegistry]. Never mutates content.
pub struct Resolver<'a> {
    registry: &'a DatatypeRegistry,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a DatatypeRegistry) -> Self {
        Self { registry }
    }

    /// Resolves a single-file unit.
    ///
    /// An explicit type is used verbatim when registered; `auto` (or no type) sniffs the
    /// content. A composite type here means only the first part was supplied.
    pub fn resolve(
        &self,
        content: &[u8],
        explicit_type: Option<&str>,
        genome_build: Option<&str>,
    ) -> Result<Resolution, UploadError> {
        if is_auto(explicit_type) {
            return Ok(Resolution {
                file_ext: self.registry.sniff(content).to_string(),
                genome_build: resolve_genome_build(genome_build),
            });
        }
        let ext = explicit_type.map(str::trim).unwrap_or_default();
        let datatype = self
            .registry
            .get(ext)
            .ok_or_else(|| UploadError::UnsupportedType(ext.to_string()))?;
        if datatype.is_composite() {
            let first = datatype
                .composite_parts()
                .first()
                .map(|part| part.name.as_str());
            return self.resolve_composite(ext, first.as_slice(), genome_build);
        }
        Ok(Resolution {
            file_ext: datatype.ext.clone(),
            genome_build: resolve_genome_build(genome_build),
        })
    }

    /// Resolves a composite unit given the names of the parts that were gathered.
    pub fn resolve_composite(
        &self,
        ext: &str,
        supplied_parts: &[&str],
        genome_build: Option<&str>,
    ) -> Result<Resolution, UploadError> {
        let datatype = self
            .registry
            .get(ext)
            .ok_or_else(|| UploadError::UnsupportedType(ext.to_string()))?;
        if !datatype.is_composite() {
            return Err(UploadError::UnsupportedType(format!(
                "{} is not a composite datatype",
                ext
            )));
        }
        if let Some(missing) = datatype
            .composite_parts()
            .iter()
            .find(|part| !part.optional && !supplied_parts.contains(&part.name.as_str()))
        {
            return Err(UploadError::MissingCompositePart {
                datatype: ext.to_string(),
                part: missing.name.clone(),
            });
        }
        Ok(Resolution {
            file_ext: datatype.ext.clone(),
            genome_build: resolve_genome_build(genome_build),
        })
    }
}
