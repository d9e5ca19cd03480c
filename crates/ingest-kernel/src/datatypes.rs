//! Datatype registry: known output types and the ordered sniffers used for `auto` typing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::sniff;

/// Sentinel requesting content-based type detection.
pub const AUTO_TYPE: &str = "auto";

/// Type assigned when no sniffer matches.
pub const FALLBACK_TYPE: &str = "txt";

/// One named file of a composite datatype.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositePart {
    pub name: String,
    pub optional: bool,
}

impl CompositePart {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: false,
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatatypeKind {
    Text,
    Binary,
    /// Output spanning several named parts, declared in upload slot order.
    Composite { parts: Vec<CompositePart> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datatype {
    pub ext: String,
    pub kind: DatatypeKind,
}

impl Datatype {
    pub fn text(ext: impl Into<String>) -> Self {
        Self {
            ext: ext.into(),
            kind: DatatypeKind::Text,
        }
    }

    pub fn binary(ext: impl Into<String>) -> Self {
        Self {
            ext: ext.into(),
            kind: DatatypeKind::Binary,
        }
    }

    pub fn composite(ext: impl Into<String>, parts: Vec<CompositePart>) -> Self {
        Self {
            ext: ext.into(),
            kind: DatatypeKind::Composite { parts },
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.kind, DatatypeKind::Composite { .. })
    }

    /// Declared parts for composite types; empty otherwise.
    pub fn composite_parts(&self) -> &[CompositePart] {
        match &self.kind {
            DatatypeKind::Composite { parts } => parts,
            _ => &[],
        }
    }
}

/// Content sniffer for one datatype.
pub trait Sniffer: Send + Sync {
    /// Extension assigned when [Sniffer::sniff] matches.
    fn ext(&self) -> &str;

    fn sniff(&self, content: &[u8]) -> bool;
}

/// Sniffer backed by a plain signature function.
pub struct SignatureSniffer {
    ext: &'static str,
    test: fn(&[u8]) -> bool,
}

impl SignatureSniffer {
    pub const fn new(ext: &'static str, test: fn(&[u8]) -> bool) -> Self {
        Self { ext, test }
    }
}

impl Sniffer for SignatureSniffer {
    fn ext(&self) -> &str {
        self.ext
    }

    fn sniff(&self, content: &[u8]) -> bool {
        (self.test)(content)
    }
}

/// Registry of known datatypes plus the sniffers consulted, in order, for `auto` typing.
pub struct DatatypeRegistry {
    datatypes: HashMap<String, Datatype>,
    sniffers: Vec<Box<dyn Sniffer>>,
}

impl DatatypeRegistry {
    /// Empty registry; only [FALLBACK_TYPE] is known.
    pub fn empty() -> Self {
        let mut registry = Self {
            datatypes: HashMap::new(),
            sniffers: Vec::new(),
        };
        registry.register(Datatype::text(FALLBACK_TYPE));
        registry
    }

    /// Registry with the built-in datatypes and sniff order: specific binary formats,
    /// generic binary, then text formats. Anything else falls back to `txt`.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for ext in ["tabular", "fasta", "fastqsanger"] {
            registry.register(Datatype::text(ext));
        }
        for ext in ["rdata", "bam", "sqlite", "pdf", "png", "data"] {
            registry.register(Datatype::binary(ext));
        }
        registry.register(Datatype::composite(
            "velvet",
            vec![
                CompositePart::required("Sequences"),
                CompositePart::required("Roadmaps"),
                CompositePart::optional("Log"),
            ],
        ));

        registry
            .with_sniffer(SignatureSniffer::new("rdata", sniff::is_rdata))
            .with_sniffer(SignatureSniffer::new("bam", sniff::is_bam))
            .with_sniffer(SignatureSniffer::new("sqlite", sniff::is_sqlite))
            .with_sniffer(SignatureSniffer::new("pdf", sniff::is_pdf))
            .with_sniffer(SignatureSniffer::new("png", sniff::is_png))
            .with_sniffer(SignatureSniffer::new("data", sniff::looks_binary))
            .with_sniffer(SignatureSniffer::new("fasta", sniff::is_fasta))
            .with_sniffer(SignatureSniffer::new("fastqsanger", sniff::is_fastq))
            .with_sniffer(SignatureSniffer::new("tabular", sniff::is_tabular))
    }

    pub fn register(&mut self, datatype: Datatype) {
        self.datatypes.insert(datatype.ext.clone(), datatype);
    }

    /// Appends a sniffer after the existing ones.
    pub fn with_sniffer(mut self, sniffer: impl Sniffer + 'static) -> Self {
        self.sniffers.push(Box::new(sniffer));
        self
    }

    pub fn get(&self, ext: &str) -> Option<&Datatype> {
        self.datatypes.get(ext)
    }

    pub fn contains(&self, ext: &str) -> bool {
        self.datatypes.contains_key(ext)
    }

    /// Registered composite datatype for `ext`, if any.
    pub fn composite(&self, ext: &str) -> Option<&Datatype> {
        self.get(ext).filter(|datatype| datatype.is_composite())
    }

    /// Extension of the first sniffer matching `content`, or [FALLBACK_TYPE].
    pub fn sniff(&self, content: &[u8]) -> &str {
        self.sniffers
            .iter()
            .find(|sniffer| sniffer.sniff(content))
            .map(|sniffer| sniffer.ext())
            .unwrap_or(FALLBACK_TYPE)
    }

    /// Known extensions, sorted.
    pub fn extensions(&self) -> Vec<&str> {
        let mut exts: Vec<&str> = self.datatypes.keys().map(String::as_str).collect();
        exts.sort_unstable();
        exts
    }
}

impl Default for DatatypeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
