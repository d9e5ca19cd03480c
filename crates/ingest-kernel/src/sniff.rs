//! Content signature checks used by the datatype sniffers and the normalizer.
//!
//! All checks look at a bounded prefix; gzip payloads are only decompressed far enough to
//! read a format header.

use std::io::Read;

use flate2::read::GzDecoder;

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const BZIP2_MAGIC: &[u8] = b"BZh";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const XZ_MAGIC: &[u8] = &[0xfd, b'7', b'z', b'X', b'Z', 0x00];
const SQLITE_MAGIC: &[u8] = b"SQLite format 3\0";
const PDF_MAGIC: &[u8] = b"%PDF-";
const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];
const BAM_MAGIC: &[u8] = b"BAM\x01";
const RDATA_HEADERS: [&[u8]; 4] = [b"RDX2\n", b"RDX3\n", b"RDA2\n", b"RDA3\n"];

/// Bytes inspected by the text heuristics.
pub const SNIFF_PREFIX_BYTES: usize = 64 * 1024;

/// Bytes inspected when looking for NULs or broken UTF-8.
const BINARY_PROBE_BYTES: usize = 1024;

fn prefix(content: &[u8], limit: usize) -> &[u8] {
    &content[..content.len().min(limit)]
}

pub fn is_gzip(content: &[u8]) -> bool {
    content.starts_with(GZIP_MAGIC)
}

/// Reads up to `len` decompressed bytes from a gzip payload. Truncated or corrupt streams
/// yield whatever could be decoded.
pub fn gzip_header(content: &[u8], len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    let _ = GzDecoder::new(content).take(len as u64).read_to_end(&mut out);
    out
}

pub fn is_rdata(content: &[u8]) -> bool {
    let matches_header = |header: &[u8]| RDATA_HEADERS.iter().any(|h| header.starts_with(h));
    if is_gzip(content) {
        return matches_header(&gzip_header(content, 5));
    }
    content.starts_with(b"RDX2\n") || content.starts_with(b"RDX3\n")
}

pub fn is_bam(content: &[u8]) -> bool {
    is_gzip(content) && gzip_header(content, BAM_MAGIC.len()) == BAM_MAGIC
}

pub fn is_sqlite(content: &[u8]) -> bool {
    content.starts_with(SQLITE_MAGIC)
}

pub fn is_pdf(content: &[u8]) -> bool {
    content.starts_with(PDF_MAGIC)
}

pub fn is_png(content: &[u8]) -> bool {
    content.starts_with(PNG_MAGIC)
}

fn has_compression_magic(content: &[u8]) -> bool {
    is_gzip(content)
        || content.starts_with(BZIP2_MAGIC)
        || content.starts_with(ZIP_MAGIC)
        || content.starts_with(XZ_MAGIC)
}

/// True when the content must be treated as an opaque binary payload: a known binary or
/// compressed signature, a NUL byte, or a prefix that is not valid UTF-8.
pub fn looks_binary(content: &[u8]) -> bool {
    if has_compression_magic(content)
        || is_sqlite(content)
        || is_pdf(content)
        || is_png(content)
        || is_rdata(content)
    {
        return true;
    }
    let probe = prefix(content, BINARY_PROBE_BYTES);
    if probe.contains(&0) {
        return true;
    }
    match std::str::from_utf8(probe) {
        Ok(_) => false,
        // error_len() == None means the probe cut a multi-byte character in half.
        Err(e) => e.error_len().is_some(),
    }
}

/// Complete lines of the sniffing prefix. A trailing partial line is dropped when the
/// content was cut by the prefix limit.
fn prefix_lines(content: &[u8]) -> Vec<String> {
    let probe = prefix(content, SNIFF_PREFIX_BYTES);
    let text = String::from_utf8_lossy(probe);
    let mut lines: Vec<String> = text
        .split('\n')
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect();
    if content.len() > probe.len() {
        lines.pop();
    }
    lines
}

pub fn is_fasta(content: &[u8]) -> bool {
    let lines = prefix_lines(content);
    let mut iter = lines.iter().filter(|line| !line.trim().is_empty());
    match iter.next() {
        Some(header) if header.starts_with('>') => {}
        _ => return false,
    }
    let mut saw_sequence = false;
    for line in iter {
        if line.starts_with('>') {
            continue;
        }
        let valid = line
            .trim()
            .chars()
            .all(|c| c.is_ascii_alphabetic() || c == '-' || c == '*');
        if !valid {
            return false;
        }
        saw_sequence = true;
    }
    saw_sequence
}

pub fn is_fastq(content: &[u8]) -> bool {
    let lines: Vec<String> = prefix_lines(content)
        .into_iter()
        .filter(|line| !line.is_empty())
        .collect();
    if lines.len() < 4 {
        return false;
    }
    lines.chunks(4).filter(|chunk| chunk.len() == 4).all(|record| {
        record[0].starts_with('@')
            && record[2].starts_with('+')
            && !record[1].is_empty()
            && record[1].len() == record[3].len()
    })
}

/// Every non-blank, non-comment line has the same number (at least two) of tab-separated
/// columns.
pub fn is_tabular(content: &[u8]) -> bool {
    let mut columns: Option<usize> = None;
    for line in prefix_lines(content) {
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let count = line.split('\t').count();
        if count < 2 {
            return false;
        }
        match columns {
            Some(expected) if expected != count => return false,
            Some(_) => {}
            None => columns = Some(count),
        }
    }
    columns.is_some()
}
