//! SAM alignments.
//!
//! Each mapped record becomes a hit against its `RNAME`; the score is the
//! percent identity of the aligned block, derived from the CIGAR string and
//! the `NM:i:` edit-distance tag. Unmapped records register the query with
//! no hits.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use insertster_shared::{Hit, InsertsterError, Query, Result};

use super::{QueryBuilder, QueryParser};

/// Mandatory SAM columns.
const MANDATORY_FIELDS: usize = 11;

/// Flag bit marking an unmapped segment.
const FLAG_UNMAPPED: u32 = 0x4;

/// One CIGAR operation: `<len><op>`.
static CIGAR_OP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)([MIDNSHP=X])").expect("CIGAR regex"));

/// Whole-string CIGAR validation.
static CIGAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+[MIDNSHP=X])+$").expect("CIGAR validation regex"));

/// SAM records from any short- or long-read aligner.
pub struct SamParser;

impl QueryParser for SamParser {
    fn name(&self) -> &str {
        "sam"
    }

    fn description(&self) -> &str {
        "SAM alignments, score = percent identity from CIGAR and NM"
    }

    fn parse(&self, input: &str) -> Result<Vec<Query>> {
        let mut builder = QueryBuilder::default();

        for (i, line) in input.lines().enumerate() {
            let line_no = i + 1;
            if line.is_empty() || line.starts_with('@') {
                continue;
            }

            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < MANDATORY_FIELDS {
                return Err(InsertsterError::parse(format!(
                    "sam line {line_no}: expected at least {MANDATORY_FIELDS} fields, got {}",
                    fields.len()
                )));
            }

            let qname = fields[0];
            let flag: u32 = fields[1].parse().map_err(|_| {
                InsertsterError::parse(format!("sam line {line_no}: invalid FLAG '{}'", fields[1]))
            })?;
            let rname = fields[2];
            let cigar = fields[5];

            let query = builder.entry(qname);
            if query.sequence.is_none() && fields[9] != "*" {
                query.sequence = Some(fields[9].to_string());
            }

            if flag & FLAG_UNMAPPED != 0 || rname == "*" || cigar == "*" {
                debug!(qname, line = line_no, "skipping unmapped record");
                continue;
            }

            let pos: u64 = fields[3].parse().map_err(|_| {
                InsertsterError::parse(format!("sam line {line_no}: invalid POS '{}'", fields[3]))
            })?;
            let edit_distance = nm_tag(&fields[MANDATORY_FIELDS..], line_no)?;
            let identity = percent_identity(cigar, edit_distance)
                .map_err(|msg| InsertsterError::parse(format!("sam line {line_no}: {msg}")))?;

            builder.push(qname, Hit::new(rname, identity).with_coordinate(pos));
        }

        Ok(builder.finish())
    }
}

/// Extract the `NM:i:` tag, if present.
fn nm_tag(tags: &[&str], line_no: usize) -> Result<Option<u64>> {
    for tag in tags {
        if let Some(value) = tag.strip_prefix("NM:i:") {
            let nm = value.parse().map_err(|_| {
                InsertsterError::parse(format!("sam line {line_no}: invalid NM tag '{tag}'"))
            })?;
            return Ok(Some(nm));
        }
    }
    Ok(None)
}

/// Percent identity over the aligned columns (`M`, `=`, `X`, `I`, `D`).
///
/// With `=`/`X` operations the matches are counted directly. Otherwise the
/// mismatches inside `M` blocks are `NM - I - D`; a missing `NM` tag counts
/// every `M` column as a match.
fn percent_identity(cigar: &str, edit_distance: Option<u64>) -> std::result::Result<f64, String> {
    if !CIGAR_RE.is_match(cigar) {
        return Err(format!("invalid CIGAR '{cigar}'"));
    }

    let (mut m, mut eq, mut x, mut ins, mut del) = (0u64, 0u64, 0u64, 0u64, 0u64);
    for caps in CIGAR_OP_RE.captures_iter(cigar) {
        let len: u64 = caps[1]
            .parse()
            .map_err(|_| format!("CIGAR length overflow in '{cigar}'"))?;
        match &caps[2] {
            "M" => m += len,
            "=" => eq += len,
            "X" => x += len,
            "I" => ins += len,
            "D" => del += len,
            _ => {}
        }
    }

    let aligned = m + eq + x + ins + del;
    if aligned == 0 {
        return Err(format!("CIGAR '{cigar}' has no aligned columns"));
    }

    let matches = if eq + x > 0 {
        eq
    } else {
        let mismatches = edit_distance.unwrap_or(0).saturating_sub(ins + del);
        m.saturating_sub(mismatches)
    };

    Ok(100.0 * matches as f64 / aligned as f64)
}
