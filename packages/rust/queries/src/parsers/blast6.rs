//! BLAST tabular output (`-outfmt 6`).
//!
//! Columns: `qseqid sseqid pident length mismatch gapopen qstart qend sstart
//! send evalue bitscore`. The hit score is `pident`; the coordinate is the
//! lower of `sstart`/`send`.

use insertster_shared::{Hit, InsertsterError, Query, Result};

use super::{QueryBuilder, QueryParser, parse_field, tab_reader};

const COLUMNS: usize = 12;

/// BLAST+ / DIAMOND tabular hits.
pub struct Blast6Parser;

impl QueryParser for Blast6Parser {
    fn name(&self) -> &str {
        "blast6"
    }

    fn description(&self) -> &str {
        "BLAST tabular (-outfmt 6), score = percent identity"
    }

    fn parse(&self, input: &str) -> Result<Vec<Query>> {
        let mut builder = QueryBuilder::default();

        for record in tab_reader(input).records() {
            let record = record.map_err(|e| InsertsterError::parse(format!("blast6: {e}")))?;
            if record.iter().all(str::is_empty) {
                continue;
            }
            if record.len() < COLUMNS {
                let line = record.position().map(|p| p.line()).unwrap_or(0);
                return Err(InsertsterError::parse(format!(
                    "blast6 line {line}: expected {COLUMNS} columns, got {}",
                    record.len()
                )));
            }

            let pident: f64 = parse_field(&record, 2, "pident", "blast6")?;
            let sstart: u64 = parse_field(&record, 8, "sstart", "blast6")?;
            let send: u64 = parse_field(&record, 9, "send", "blast6")?;

            builder.push(
                &record[0],
                Hit::new(&record[1], pident).with_coordinate(sstart.min(send)),
            );
        }

        Ok(builder.finish())
    }
}
