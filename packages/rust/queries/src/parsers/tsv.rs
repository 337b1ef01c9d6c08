//! Plain tab-separated hits: `query<TAB>subject<TAB>score[<TAB>coordinate]`.

use insertster_shared::{Hit, InsertsterError, Query, Result};

use super::{QueryBuilder, QueryParser, parse_field, tab_reader};

/// Minimal tabular format; `#` starts a comment line.
pub struct TsvParser;

impl QueryParser for TsvParser {
    fn name(&self) -> &str {
        "tsv"
    }

    fn description(&self) -> &str {
        "query<TAB>subject<TAB>score[<TAB>coordinate]"
    }

    fn parse(&self, input: &str) -> Result<Vec<Query>> {
        let mut builder = QueryBuilder::default();

        for record in tab_reader(input).records() {
            let record = record.map_err(|e| InsertsterError::parse(format!("tsv: {e}")))?;
            if record.iter().all(str::is_empty) {
                continue;
            }
            if record.len() < 3 {
                let line = record.position().map(|p| p.line()).unwrap_or(0);
                return Err(InsertsterError::parse(format!(
                    "tsv line {line}: expected at least 3 columns, got {}",
                    record.len()
                )));
            }

            let score: f64 = parse_field(&record, 2, "score", "tsv")?;
            let mut hit = Hit::new(&record[1], score);
            if record.get(3).is_some_and(|c| !c.is_empty()) {
                hit = hit.with_coordinate(parse_field(&record, 3, "coordinate", "tsv")?);
            }
            builder.push(&record[0], hit);
        }

        Ok(builder.finish())
    }
}
