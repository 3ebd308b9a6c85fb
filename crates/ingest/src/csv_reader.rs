//! CSV adapter that turns uploaded bytes into a [`RawTable`]. Typing and
//! schema checks are left to the validator.

use influencer_core::{PipelineError, PipelineResult, RawTable};
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Read a header row plus data rows from any CSV source. Rows of uneven
/// length are kept as-is so the validator can report them.
pub fn read_raw_table<R: Read>(reader: R) -> PipelineResult<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let columns: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut table = RawTable::new(columns);
    for result in reader.records() {
        let record = result.map_err(csv_error)?;
        table.push_row(record.iter());
    }

    debug!(
        columns = table.columns.len(),
        rows = table.len(),
        "CSV table read"
    );
    Ok(table)
}

pub fn read_raw_table_from_path(path: &Path) -> PipelineResult<RawTable> {
    let file = std::fs::File::open(path)?;
    read_raw_table(file)
}

fn csv_error(err: csv::Error) -> PipelineError {
    PipelineError::Csv(err.to_string())
}
