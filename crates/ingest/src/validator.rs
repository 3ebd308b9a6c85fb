//! Schema validation and type coercion of raw uploaded tables.

use crate::dates::parse_date;
use influencer_core::config::{DateFormat, IngestConfig};
use influencer_core::{
    PayoutBasis, PipelineResult, RawTable, Record, RowRejection, SchemaError, REQUIRED_COLUMNS,
};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Outcome of validating a raw table: the typed records plus every row that
/// had to be excluded.
#[derive(Debug, Clone, Serialize)]
pub struct ValidatedTable {
    pub records: Vec<Record>,
    pub rejected: Vec<RowRejection>,
    pub total_rows: usize,
}

impl ValidatedTable {
    /// Distinct 1-based row numbers that were excluded.
    pub fn rejected_rows(&self) -> Vec<usize> {
        let mut rows: Vec<usize> = self.rejected.iter().map(|r| r.row).collect();
        rows.dedup();
        rows
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected_rows().len()
    }
}

/// Column positions of the required fields within the uploaded header.
struct ColumnIndex([usize; 14]);

impl ColumnIndex {
    fn resolve(columns: &[String]) -> Result<Self, SchemaError> {
        let normalized: Vec<String> = columns
            .iter()
            .map(|c| c.trim().to_ascii_lowercase())
            .collect();

        let mut error = SchemaError::default();
        let mut positions = [0usize; 14];
        for (slot, required) in REQUIRED_COLUMNS.iter().enumerate() {
            let mut hits = normalized
                .iter()
                .enumerate()
                .filter(|(_, c)| c.as_str() == *required)
                .map(|(i, _)| i);
            match (hits.next(), hits.next()) {
                (None, _) => error.missing.push(required.to_string()),
                (Some(_), Some(_)) => error.duplicated.push(required.to_string()),
                (Some(i), None) => positions[slot] = i,
            }
        }

        if error.is_empty() {
            Ok(Self(positions))
        } else {
            Err(error)
        }
    }

    fn cell<'a>(&self, row: &'a [String], column: &str) -> &'a str {
        let slot = REQUIRED_COLUMNS
            .iter()
            .position(|c| *c == column)
            .unwrap_or_default();
        row.get(self.0[slot]).map(String::as_str).unwrap_or("")
    }
}

/// Checks an uploaded table against the fixed record schema.
pub struct RecordValidator {
    date_format: DateFormat,
}

impl RecordValidator {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            date_format: config.date_format,
        }
    }

    pub fn with_date_format(date_format: DateFormat) -> Self {
        Self { date_format }
    }

    /// Validate every row. Header problems are fatal; cell problems only
    /// exclude the affected row.
    pub fn validate(&self, table: &RawTable) -> PipelineResult<ValidatedTable> {
        let index = ColumnIndex::resolve(&table.columns).map_err(|e| {
            warn!(error = %e, "Uploaded table does not match the required schema");
            e
        })?;

        let mut records = Vec::with_capacity(table.rows.len());
        let mut rejected = Vec::new();

        for (i, row) in table.rows.iter().enumerate() {
            let row_no = i + 1;
            if row.len() != table.columns.len() {
                rejected.push(RowRejection {
                    row: row_no,
                    column: "*".to_string(),
                    value: format!("{} cells", row.len()),
                    reason: format!("expected {} cells", table.columns.len()),
                });
                continue;
            }
            match self.coerce_row(&index, row, row_no) {
                Ok(record) => records.push(record),
                Err(mut issues) => rejected.append(&mut issues),
            }
        }

        let validated = ValidatedTable {
            records,
            rejected,
            total_rows: table.rows.len(),
        };

        metrics::counter!("ingest.rows_valid").increment(validated.records.len() as u64);
        metrics::counter!("ingest.rows_rejected").increment(validated.rejected_count() as u64);

        if validated.rejected.is_empty() {
            info!(rows = validated.total_rows, "Table validated");
        } else {
            warn!(
                rows = validated.total_rows,
                valid = validated.records.len(),
                rejected = validated.rejected_count(),
                "Table validated with rejected rows"
            );
            for issue in &validated.rejected {
                debug!(%issue, "Row rejected");
            }
        }

        Ok(validated)
    }

    fn coerce_row(
        &self,
        index: &ColumnIndex,
        row: &[String],
        row_no: usize,
    ) -> Result<Record, Vec<RowRejection>> {
        let mut cursor = RowCursor {
            index,
            row,
            row_no,
            issues: Vec::new(),
        };

        let date = cursor.field("date", |c| parse_date(c, self.date_format));
        let name = cursor.field("name", parse_text);
        let platform = cursor.field("platform", parse_text);
        let campaign = cursor.field("campaign", parse_text);
        let category = cursor.field("category", parse_text);
        let gender = cursor.field("gender", parse_text);
        let reach = cursor.field("reach", parse_count);
        let followers = cursor.field("followers", parse_count);
        let likes = cursor.field("likes", parse_count);
        let comments = cursor.field("comments", parse_count);
        let orders = cursor.field("orders", parse_count);
        let revenue = cursor.field("revenue", parse_money);
        let total_payout = cursor.field("total_payout", parse_money);
        let basis = cursor.field("basis", parse_basis);

        let (
            Some(date),
            Some(name),
            Some(platform),
            Some(campaign),
            Some(category),
            Some(gender),
            Some(reach),
            Some(followers),
            Some(likes),
            Some(comments),
            Some(orders),
            Some(revenue),
            Some(total_payout),
            Some(basis),
        ) = (
            date, name, platform, campaign, category, gender, reach, followers, likes, comments,
            orders, revenue, total_payout, basis,
        )
        else {
            return Err(cursor.issues);
        };

        Ok(Record {
            date,
            name,
            platform,
            campaign,
            category,
            gender,
            reach,
            followers,
            likes,
            comments,
            orders,
            revenue,
            total_payout,
            basis,
        })
    }
}

/// Reads the cells of one row, collecting a rejection per failed coercion.
struct RowCursor<'a> {
    index: &'a ColumnIndex,
    row: &'a [String],
    row_no: usize,
    issues: Vec<RowRejection>,
}

impl RowCursor<'_> {
    fn field<T>(&mut self, column: &str, parse: impl FnOnce(&str) -> Result<T, String>) -> Option<T> {
        let cell = self.index.cell(self.row, column);
        match parse(cell) {
            Ok(value) => Some(value),
            Err(reason) => {
                self.issues.push(RowRejection {
                    row: self.row_no,
                    column: column.to_string(),
                    value: cell.to_string(),
                    reason,
                });
                None
            }
        }
    }
}

fn parse_text(cell: &str) -> Result<String, String> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        Err("empty value".to_string())
    } else {
        Ok(trimmed.to_string())
    }
}

/// Non-negative integer count. Integral decimals such as `1000.0` are accepted.
fn parse_count(cell: &str) -> Result<u64, String> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return Err("empty value".to_string());
    }
    if let Ok(n) = trimmed.parse::<u64>() {
        return Ok(n);
    }
    let value: f64 = trimmed
        .parse()
        .map_err(|_| "not a number".to_string())?;
    if !value.is_finite() {
        Err("not a finite number".to_string())
    } else if value < 0.0 {
        Err("negative count".to_string())
    } else if value.fract() != 0.0 {
        Err("fractional count".to_string())
    } else if value > u64::MAX as f64 {
        Err("count out of range".to_string())
    } else {
        Ok(value as u64)
    }
}

fn parse_money(cell: &str) -> Result<f64, String> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return Err("empty value".to_string());
    }
    let value: f64 = trimmed
        .parse()
        .map_err(|_| "not a number".to_string())?;
    if !value.is_finite() {
        Err("not a finite number".to_string())
    } else if value < 0.0 {
        Err("negative amount".to_string())
    } else {
        Ok(value)
    }
}

fn parse_basis(cell: &str) -> Result<PayoutBasis, String> {
    let normalized = cell.trim().to_ascii_lowercase().replace(['_', ' '], "-");
    match normalized.as_str() {
        "post" | "per-post" => Ok(PayoutBasis::PerPost),
        "order" | "per-order" => Ok(PayoutBasis::PerOrder),
        "" => Err("empty value".to_string()),
        _ => Err("expected per-post or per-order".to_string()),
    }
}
