//! Ingest stage: reads uploaded tables and validates them into typed records.

pub mod csv_reader;
pub mod dates;
pub mod validator;

pub use csv_reader::{read_raw_table, read_raw_table_from_path};
pub use dates::parse_date;
pub use validator::{RecordValidator, ValidatedTable};
