use std::fmt;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Schema error: {0}")]
    Schema(SchemaError),

    /// A record reached metric computation with a value the validator should
    /// have rejected.
    #[error("Computation invariant violated at record {row}, field '{field}': {reason}")]
    ComputationInvariant {
        row: usize,
        field: &'static str,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Header-level problems that block the whole ingest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaError {
    pub missing: Vec<String>,
    pub duplicated: Vec<String>,
}

impl SchemaError {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.duplicated.is_empty()
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!("missing columns [{}]", self.missing.join(", ")));
        }
        if !self.duplicated.is_empty() {
            parts.push(format!(
                "duplicated columns [{}]",
                self.duplicated.join(", ")
            ));
        }
        f.write_str(&parts.join("; "))
    }
}

impl From<SchemaError> for PipelineError {
    fn from(err: SchemaError) -> Self {
        PipelineError::Schema(err)
    }
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::Config(err.to_string())
    }
}
