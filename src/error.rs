//! Error taxonomy for the preprocessing stages.
//!
//! Stage functions return [`Result`]; the batch driver wraps a failure in a
//! [`StageError`] so the diagnostic names the recording and the stage.
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrepError {
    /// Malformed or incomplete ingestion input.
    #[error("format error: {0}")]
    Format(String),

    /// A channel identifier or label missing from the calibration tables.
    #[error("unknown channel '{0}'")]
    UnknownChannel(String),

    /// Exclusion indices rejected by the artifact isolator.
    #[error("invalid component selection {input:?}: {reason}")]
    InvalidSelection { input: String, reason: String },

    /// Channel set or sampling rate differs between recordings.
    #[error("cannot concatenate recordings: {0}")]
    ConcatenationMismatch(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PrepError>;

/// Pipeline stage names used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Ingest,
    Calibrate,
    Interpolate,
    Filter,
    Decompose,
    Select,
    Reconstruct,
    Checkpoint,
    Concatenate,
    Events,
    Epoch,
    Export,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Ingest => "ingest",
            Stage::Calibrate => "calibrate",
            Stage::Interpolate => "interpolate",
            Stage::Filter => "filter",
            Stage::Decompose => "decompose",
            Stage::Select => "select",
            Stage::Reconstruct => "reconstruct",
            Stage::Checkpoint => "checkpoint",
            Stage::Concatenate => "concatenate",
            Stage::Events => "events",
            Stage::Epoch => "epoch",
            Stage::Export => "export",
        };
        f.write_str(s)
    }
}

/// A [`PrepError`] tagged with the recording and stage it came from.
#[derive(Error, Debug)]
#[error("recording '{recording}' failed at stage {stage}: {source}")]
pub struct StageError {
    pub recording: String,
    pub stage: Stage,
    #[source]
    pub source: PrepError,
}

impl StageError {
    pub fn new(recording: impl Into<String>, stage: Stage, source: PrepError) -> Self {
        Self { recording: recording.into(), stage, source }
    }
}

/// Attach recording/stage context to a stage result.
pub trait StageContext<T> {
    fn at_stage(self, recording: &str, stage: Stage) -> std::result::Result<T, StageError>;
}

impl<T> StageContext<T> for Result<T> {
    fn at_stage(self, recording: &str, stage: Stage) -> std::result::Result<T, StageError> {
        self.map_err(|e| StageError::new(recording, stage, e))
    }
}
