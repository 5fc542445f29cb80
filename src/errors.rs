use thiserror::Error;

/// The error taxonomy for every stage of the pipeline. Every fallible path in
/// this crate returns one of these variants; call sites that need file- or
/// stage-level context wrap the `Result` in `anyhow::Context` instead of
/// inventing a new error type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Parse error on line {line}: {reason} (line content: {content:?})")]
    Parse {
        line: usize,
        reason: String,
        content: String,
    },

    #[error("Range error on line {line}: {reason} (line content: {content:?})")]
    Range {
        line: usize,
        reason: String,
        content: String,
    },

    #[error("Shape error on line {line}: {reason} (line content: {content:?})")]
    Shape {
        line: usize,
        reason: String,
        content: String,
    },

    #[error("Width error on line {line}: {reason} (line content: {content:?})")]
    Width {
        line: usize,
        reason: String,
        content: String,
    },

    #[error("Resolution error on line {line}: undefined label {label:?}")]
    Resolution { line: usize, label: String },

    #[error("Structural error: {reason}")]
    Structural { reason: String },
}

impl PipelineError {
    pub fn parse(line: usize, content: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::Parse {
            line,
            reason: reason.into(),
            content: content.into(),
        }
    }

    pub fn range(line: usize, content: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::Range {
            line,
            reason: reason.into(),
            content: content.into(),
        }
    }

    pub fn shape(line: usize, content: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::Shape {
            line,
            reason: reason.into(),
            content: content.into(),
        }
    }

    pub fn width(line: usize, content: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::Width {
            line,
            reason: reason.into(),
            content: content.into(),
        }
    }

    pub fn resolution(line: usize, label: impl Into<String>) -> Self {
        PipelineError::Resolution {
            line,
            label: label.into(),
        }
    }

    pub fn structural(reason: impl Into<String>) -> Self {
        PipelineError::Structural {
            reason: reason.into(),
        }
    }
}
