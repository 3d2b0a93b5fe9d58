use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    InvalidInput,
    NotFound,
    Unsupported,
    Io,
    External,
    Internal,
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("unexpected section with title \"{title}\"")]
    StructuralParse { title: String },

    #[error("invalid design in section '{section}' (row {row}): {message}")]
    InvalidDesign {
        section: String,
        row: usize,
        message: String,
    },

    #[error("could not resolve {entity} reference {reference} (design {design}, row {row})")]
    ReferenceResolution {
        design: usize,
        entity: String,
        row: usize,
        reference: String,
    },

    #[error(
        "not enough source wells for {subject}: {required} required, {available} available"
    )]
    ResourceExhaustion {
        subject: String,
        required: usize,
        available: usize,
    },

    #[error("annealing temperature service failed: {0}")]
    ExternalService(String),

    #[error("missing worksheet '{name}' for step {step}, trial {trial}")]
    MissingWorksheet {
        step: String,
        trial: u32,
        name: String,
    },

    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("invalid well '{0}'")]
    InvalidWell(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
}

impl CompileError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CompileError::StructuralParse { .. }
            | CompileError::InvalidDesign { .. }
            | CompileError::ReferenceResolution { .. }
            | CompileError::InvalidWell(_)
            | CompileError::InvalidInput(_) => ErrorCode::InvalidInput,
            CompileError::MissingWorksheet { .. } => ErrorCode::NotFound,
            CompileError::UnsupportedMethod(_) => ErrorCode::Unsupported,
            CompileError::ExternalService(_) => ErrorCode::External,
            CompileError::Io(_) | CompileError::Csv(_) | CompileError::Zip(_) => ErrorCode::Io,
            CompileError::ResourceExhaustion { .. } | CompileError::Json(_) => {
                ErrorCode::Internal
            }
        }
    }

    pub(crate) fn invalid_design(section: &str, row: usize, message: impl Into<String>) -> Self {
        CompileError::InvalidDesign {
            section: section.to_string(),
            row,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;
