use thiserror::Error;

#[derive(Error, Debug)]
pub enum DflowError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unsupported message platform type: \"{0}\"")]
    UnsupportedPlatform(String),

    #[error("Unsupported event: {0}")]
    UnsupportedEvent(String),

    #[error("Signature validation failed")]
    InvalidSignature,

    #[error("Intent resolution failed: {0}")]
    Resolution(String),

    #[error("Message delivery failed: {0}")]
    Delivery(String),

    #[error("Flow execution failed: {0}")]
    FlowExecution(String),

    #[error("Parameter error: {0}")]
    Parameter(#[from] ParameterError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to turn a raw value into a skill parameter. Always local to one parameter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParameterError {
    #[error("Unknown parameter: {0}")]
    Unknown(String),

    #[error("Empty value for parameter {0}")]
    Empty(String),

    #[error("Invalid value for parameter {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// Coarse classification of [`DflowError`], carried by failed flow outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    UnsupportedPlatform,
    UnsupportedEvent,
    InvalidSignature,
    Resolution,
    Delivery,
    FlowExecution,
}

impl DflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DflowError::Configuration(_) => ErrorKind::Configuration,
            DflowError::UnsupportedPlatform(_) => ErrorKind::UnsupportedPlatform,
            DflowError::UnsupportedEvent(_) => ErrorKind::UnsupportedEvent,
            DflowError::InvalidSignature => ErrorKind::InvalidSignature,
            DflowError::Resolution(_) => ErrorKind::Resolution,
            DflowError::Delivery(_) => ErrorKind::Delivery,
            DflowError::FlowExecution(_)
            | DflowError::Parameter(_)
            | DflowError::Json(_)
            | DflowError::Io(_) => ErrorKind::FlowExecution,
        }
    }

    /// Whether a turn hitting this error should be dropped rather than failed.
    pub fn is_drop(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::UnsupportedEvent | ErrorKind::UnsupportedPlatform
        )
    }
}

pub type Result<T> = std::result::Result<T, DflowError>;
