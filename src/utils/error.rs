use thiserror::Error;

#[derive(Error, Debug)]
pub enum IntegrationError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration value: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("NewStore API returned {status}: {body}")]
    NewStoreApiError { status: u16, body: String },

    #[error("CircleCI API error: {message}")]
    CircleCiError { message: String },

    #[error("Storage error: {message}")]
    StorageError { message: String },

    #[error("Queue error: {message}")]
    QueueError { message: String },

    #[error("Table error: {message}")]
    TableError { message: String },

    #[error("Workflow finished with unexpected status '{status}'")]
    WorkflowError { status: String },

    #[error("Git command failed: {message}")]
    GitError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl IntegrationError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    pub fn processing(message: impl Into<String>) -> Self {
        Self::ProcessingError {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::StorageError {
            message: message.into(),
        }
    }

    pub fn queue(message: impl Into<String>) -> Self {
        Self::QueueError {
            message: message.into(),
        }
    }

    pub fn table(message: impl Into<String>) -> Self {
        Self::TableError {
            message: message.into(),
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::ValidationError { .. } => ErrorSeverity::Low,
            Self::HttpError(_) | Self::QueueError { .. } | Self::StorageError { .. } => {
                ErrorSeverity::Medium
            }
            Self::NewStoreApiError { status, .. } if *status >= 500 => ErrorSeverity::Medium,
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::GitError { .. } => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    /// Transport failures and 5xx answers; everything else will fail again
    /// on redelivery.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpError(e) => e.is_timeout() || e.is_connect(),
            Self::NewStoreApiError { status, .. } => *status >= 500,
            Self::QueueError { .. } | Self::StorageError { .. } | Self::TableError { .. } => true,
            _ => false,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, IntegrationError>;
