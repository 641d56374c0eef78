use thiserror::Error;

#[derive(Error, Debug)]
pub enum HotspotError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("API returned {status} for {url}")]
    ApiStatusError { status: u16, url: String },

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Image encoding error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Unknown country: {query}")]
    LookupError { query: String },

    #[error("Boundary error: {message}")]
    BoundaryError { message: String },

    #[error("Projection error: {message}")]
    ProjectionError { message: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

pub type Result<T> = std::result::Result<T, HotspotError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Configuration,
    Data,
    Geometry,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    /// 對應 CLI 的退出碼
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

impl HotspotError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            HotspotError::ApiError(_) | HotspotError::ApiStatusError { .. } => {
                ErrorCategory::Network
            }
            HotspotError::ConfigError { .. }
            | HotspotError::ConfigValidationError { .. }
            | HotspotError::InvalidConfigValueError { .. }
            | HotspotError::MissingConfigError { .. }
            | HotspotError::LookupError { .. } => ErrorCategory::Configuration,
            HotspotError::CsvError(_)
            | HotspotError::SerializationError(_)
            | HotspotError::ProcessingError { .. } => ErrorCategory::Data,
            HotspotError::BoundaryError { .. } | HotspotError::ProjectionError { .. } => {
                ErrorCategory::Geometry
            }
            HotspotError::IoError(_) | HotspotError::ZipError(_) | HotspotError::ImageError(_) => {
                ErrorCategory::System
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // 遠端服務暫時失敗，通常可以重試
            HotspotError::ApiError(_) => ErrorSeverity::Medium,
            HotspotError::ApiStatusError { status, .. } if *status >= 500 || *status == 429 => {
                ErrorSeverity::Medium
            }
            HotspotError::IoError(_) | HotspotError::ZipError(_) | HotspotError::ImageError(_) => {
                ErrorSeverity::Critical
            }
            _ => ErrorSeverity::High,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            HotspotError::ApiError(_) => {
                "Check network connectivity and the configured endpoints, then retry"
            }
            HotspotError::ApiStatusError { status, .. } if *status >= 500 || *status == 429 => {
                "The remote service is busy or failing; wait a moment and retry"
            }
            HotspotError::ApiStatusError { .. } => {
                "Check the query parameters (species name, country, year range)"
            }
            HotspotError::LookupError { .. } => {
                "Use an English country name or an ISO 3166 alpha-2/alpha-3 code, or add the country to a lookup file"
            }
            HotspotError::ConfigError { .. }
            | HotspotError::ConfigValidationError { .. }
            | HotspotError::InvalidConfigValueError { .. }
            | HotspotError::MissingConfigError { .. } => {
                "Fix the configuration file or command line flags and run again"
            }
            HotspotError::BoundaryError { .. } => {
                "Check the administrative level or point boundary.file at a valid GeoJSON polygon file"
            }
            HotspotError::ProjectionError { .. } => {
                "Set projection.utm_zone explicitly to a zone between 1 and 60"
            }
            HotspotError::CsvError(_)
            | HotspotError::SerializationError(_)
            | HotspotError::ProcessingError { .. } => {
                "Inspect the upstream response; run with --verbose for details"
            }
            HotspotError::IoError(_) | HotspotError::ZipError(_) | HotspotError::ImageError(_) => {
                "Check that the output directory exists and is writable"
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            HotspotError::ApiError(_) | HotspotError::ApiStatusError { .. } => {
                format!("Could not download data: {}", self)
            }
            HotspotError::LookupError { query } => {
                format!("'{}' is not a known country", query)
            }
            HotspotError::BoundaryError { message } => {
                format!("Could not build the country outline: {}", message)
            }
            _ => self.to_string(),
        }
    }
}
