use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Portal authentication failed: {message}")]
    AuthError { message: String },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Portal request to '{endpoint}' failed: {message}")]
    PortalError { endpoint: String, message: String },

    #[error("Notification delivery failed: {message}")]
    DeliveryError { message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Auth,
    Network,
    Portal,
    Delivery,
    Storage,
    Data,
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl MonitorError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            MonitorError::AuthError { .. } => ErrorCategory::Auth,
            MonitorError::NetworkError(_) => ErrorCategory::Network,
            MonitorError::PortalError { .. } => ErrorCategory::Portal,
            MonitorError::DeliveryError { .. } => ErrorCategory::Delivery,
            MonitorError::IoError(_) => ErrorCategory::Storage,
            MonitorError::SerializationError(_) => ErrorCategory::Data,
            MonitorError::ConfigValidationError { .. }
            | MonitorError::MissingConfigError { .. }
            | MonitorError::InvalidConfigValueError { .. } => ErrorCategory::Config,
        }
    }

    /// 嚴重程度決定退出碼：Low 不視為失敗
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            MonitorError::DeliveryError { .. } => ErrorSeverity::Low,
            MonitorError::NetworkError(_) | MonitorError::PortalError { .. } => {
                ErrorSeverity::Medium
            }
            MonitorError::IoError(_) | MonitorError::SerializationError(_) => ErrorSeverity::High,
            MonitorError::AuthError { .. }
            | MonitorError::ConfigValidationError { .. }
            | MonitorError::MissingConfigError { .. }
            | MonitorError::InvalidConfigValueError { .. } => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Auth => {
                "Check PORTAL_USERNAME / PORTAL_PASSWORD and confirm the account still works on the portal"
            }
            ErrorCategory::Network => {
                "Check network connectivity and the portal endpoint; the next scheduled run will retry"
            }
            ErrorCategory::Portal => {
                "The portal answered but not successfully; it may be down for maintenance"
            }
            ErrorCategory::Delivery => {
                "Check the SMTP host, port and EMAIL_PASSWORD; the snapshot was still saved"
            }
            ErrorCategory::Storage => "Check the state directory exists and is writable",
            ErrorCategory::Data => {
                "The state file may be corrupt; delete it to start monitoring from scratch"
            }
            ErrorCategory::Config => "Fix the configuration file and re-run with --dry-run to verify",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            MonitorError::AuthError { .. } => "The portal rejected the configured credentials".to_string(),
            MonitorError::NetworkError(e) => format!("Could not reach the portal: {}", e),
            MonitorError::PortalError { endpoint, .. } => {
                format!("The portal endpoint '{}' kept failing", endpoint)
            }
            MonitorError::DeliveryError { .. } => {
                "Changes were detected but the notification email could not be sent".to_string()
            }
            MonitorError::IoError(e) => format!("File access failed: {}", e),
            MonitorError::SerializationError(e) => format!("State file could not be parsed: {}", e),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
