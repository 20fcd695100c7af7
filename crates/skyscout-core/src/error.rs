//! Error taxonomy shared by every discovery component.

use thiserror::Error;

/// Why the engine refused to mutate an existing inventory resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnershipViolation {
    /// The resource is stamped with another discovery group.
    GroupMismatch { expected: String, found: String },
    /// The resource was registered by something other than cloud discovery.
    NonCloudOrigin(String),
    /// The resource carries no origin label at all.
    MissingOrigin,
}

impl std::fmt::Display for OwnershipViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OwnershipViolation::GroupMismatch { expected, found } => write!(
                f,
                "owned by discovery group {found:?}, this engine runs in {expected:?}"
            ),
            OwnershipViolation::NonCloudOrigin(origin) => {
                write!(f, "origin is {origin:?}, not cloud")
            }
            OwnershipViolation::MissingOrigin => write!(f, "origin label is missing"),
        }
    }
}

/// Errors produced by discovery, reconciliation and the inventory contract.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DiscoveryError {
    /// The requested resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A resource with the same name already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Malformed matcher, config or request.
    #[error("Bad parameter: {0}")]
    BadParameter(String),

    /// Cloud API throttling or quota exhaustion.
    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    /// Optimistic concurrency check failed.
    #[error("Compare failed: {0}")]
    CompareFailed(String),

    /// The caller lacks permission for the operation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The resource exists but is not owned by this engine.
    #[error("Refusing to modify {kind} {name}: {reason}")]
    OwnershipConflict {
        kind: String,
        name: String,
        reason: OwnershipViolation,
    },

    /// Network or transport failure.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A single call exceeded its deadline.
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The surrounding cycle was cancelled.
    #[error("Cancelled")]
    Cancelled,

    /// Anything else.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DiscoveryError {
    /// Whether the next poll cycle may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DiscoveryError::LimitExceeded(_)
                | DiscoveryError::Connection(_)
                | DiscoveryError::Timeout(_)
                | DiscoveryError::CompareFailed(_)
        )
    }

    /// Stable code for logs and audit events.
    pub fn error_code(&self) -> &'static str {
        match self {
            DiscoveryError::NotFound(_) => "NOT_FOUND",
            DiscoveryError::AlreadyExists(_) => "ALREADY_EXISTS",
            DiscoveryError::BadParameter(_) => "BAD_PARAMETER",
            DiscoveryError::LimitExceeded(_) => "LIMIT_EXCEEDED",
            DiscoveryError::CompareFailed(_) => "COMPARE_FAILED",
            DiscoveryError::PermissionDenied(_) => "PERMISSION_DENIED",
            DiscoveryError::OwnershipConflict { .. } => "OWNERSHIP_CONFLICT",
            DiscoveryError::Connection(_) => "CONNECTION_ERROR",
            DiscoveryError::Timeout(_) => "TIMEOUT",
            DiscoveryError::Cancelled => "CANCELLED",
            DiscoveryError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DiscoveryError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, DiscoveryError::AlreadyExists(_))
    }

    pub fn is_compare_failed(&self) -> bool {
        matches!(self, DiscoveryError::CompareFailed(_))
    }
}

/// Result type for discovery operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

impl From<serde_json::Error> for DiscoveryError {
    fn from(err: serde_json::Error) -> Self {
        DiscoveryError::BadParameter(format!("serialization: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for DiscoveryError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        DiscoveryError::Timeout(std::time::Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DiscoveryError::NotFound("database/aws-rds".to_string());
        assert_eq!(err.to_string(), "Not found: database/aws-rds");

        let err = DiscoveryError::OwnershipConflict {
            kind: "db".to_string(),
            name: "aws-rds".to_string(),
            reason: OwnershipViolation::GroupMismatch {
                expected: "main".to_string(),
                found: "other".to_string(),
            },
        };
        assert_eq!(
            err.to_string(),
            "Refusing to modify db aws-rds: owned by discovery group \"other\", \
             this engine runs in \"main\""
        );
    }

    #[test]
    fn test_is_retryable() {
        assert!(DiscoveryError::LimitExceeded("throttled".to_string()).is_retryable());
        assert!(DiscoveryError::Connection("reset".to_string()).is_retryable());
        assert!(!DiscoveryError::BadParameter("region".to_string()).is_retryable());
        assert!(!DiscoveryError::PermissionDenied("iam".to_string()).is_retryable());
    }

    #[test]
    fn test_error_code() {
        assert_eq!(
            DiscoveryError::AlreadyExists("x".to_string()).error_code(),
            "ALREADY_EXISTS"
        );
        assert_eq!(DiscoveryError::Cancelled.error_code(), "CANCELLED");
    }
}
