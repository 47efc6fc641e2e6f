//! Core error types for APPGRAPH.

use std::fmt;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Invalid identifier format
    InvalidId { value: String, reason: String },

    /// Unknown capability or access name
    InvalidCapability { value: String },

    /// Unknown resource kind name
    InvalidKind { value: String },

    /// Declaration bytes could not be encoded or decoded
    InvalidEncoding { message: String },

    /// Parse error
    ParseError { message: String },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidId { value, reason } => {
                write!(f, "Invalid identifier '{}': {}", value, reason)
            }
            Self::InvalidCapability { value } => write!(f, "Invalid capability: {}", value),
            Self::InvalidKind { value } => write!(f, "Invalid resource kind: {}", value),
            Self::InvalidEncoding { message } => write!(f, "Invalid encoding: {}", message),
            Self::ParseError { message } => write!(f, "Parse error: {}", message),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidEncoding {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::InvalidId {
            value: "9lives".to_string(),
            reason: "must start with a letter".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "Invalid identifier '9lives': must start with a letter"
        );

        let err = CoreError::InvalidCapability {
            value: "admin".to_string(),
        };
        assert_eq!(format!("{}", err), "Invalid capability: admin");
    }

    #[test]
    fn test_from_json_error() {
        let err = serde_json::from_str::<u32>("not json").unwrap_err();
        let core: CoreError = err.into();
        assert!(matches!(core, CoreError::InvalidEncoding { .. }));
    }

    #[test]
    fn test_error_equality() {
        let err1 = CoreError::InvalidKind {
            value: "queue".to_string(),
        };
        let err2 = CoreError::InvalidKind {
            value: "queue".to_string(),
        };
        assert_eq!(err1, err2);
        assert_ne!(
            err1,
            CoreError::ParseError {
                message: "queue".to_string()
            }
        );
    }
}
