//! Domain error types

use thiserror::Error;

/// Domain-level errors
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Unknown grant kind: {0}")]
    UnknownGrantKind(String),

    #[error("Malformed session storage key: {0}")]
    MalformedStorageKey(String),

    #[error("Invalid tool descriptor: {0}")]
    InvalidDescriptor(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = DomainError::UnknownGrantKind("saml".to_string());
        assert_eq!(error.to_string(), "Unknown grant kind: saml");
    }
}
