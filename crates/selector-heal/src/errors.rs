//! Error types for the selector healing engine

use thiserror::Error;

/// Failure raised at the document probe boundary.
///
/// "No element matched" is never an error; probes report it as `Ok(None)`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The locator could not be parsed by the underlying document engine
    #[error("Malformed locator '{locator}': {reason}")]
    MalformedLocator { locator: String, reason: String },

    /// Communication with the live document failed
    #[error("Probe transport error: {0}")]
    Transport(String),

    /// The document returned a response the probe could not interpret
    #[error("Unexpected probe response: {0}")]
    Script(String),
}

impl ProbeError {
    pub fn malformed(locator: impl Into<String>, reason: impl Into<String>) -> Self {
        ProbeError::MalformedLocator {
            locator: locator.into(),
            reason: reason.into(),
        }
    }

    /// Check if this is a malformed locator failure
    pub fn is_malformed(&self) -> bool {
        matches!(self, ProbeError::MalformedLocator { .. })
    }
}

/// Engine error enumeration
#[derive(Debug, Error, Clone)]
pub enum LocatorError {
    /// Caller supplied options outside their valid range
    #[error("Invalid resolve options: {0}")]
    InvalidOptions(String),

    /// Probe failure that cannot be downgraded to a miss
    #[error(transparent)]
    Probe(#[from] ProbeError),

    /// Configuration could not be loaded or validated
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LocatorError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, LocatorError::Probe(ProbeError::Transport(_)))
    }

    /// Get error severity (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            LocatorError::Probe(ProbeError::Transport(_)) => 2,
            LocatorError::Probe(_) => 1,
            LocatorError::Config(_) => 3,
            LocatorError::InvalidOptions(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_retryable() {
        let err = LocatorError::from(ProbeError::Transport("socket closed".into()));
        assert!(err.is_retryable());
        assert_eq!(err.severity(), 2);

        let err = LocatorError::InvalidOptions("max_strategies must be > 0".into());
        assert!(!err.is_retryable());
    }

    #[test]
    fn malformed_message_names_locator() {
        let err = ProbeError::malformed("div[", "unclosed attribute selector");
        assert!(err.is_malformed());
        assert_eq!(
            err.to_string(),
            "Malformed locator 'div[': unclosed attribute selector"
        );
    }
}
