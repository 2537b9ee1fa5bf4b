use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for the movnt harness.
///
/// Composition errors are defects in the matrix definition itself and are
/// raised at matrix-construction time, before any request is issued.
/// Everything else is a runtime failure of the harness machinery; failures
/// of the subject binary are reported as data, not as errors.
#[derive(Error, Debug)]
pub enum HarnessError {
    // === Composition errors ===
    /// Two acceleration-path enable flags resolved to an enabling value in
    /// the same case.
    #[error("conflicting acceleration overrides: {first} and {second} both enabled")]
    ConflictingAcceleration { first: String, second: String },

    /// A threshold sweep value is not a valid byte count.
    #[error("invalid threshold sweep value: '{value}'")]
    InvalidThreshold { value: String },

    /// An override names a variable the subject binary does not recognize.
    #[error("unrecognized environment variable: '{name}'")]
    UnknownVariable { name: String },

    /// Two cases in one matrix share an identifier.
    #[error("duplicate case id: '{id}'")]
    DuplicateCaseId { id: String },

    // === Runtime errors ===
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to spawn the subject binary or its instrumentation wrapper.
    #[error("failed to spawn '{binary}': {source}")]
    Spawn {
        binary: PathBuf,
        source: std::io::Error,
    },

    // === Internal errors ===
    /// Internal logic error (should never happen).
    #[error("internal error: {0}")]
    Internal(String),
}

impl HarnessError {
    /// Whether this error is a defect in the matrix definition, fatal at
    /// construction time.
    #[must_use]
    pub const fn is_composition(&self) -> bool {
        matches!(
            self,
            Self::ConflictingAcceleration { .. }
                | Self::InvalidThreshold { .. }
                | Self::UnknownVariable { .. }
                | Self::DuplicateCaseId { .. }
        )
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias using `HarnessError`.
pub type Result<T> = std::result::Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = HarnessError::ConflictingAcceleration {
            first: "PMEM_AVX".to_string(),
            second: "PMEM_AVX512F".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "conflicting acceleration overrides: PMEM_AVX and PMEM_AVX512F both enabled"
        );
    }

    #[test]
    fn composition_classification() {
        assert!(
            HarnessError::InvalidThreshold {
                value: "abc".to_string()
            }
            .is_composition()
        );
        assert!(
            HarnessError::DuplicateCaseId {
                id: "base".to_string()
            }
            .is_composition()
        );
        let io = HarnessError::Io(std::io::Error::other("boom"));
        assert!(!io.is_composition());
        assert!(!HarnessError::internal("x").is_composition());
    }

    #[test]
    fn internal_helper() {
        let err = HarnessError::internal("assertion failed");
        assert!(matches!(err, HarnessError::Internal(msg) if msg == "assertion failed"));
    }

    #[test]
    fn io_conversion() {
        fn fails() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))?;
            Ok(())
        }
        assert!(matches!(fails(), Err(HarnessError::Io(_))));
    }
}
