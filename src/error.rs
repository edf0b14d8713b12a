//! Crate-wide error taxonomy.

use thiserror::Error as ThisError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the `rqg` library.
///
/// Variants map onto the vendor-agnostic taxonomy described in the design
/// notes: configuration failures are fatal at startup, grammar errors fail
/// the affected batch only, resource errors are retried with backoff before
/// becoming fatal, vendor errors are counted as outcome data and never abort
/// the pipeline, and `ShutdownRequested` signals a graceful drain rather
/// than a failure.
#[derive(ThisError, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Invalid configuration: weights that don't sum, negative counts, an
    /// unreachable DSN, or a TOML preset with unknown keys.
    #[error("configuration error: {0}")]
    Config(String),

    /// A grammar-level failure while expanding a rule.
    #[error(transparent)]
    Grammar(#[from] GrammarError),

    /// A resource was exhausted or an operation failed in a way that may be
    /// transient (connection pool full, temporary network error).
    #[error("resource error: {0}")]
    Resource(String),

    /// A checkpoint or metrics file could not be read or written.
    #[error("failed to {action} at {path}")]
    Io {
        /// Action that triggered the I/O error, e.g. `"write checkpoint"`.
        action: &'static str,
        /// Path involved.
        path: std::path::PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A driver-reported failure. Never propagated out of the runner loop
    /// as a fatal error — it is classified into an outcome symbol and
    /// counted instead. Surfaced here only for code paths (e.g. DDL setup)
    /// that must fail the whole run on a bad vendor response.
    #[error("vendor error ({class}): {message}")]
    Vendor {
        /// Short vendor-agnostic error class, e.g. `"SyntaxError"`.
        class: String,
        /// Human-readable message from the driver.
        message: String,
    },

    /// Graceful shutdown was requested (SIGINT/SIGTERM). Not a failure.
    #[error("shutdown requested")]
    ShutdownRequested,

    /// Serialization of a checkpoint or metrics record failed.
    #[error("failed to serialize {what}")]
    Serialize {
        /// What was being serialized.
        what: &'static str,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// Wraps an I/O error with the action and path that produced it.
    pub fn io(action: &'static str, path: impl Into<std::path::PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// Whether this error is safe to retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Resource(_) | Self::Io { .. })
    }
}

/// Grammar-engine specific errors.
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GrammarError {
    /// A `reference` element pointed at a rule name not present in the grammar.
    #[error("undefined rule: {0}")]
    UndefinedRule(String),

    /// A template hole named a variable not bound in the surrounding scope.
    #[error("unbound template hole: {0}")]
    UnboundHole(String),

    /// Expansion exceeded the output-length cap or the recursion-depth cap.
    #[error("expansion overflow in rule {rule} ({reason})")]
    ExpansionOverflow {
        /// Rule being expanded when the cap was hit.
        rule: String,
        /// Which cap was hit: `"length"` or `"depth"`.
        reason: &'static str,
    },

    /// A `choice` element had all-zero or negative weights.
    #[error("invalid choice weights in rule {0}")]
    InvalidChoiceWeights(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_and_io_errors_are_retryable() {
        let resource = Error::Resource("pool exhausted".to_owned());
        assert!(resource.is_retryable());

        let io = Error::io(
            "write checkpoint",
            "/tmp/checkpoint.json",
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        );
        assert!(io.is_retryable());
    }

    #[test]
    fn config_and_vendor_errors_are_not_retryable() {
        assert!(!Error::Config("bad dsn".to_owned()).is_retryable());
        assert!(!Error::Vendor {
            class: "SyntaxError".to_owned(),
            message: "unexpected token".to_owned(),
        }
        .is_retryable());
    }

    #[test]
    fn grammar_error_converts_into_crate_error() {
        let err: Error = GrammarError::UndefinedRule("missing_rule".to_owned()).into();
        assert_eq!(err.to_string(), "undefined rule: missing_rule");
    }
}
