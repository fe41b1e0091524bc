//! Error categories shared across the integrity pipeline
//!
//! Every module defines its own `thiserror` enum. Each of those maps onto one
//! of a small set of categories so callers (the CLI in particular) can report
//! *what kind* of failure happened without matching on every concrete type:
//!
//! - **Io**: file or network unreachable. Retryable by the caller, never by the core.
//! - **Crypto**: malformed key or signature encoding. Fatal.
//! - **Integrity**: hash, tag or signature mismatch. Signals tampering or corruption.
//! - **MalformedEnvelope**: an envelope that cannot be parsed at all.
//! - **Conflict**: a fingerprint is already bound to a different locator.
//! - **NotFound**: unknown fingerprint or locator. Expected, callers branch on it.
//! - **Config**: local configuration or usage problems.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Io,
    Crypto,
    Integrity,
    MalformedEnvelope,
    Conflict,
    NotFound,
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Io => "IOError",
            ErrorKind::Crypto => "CryptoError",
            ErrorKind::Integrity => "IntegrityError",
            ErrorKind::MalformedEnvelope => "MalformedEnvelopeError",
            ErrorKind::Conflict => "ConflictError",
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::Config => "ConfigError",
        }
    }

    /// Whether a caller may reasonably retry the failed operation with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Io)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a concrete error onto its [`ErrorKind`]
pub trait Categorize {
    fn kind(&self) -> ErrorKind;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_only_io_is_retryable() {
        assert!(ErrorKind::Io.is_retryable());
        for kind in [
            ErrorKind::Crypto,
            ErrorKind::Integrity,
            ErrorKind::MalformedEnvelope,
            ErrorKind::Conflict,
            ErrorKind::NotFound,
            ErrorKind::Config,
        ] {
            assert!(!kind.is_retryable(), "{kind} should not be retryable");
        }
    }

    #[test]
    fn test_display_names() {
        assert_eq!(ErrorKind::Integrity.to_string(), "IntegrityError");
        assert_eq!(ErrorKind::MalformedEnvelope.to_string(), "MalformedEnvelopeError");
    }
}
