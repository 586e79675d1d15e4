//! Error types for addr-acl.
//!
//! Input validation failures (malformed prefix text) are reported through
//! [`AclError`]. Contract violations — a prefix length that exceeds the
//! address family width on the typed insertion path — are programming errors
//! and panic instead of returning a soft error; acting on corrupted access
//! control state is never recoverable.

use thiserror::Error;

/// Errors produced while building an access table.
#[derive(Debug, Error)]
pub enum AclError {
    /// The textual prefix could not be parsed as an address or CIDR network.
    #[error("invalid prefix {input:?}: {reason}")]
    InvalidPrefix {
        /// The text as given by the caller.
        input: String,
        /// Parser diagnostic.
        reason: String,
    },
}

impl AclError {
    /// Create an invalid prefix error.
    pub fn invalid_prefix(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPrefix {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

/// Type alias for Result with [`AclError`].
pub type Result<T> = std::result::Result<T, AclError>;
