use std::fmt;

use thiserror::Error;

use crate::Handle;

/// A guest-level exception recorded in a thread's pending slot.
///
/// The core never raises these itself; it only stores, reads and clears them
/// for the dispatch layer to propagate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestException {
    pub kind: String,
    pub message: String,
}

impl GuestException {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }

    pub fn system_error(message: impl Into<String>) -> Self {
        Self::new("SystemError", message)
    }
}

impl fmt::Display for GuestException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("{op}: missing key in handle table: {handle}")]
    NotFound { op: &'static str, handle: Handle },

    #[error("lock contract violation: {0}")]
    LockContractViolation(&'static str),

    #[error("{op}: the null handle cannot be stored")]
    NullHandle { op: &'static str },

    #[error("{0} is already mapped to an object")]
    AlreadyStored(Handle),

    #[error("bad refcount: releasing {0} whose header already reads 0")]
    BadRefCount(Handle),

    #[error("{handle} holds a {found} object, expected {expected}")]
    WrongKind {
        handle: Handle,
        expected: &'static str,
        found: &'static str,
    },

    #[error("per-thread state is unavailable during thread teardown")]
    ThreadStateUnavailable,

    #[error("{0}")]
    Guest(GuestException),
}

impl BridgeError {
    pub(crate) fn not_found(op: &'static str, handle: Handle) -> Self {
        BridgeError::NotFound { op, handle }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
