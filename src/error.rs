//! Error taxonomy for the menu synchronizer.
//!
//! `TransportError` is produced by a [`crate::store::RemoteStore`];
//! `SyncError` is what every mutation returns to its caller;
//! `InitError` is what start-up returns when the menu cannot be loaded.

use thiserror::Error;

/// Broad class of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The server answered with a non-success status.
    Status,
    /// The request never produced a response (connect, DNS, timeout).
    Network,
    /// The response body was not valid JSON.
    InvalidBody,
}

/// A failed request against the remote document store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    /// HTTP status when the server answered.
    pub status: Option<u16>,
    pub message: String,
}

impl TransportError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Status,
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Network,
            status: None,
            message: message.into(),
        }
    }

    pub fn invalid_body(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::InvalidBody,
            status: None,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

/// Failure of a synchronizer operation.
///
/// Whenever an operation returns `Remote`, the affected in-memory collection
/// has already been restored (or re-fetched, for cascade deletes and dish
/// moves) before the error reaches the caller.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("{operation} failed: {source}")]
    Remote {
        operation: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("menu data is not loaded")]
    NotReady,

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid {entity}: {reason}")]
    Invalid { entity: &'static str, reason: String },

    #[error("unexpected response for {operation}: {reason}")]
    Decode {
        operation: &'static str,
        reason: String,
    },
}

impl SyncError {
    pub(crate) fn remote(operation: &'static str, source: TransportError) -> Self {
        Self::Remote { operation, source }
    }

    pub(crate) fn invalid(entity: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            entity,
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: &str) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// The transport failure behind this error, if any.
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            Self::Remote { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Failure while loading the four menu collections at start-up.
#[derive(Debug, Clone, Error)]
pub enum InitError {
    #[error("failed to load {resource}: {source}")]
    Fetch {
        resource: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("malformed {resource} payload: {reason}")]
    Decode {
        resource: &'static str,
        reason: String,
    },

    #[error("menu data is already loaded")]
    AlreadyInitialized,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn sync_error_exposes_transport_source() {
        let err = SyncError::remote("add_branch", TransportError::status(500, "boom"));
        assert_eq!(err.to_string(), "add_branch failed: boom");
        assert_eq!(err.transport().and_then(|t| t.status), Some(500));
        assert!(err.source().is_some());
    }

    #[test]
    fn not_ready_has_no_transport() {
        assert!(SyncError::NotReady.transport().is_none());
    }

    #[test]
    fn init_error_names_resource() {
        let err = InitError::Fetch {
            resource: "dishes",
            source: TransportError::network("Cannot reach menu API at http://x"),
        };
        assert_eq!(
            err.to_string(),
            "failed to load dishes: Cannot reach menu API at http://x"
        );
    }
}
