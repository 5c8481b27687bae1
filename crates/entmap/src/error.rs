//! Error surface for mapping and persistence boundaries.
//!
//! `MapError` covers failures raised by the mapper itself; errors raised by
//! the persistence collaborator propagate unmodified inside
//! `MapError::Persistence`. Lookup misses are never errors; they are `None`.

use std::fmt;
use thiserror::Error as ThisError;

///
/// MapError
///
/// Mapping failures are raised synchronously and never retried.
///

#[remain::sorted]
#[derive(Debug, ThisError)]
pub enum MapError {
    #[error("no element type declared for to-many field '{field}' on '{entity}'")]
    MissingElementType {
        entity: &'static str,
        field: &'static str,
    },

    #[error("entity type '{entity}' declares no identity field")]
    MissingIdentityField { entity: &'static str },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("unknown entity type '{entity}'")]
    UnknownEntityType { entity: String },

    #[error("entity handle does not belong to this session")]
    UnknownHandle,

    #[error("collection wrapper for field '{field}' on '{entity}' cannot be constructed: {reason}")]
    WrapperNotConstructible {
        entity: &'static str,
        field: &'static str,
        reason: String,
    },
}

///
/// PersistenceError
///
/// Structured error produced by the persistence collaborator. The mapper
/// never constructs these for its own logic failures, with the single
/// exception of the `Internal` class used for broken collaborator contracts
/// (for example a save that assigns no key).
///

#[derive(Debug, ThisError)]
#[error("{class}: {message}")]
pub struct PersistenceError {
    pub class: ErrorClass,
    pub message: String,
}

impl PersistenceError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Conflict, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internal, message)
    }
}

///
/// ErrorClass
/// Collaborator error taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    Conflict,
    Internal,
    NotFound,
    Unsupported,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Conflict => "conflict",
            Self::Internal => "internal",
            Self::NotFound => "not_found",
            Self::Unsupported => "unsupported",
        };
        write!(f, "{label}")
    }
}

///
/// TESTS
///
