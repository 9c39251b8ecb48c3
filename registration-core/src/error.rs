//! Error types for the registration ledger

use crate::types::{EventId, UserId};
use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Uniqueness constraints enforced by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// One registration per (user, event)
    UserEvent,
    /// One registration per credential token
    Token,
    /// One account per email address
    UserEmail,
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::UserEvent => f.write_str("registrations(user_id, event_id)"),
            Constraint::Token => f.write_str("registrations(token)"),
            Constraint::UserEmail => f.write_str("users(email)"),
        }
    }
}

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// User already holds a registration for this event
    #[error("User {user_id} is already registered for event {event_id}")]
    DuplicateRegistration {
        /// User
        user_id: UserId,
        /// Event
        event_id: EventId,
    },

    /// Presented credential matches no registration
    #[error("Invalid credential")]
    CredentialNotFound,

    /// Presented credential was already used
    #[error("Credential already used at {verified_at}")]
    AlreadyVerified {
        /// Time of the first (successful) verification
        verified_at: DateTime<Utc>,
    },

    /// QR encoding failed
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Store rejected a write on a uniqueness constraint
    #[error("Uniqueness constraint violated: {0}")]
    Conflict(Constraint),

    /// Email address already has an account
    #[error("Email already registered: {0}")]
    EmailAlreadyRegistered(String),

    /// User not found
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// Event not found
    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    /// Rejected input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Expected rejections a caller shows to the user rather than logging
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::DuplicateRegistration { .. }
                | Error::CredentialNotFound
                | Error::AlreadyVerified { .. }
                | Error::EmailAlreadyRegistered(_)
                | Error::UserNotFound(_)
                | Error::EventNotFound(_)
                | Error::InvalidInput(_)
        )
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<qrcode::types::QrError> for Error {
    fn from(err: qrcode::types::QrError) -> Self {
        Error::Encoding(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Encoding(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Error::InvalidInput(err.to_string())
    }
}
