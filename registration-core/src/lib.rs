//! Event Registration Ledger
//!
//! Issues one QR credential per (user, event) registration and verifies each
//! credential at most once.
//!
//! # Architecture
//!
//! - **Credential Generator**: random-UUID tokens rendered as QR codes
//! - **Single Writer**: one writer task owns every registration write
//! - **Store Constraints**: uniqueness checked and written in one atomic batch
//! - **Directory**: users and events sharing the same store
//!
//! # Invariants
//!
//! - At most one registration per (user, event)
//! - Credential tokens are unique across all registrations
//! - Verification timestamp present iff verified
//! - Verification happens at most once; it is never undone

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod storage;
pub mod ledger;
pub mod credential;
pub mod directory;
pub mod error;
pub mod actor;
pub mod config;
pub mod metrics;

// Re-exports
pub use error::{Constraint, Error, Result};
pub use types::{
    CredentialToken, Event, EventId, NewEvent, NewUser, Registration, RegistrationDetails,
    RegistrationId, User, UserId, VerificationState,
};
pub use credential::{Credential, CredentialGenerator};
pub use directory::Directory;
pub use ledger::Ledger;
pub use metrics::Metrics;
pub use storage::StorageStats;
pub use config::Config;
