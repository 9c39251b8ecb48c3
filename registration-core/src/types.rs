//! Core types for the registration ledger
//!
//! All stored types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Invalid states being unrepresentable (verification flag and timestamp
//!   live in one enum)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Create from raw value
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Raw value
            pub const fn get(self) -> u64 {
                self.0
            }

            /// Big-endian key bytes (sort order == numeric order)
            pub fn to_key(self) -> [u8; 8] {
                self.0.to_be_bytes()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

numeric_id!(
    /// User identifier, owned by the account directory
    UserId
);

numeric_id!(
    /// Event identifier, owned by the event catalogue
    EventId
);

numeric_id!(
    /// Store-assigned registration number (insertion order)
    RegistrationId
);

/// Opaque credential string embedded in the QR code
///
/// Format: `EVENT:<event_id>:USER:<user_id>:<uuid>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialToken(String);

impl CredentialToken {
    /// Wrap a presented token string (no format validation; lookup decides)
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the inner string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CredentialToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Verification state machine: `Unverified` -> `Verified` (terminal)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationState {
    /// Initial state
    Unverified,
    /// Checked in at the entrance
    Verified {
        /// Time of verification
        at: DateTime<Utc>,
    },
}

impl VerificationState {
    /// Whether the credential has been used
    pub fn is_verified(&self) -> bool {
        matches!(self, VerificationState::Verified { .. })
    }

    /// Verification timestamp, present iff verified
    pub fn verified_at(&self) -> Option<DateTime<Utc>> {
        match self {
            VerificationState::Unverified => None,
            VerificationState::Verified { at } => Some(*at),
        }
    }
}

/// A user's registration for one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    /// Store-assigned number
    pub id: RegistrationId,

    /// Registered user
    pub user_id: UserId,

    /// Event registered for
    pub event_id: EventId,

    /// Creation timestamp
    pub registration_date: DateTime<Utc>,

    /// Unique credential
    pub token: CredentialToken,

    /// QR code PNG, base64-encoded
    pub qr_image: String,

    /// Verification state
    pub verification: VerificationState,
}

impl Registration {
    /// Whether the credential has been used
    pub fn is_verified(&self) -> bool {
        self.verification.is_verified()
    }

    /// Verification timestamp (None until verified)
    pub fn verification_date(&self) -> Option<DateTime<Utc>> {
        self.verification.verified_at()
    }
}

/// Registration handed to the store; the store assigns the id
#[derive(Debug, Clone)]
pub struct PendingRegistration {
    /// Registered user
    pub user_id: UserId,
    /// Event registered for
    pub event_id: EventId,
    /// Creation timestamp
    pub registration_date: DateTime<Utc>,
    /// Unique credential
    pub token: CredentialToken,
    /// QR code PNG, base64-encoded
    pub qr_image: String,
}

impl PendingRegistration {
    /// Attach the store-assigned id
    pub fn into_registration(self, id: RegistrationId) -> Registration {
        Registration {
            id,
            user_id: self.user_id,
            event_id: self.event_id,
            registration_date: self.registration_date,
            token: self.token,
            qr_image: self.qr_image,
            verification: VerificationState::Unverified,
        }
    }
}

/// User account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// User ID
    pub id: UserId,
    /// Email address (unique, case-insensitive)
    pub email: String,
    /// Display name
    pub full_name: String,
    /// Administrator flag
    pub is_admin: bool,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

/// New user account request
#[derive(Debug, Clone, Serialize, Deserialize, validator::Validate)]
pub struct NewUser {
    /// Email address
    #[validate(email)]
    pub email: String,
    /// Display name
    #[validate(length(min = 1, max = 200))]
    pub full_name: String,
    /// Administrator flag
    #[serde(default)]
    pub is_admin: bool,
}

/// Event in the catalogue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event ID
    pub id: EventId,
    /// Title
    pub title: String,
    /// Description
    pub description: Option<String>,
    /// Event date
    pub date: DateTime<Utc>,
    /// Venue
    pub location: Option<String>,
    /// Advertised capacity (informational only)
    pub max_attendees: Option<u32>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

/// New event request
#[derive(Debug, Clone, Serialize, Deserialize, validator::Validate)]
pub struct NewEvent {
    /// Title
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
    /// Event date
    pub date: DateTime<Utc>,
    /// Venue
    #[serde(default)]
    pub location: Option<String>,
    /// Advertised capacity
    #[serde(default)]
    pub max_attendees: Option<u32>,
}

/// Registration joined with its user and event
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationDetails {
    /// The registration
    pub registration: Registration,
    /// Owning user
    pub user: User,
    /// Event registered for
    pub event: Event,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_key_ordering() {
        let a = RegistrationId::new(9);
        let b = RegistrationId::new(256);
        assert!(a.to_key() < b.to_key());
        assert_eq!(b.get(), 256);
    }

    #[test]
    fn test_verification_state_coupling() {
        let unverified = VerificationState::Unverified;
        assert!(!unverified.is_verified());
        assert_eq!(unverified.verified_at(), None);

        let now = Utc::now();
        let verified = VerificationState::Verified { at: now };
        assert!(verified.is_verified());
        assert_eq!(verified.verified_at(), Some(now));
    }

    #[test]
    fn test_pending_into_registration_is_unverified() {
        let pending = PendingRegistration {
            user_id: UserId::new(1),
            event_id: EventId::new(7),
            registration_date: Utc::now(),
            token: CredentialToken::new("EVENT:7:USER:1:abc"),
            qr_image: String::new(),
        };

        let registration = pending.into_registration(RegistrationId::new(1));
        assert!(!registration.is_verified());
        assert_eq!(registration.verification_date(), None);
        assert_eq!(registration.token.as_str(), "EVENT:7:USER:1:abc");
    }

    #[test]
    fn test_registration_bincode_roundtrip_keeps_state() {
        let registration = Registration {
            id: RegistrationId::new(3),
            user_id: UserId::new(1),
            event_id: EventId::new(2),
            registration_date: Utc::now(),
            token: CredentialToken::new("EVENT:2:USER:1:x"),
            qr_image: "aGVsbG8=".to_string(),
            verification: VerificationState::Verified { at: Utc::now() },
        };

        let bytes = bincode::serialize(&registration).unwrap();
        let decoded: Registration = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, registration);
    }
}
