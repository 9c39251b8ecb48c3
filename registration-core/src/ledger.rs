//! Main ledger orchestration layer
//!
//! This module ties together storage, credential generation and the writer
//! actor into the registration API.
//!
//! # Example
//!
//! ```no_run
//! use registration_core::{Config, EventId, Ledger, UserId};
//!
//! #[tokio::main]
//! async fn main() -> registration_core::Result<()> {
//!     let ledger = Ledger::open(Config::default()).await?;
//!
//!     let registration = ledger.register(UserId::new(1), EventId::new(7)).await?;
//!     let verified = ledger.verify(registration.token.as_str()).await?;
//!     assert!(verified.is_verified());
//!
//!     ledger.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, LedgerHandle},
    credential::CredentialGenerator,
    directory::Directory,
    metrics::Metrics,
    storage::{Storage, StorageStats},
    types::{
        CredentialToken, EventId, PendingRegistration, Registration, RegistrationDetails,
        RegistrationId, UserId,
    },
    Config, Constraint, Error, Result,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

/// Main ledger interface
#[derive(Debug)]
pub struct Ledger {
    /// Actor handle for writes
    handle: LedgerHandle,

    /// Direct storage access (for reads)
    storage: Arc<Storage>,

    /// Token + QR generator
    generator: CredentialGenerator,

    /// Users and events
    directory: Directory,

    /// Prometheus metrics
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl Ledger {
    /// Open ledger with configuration
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;

        // Open storage
        let storage = Arc::new(Storage::open(&config)?);

        // Spawn writer
        let handle = spawn_ledger_actor(storage.clone(), config.writer.mailbox_capacity);

        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to create metrics: {}", e)))?;

        Ok(Self {
            handle,
            directory: Directory::new(storage.clone()),
            storage,
            generator: CredentialGenerator::new(&config.credential),
            metrics,
            config,
        })
    }

    /// Register a user for an event
    ///
    /// The (user, event) pre-check only short-cuts the common case; the store's
    /// pair constraint decides when two requests race.
    pub async fn register(&self, user_id: UserId, event_id: EventId) -> Result<Registration> {
        if self
            .storage
            .find_registration_by_pair(user_id, event_id)?
            .is_some()
        {
            self.metrics.record_duplicate();
            tracing::info!(%user_id, %event_id, "Duplicate registration rejected");
            return Err(Error::DuplicateRegistration { user_id, event_id });
        }

        let render_start = Instant::now();
        let credential = self.generator.issue(user_id, event_id)?;
        self.metrics
            .record_render_duration(render_start.elapsed().as_secs_f64());

        let pending = PendingRegistration {
            user_id,
            event_id,
            registration_date: Utc::now(),
            qr_image: credential.image_base64(),
            token: credential.token,
        };

        self.commit(pending).await
    }

    /// Hand a registration to the writer; the store's pair constraint is final
    async fn commit(&self, pending: PendingRegistration) -> Result<Registration> {
        let (user_id, event_id) = (pending.user_id, pending.event_id);

        match self.handle.insert(pending).await {
            Ok(registration) => {
                self.metrics.record_registration();
                tracing::info!(
                    registration_id = %registration.id,
                    %user_id,
                    %event_id,
                    "Registration created"
                );
                Ok(registration)
            }
            Err(Error::Conflict(Constraint::UserEvent)) => {
                self.metrics.record_duplicate();
                tracing::info!(%user_id, %event_id, "Duplicate registration rejected by store");
                Err(Error::DuplicateRegistration { user_id, event_id })
            }
            Err(e) => {
                tracing::error!(%user_id, %event_id, error = %e, "Registration failed");
                Err(e)
            }
        }
    }

    /// Verify a presented credential (one-time)
    pub async fn verify(&self, token: &str) -> Result<Registration> {
        let result = self
            .handle
            .verify(CredentialToken::new(token), Utc::now())
            .await;

        match &result {
            Ok(registration) => {
                self.metrics.record_verification();
                tracing::info!(registration_id = %registration.id, "Credential verified");
            }
            Err(Error::CredentialNotFound) => {
                self.metrics.record_verification_rejected("not_found");
                tracing::warn!("Unknown credential presented");
            }
            Err(Error::AlreadyVerified { verified_at }) => {
                self.metrics.record_verification_rejected("already_verified");
                tracing::warn!(%verified_at, "Credential replayed");
            }
            Err(e) => tracing::error!(error = %e, "Verification failed"),
        }

        result
    }

    /// Verify and join the user and event display data
    pub async fn verify_detailed(&self, token: &str) -> Result<RegistrationDetails> {
        let registration = self.verify(token).await?;
        self.details(registration)
    }

    /// Registrations of one user, insertion order
    pub fn list_by_user(&self, user_id: UserId) -> Result<Vec<Registration>> {
        self.storage.registrations_for_user(user_id)
    }

    /// All registrations, insertion order
    pub fn list_all(&self) -> Result<Vec<Registration>> {
        self.storage.all_registrations()
    }

    /// Registrations of one user joined with user and event
    pub fn list_by_user_detailed(&self, user_id: UserId) -> Result<Vec<RegistrationDetails>> {
        self.list_by_user(user_id)?
            .into_iter()
            .map(|registration| self.details(registration))
            .collect()
    }

    /// All registrations joined with user and event
    pub fn list_all_detailed(&self) -> Result<Vec<RegistrationDetails>> {
        self.list_all()?
            .into_iter()
            .map(|registration| self.details(registration))
            .collect()
    }

    /// Get registration by store-assigned id
    pub fn get(&self, id: RegistrationId) -> Result<Option<Registration>> {
        self.storage.get_registration(id)
    }

    /// Look up a credential without verifying it
    pub fn find_by_token(&self, token: &str) -> Result<Option<Registration>> {
        self.storage
            .find_registration_by_token(&CredentialToken::new(token))
    }

    fn details(&self, registration: Registration) -> Result<RegistrationDetails> {
        let user = self.directory.require_user(registration.user_id)?;
        let event = self.directory.require_event(registration.event_id)?;
        Ok(RegistrationDetails {
            registration,
            user,
            event,
        })
    }

    /// Users and events sharing this ledger's store
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Prometheus metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Storage statistics
    pub fn stats(&self) -> Result<StorageStats> {
        self.storage.get_stats()
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Stop the writer and flush the store
    pub async fn shutdown(&self) -> Result<()> {
        self.handle.shutdown().await?;
        tracing::info!("Ledger shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NewEvent, NewUser};

    async fn create_test_ledger() -> (Ledger, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.credential.module_size = 4;

        (Ledger::open(config).await.unwrap(), temp_dir)
    }

    #[tokio::test]
    async fn test_ledger_open() {
        let (ledger, _temp) = create_test_ledger().await;
        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_register_scenario() {
        let (ledger, _temp) = create_test_ledger().await;

        let registration = ledger
            .register(UserId::new(1), EventId::new(7))
            .await
            .unwrap();
        assert_eq!(registration.user_id, UserId::new(1));
        assert_eq!(registration.event_id, EventId::new(7));
        assert!(!registration.is_verified());
        assert_eq!(registration.verification_date(), None);
        assert!(registration.token.as_str().starts_with("EVENT:7:USER:1:"));
        assert!(!registration.qr_image.is_empty());

        let err = ledger
            .register(UserId::new(1), EventId::new(7))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateRegistration { .. }));
        assert_eq!(ledger.list_all().unwrap().len(), 1);
        assert_eq!(ledger.metrics().duplicates_total.get(), 1);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_store_conflict_reported_as_duplicate() {
        let (ledger, _temp) = create_test_ledger().await;

        let first = ledger
            .register(UserId::new(1), EventId::new(7))
            .await
            .unwrap();

        // Same pair with a fresh token, as if a racing request passed the pre-check
        let credential = ledger.generator.issue(UserId::new(1), EventId::new(7)).unwrap();
        let racing = PendingRegistration {
            user_id: UserId::new(1),
            event_id: EventId::new(7),
            registration_date: Utc::now(),
            qr_image: credential.image_base64(),
            token: credential.token,
        };

        let err = ledger.commit(racing).await.unwrap_err();
        match err {
            Error::DuplicateRegistration { user_id, event_id } => {
                assert_eq!(user_id, UserId::new(1));
                assert_eq!(event_id, EventId::new(7));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(ledger.metrics().duplicates_total.get(), 1);
        assert_eq!(ledger.metrics().registrations_total.get(), 1);

        let all = ledger.list_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].token, first.token);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_verify_scenario() {
        let (ledger, _temp) = create_test_ledger().await;

        let registration = ledger
            .register(UserId::new(1), EventId::new(7))
            .await
            .unwrap();

        let verified = ledger.verify(registration.token.as_str()).await.unwrap();
        assert!(verified.is_verified());
        let verified_at = verified.verification_date().unwrap();
        assert!(verified_at >= registration.registration_date);

        let err = ledger
            .verify(registration.token.as_str())
            .await
            .unwrap_err();
        match err {
            Error::AlreadyVerified { verified_at: first } => assert_eq!(first, verified_at),
            other => panic!("unexpected error: {other:?}"),
        }

        let stored = ledger.get(registration.id).unwrap().unwrap();
        assert_eq!(stored.verification_date(), Some(verified_at));

        let err = ledger.verify("bogus-token").await.unwrap_err();
        assert!(matches!(err, Error::CredentialNotFound));

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_detailed_views_join_directory() {
        let (ledger, _temp) = create_test_ledger().await;

        let user = ledger
            .directory()
            .create_user(NewUser {
                email: "ada@example.com".to_string(),
                full_name: "Ada Lovelace".to_string(),
                is_admin: false,
            })
            .unwrap();
        let event = ledger
            .directory()
            .create_event(NewEvent {
                title: "RustConf".to_string(),
                description: None,
                date: Utc::now(),
                location: Some("Montreal".to_string()),
                max_attendees: None,
            })
            .unwrap();

        let registration = ledger.register(user.id, event.id).await.unwrap();

        let mine = ledger.list_by_user_detailed(user.id).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].user.full_name, "Ada Lovelace");
        assert_eq!(mine[0].event.title, "RustConf");

        let details = ledger
            .verify_detailed(registration.token.as_str())
            .await
            .unwrap();
        assert!(details.registration.is_verified());
        assert_eq!(details.user.id, user.id);

        assert_eq!(ledger.list_all_detailed().unwrap().len(), 1);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_find_by_token_does_not_verify() {
        let (ledger, _temp) = create_test_ledger().await;

        let registration = ledger
            .register(UserId::new(2), EventId::new(3))
            .await
            .unwrap();
        let found = ledger
            .find_by_token(registration.token.as_str())
            .unwrap()
            .unwrap();
        assert!(!found.is_verified());
        assert!(ledger.find_by_token("missing").unwrap().is_none());

        ledger.shutdown().await.unwrap();
    }
}
