//! Actor-based concurrency for the ledger
//!
//! All registration writes go through one writer task:
//! - One logical writer serialises inserts and verifications per store
//! - Async message passing with backpressure (bounded mailbox)
//! - Callers that give up never observe partial writes; each write is a
//!   single atomic batch executed by the writer
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │               HTTP handlers (many tasks)              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │               LedgerHandle (Clone)                    │
//! │         Sends messages to actor mailbox              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)                │
//! │                       │                               │
//! │                       ▼                               │
//! │   Storage::insert_registration / mark_verified       │
//! │          (constraint check + atomic write)            │
//! └───────────────────────────────────────────────────────┘
//! ```

use crate::storage::Storage;
use crate::types::{CredentialToken, PendingRegistration, Registration};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Message sent to the ledger actor
#[derive(Debug)]
pub enum LedgerMessage {
    /// Persist a new registration
    Insert {
        pending: PendingRegistration,
        response: oneshot::Sender<Result<Registration>>,
    },

    /// Mark a credential as used
    Verify {
        token: CredentialToken,
        verified_at: DateTime<Utc>,
        response: oneshot::Sender<Result<Registration>>,
    },

    /// Shutdown actor; acknowledged once the actor released the store
    Shutdown { response: oneshot::Sender<()> },
}

/// Actor that processes ledger writes
#[derive(Debug)]
pub struct LedgerActor {
    /// Storage backend
    storage: Arc<Storage>,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(storage: Arc<Storage>, mailbox: mpsc::Receiver<LedgerMessage>) -> Self {
        Self { storage, mailbox }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        let mut shutdown_ack = None;

        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                LedgerMessage::Shutdown { response } => {
                    shutdown_ack = Some(response);
                    break;
                }
                msg => self.handle_message(msg),
            }
        }

        if let Err(e) = self.storage.flush() {
            tracing::error!("Error flushing store on shutdown: {}", e);
        }

        // Release the store before acknowledging so it can be reopened
        drop(self);
        tracing::debug!("Ledger writer stopped");

        if let Some(ack) = shutdown_ack {
            let _ = ack.send(());
        }
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::Insert { pending, response } => {
                let result = self.storage.insert_registration(pending);
                if let Err(ref e) = result {
                    if !e.is_user_facing() && !matches!(e, Error::Conflict(_)) {
                        tracing::error!("Error inserting registration: {}", e);
                    }
                }
                let _ = response.send(result);
            }

            LedgerMessage::Verify {
                token,
                verified_at,
                response,
            } => {
                let result = self.storage.mark_verified(&token, verified_at);
                let _ = response.send(result);
            }

            LedgerMessage::Shutdown { .. } => {
                // Handled in main loop
            }
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Debug, Clone)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> LedgerMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Persist a new registration
    pub async fn insert(&self, pending: PendingRegistration) -> Result<Registration> {
        self.request(|response| LedgerMessage::Insert { pending, response })
            .await
    }

    /// Mark a credential as used
    pub async fn verify(
        &self,
        token: CredentialToken,
        verified_at: DateTime<Utc>,
    ) -> Result<Registration> {
        self.request(|response| LedgerMessage::Verify {
            token,
            verified_at,
            response,
        })
        .await
    }

    /// Shutdown actor and wait until it released the store
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(LedgerMessage::Shutdown { response: tx })
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(storage: Arc<Storage>, mailbox_capacity: usize) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity); // Bounded channel for backpressure
    let actor = LedgerActor::new(storage, rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventId, UserId};
    use crate::Config;

    fn open_storage() -> (Arc<Storage>, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Arc::new(Storage::open(&config).unwrap()), temp_dir)
    }

    fn pending(user: u64, event: u64, token: &str) -> PendingRegistration {
        PendingRegistration {
            user_id: UserId::new(user),
            event_id: EventId::new(event),
            registration_date: Utc::now(),
            token: CredentialToken::new(token),
            qr_image: String::new(),
        }
    }

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let (storage, _temp) = open_storage();
        let handle = spawn_ledger_actor(storage.clone(), 16);

        handle.shutdown().await.unwrap();

        // Actor released its reference before acknowledging
        assert_eq!(Arc::strong_count(&storage), 1);
    }

    #[tokio::test]
    async fn test_actor_insert_and_verify() {
        let (storage, _temp) = open_storage();
        let handle = spawn_ledger_actor(storage.clone(), 16);

        let inserted = handle.insert(pending(1, 7, "tok")).await.unwrap();
        assert!(!inserted.is_verified());

        let verified = handle
            .verify(CredentialToken::new("tok"), Utc::now())
            .await
            .unwrap();
        assert_eq!(verified.id, inserted.id);
        assert!(verified.is_verified());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_surfaces_conflict() {
        let (storage, _temp) = open_storage();
        let handle = spawn_ledger_actor(storage, 16);

        handle.insert(pending(1, 7, "a")).await.unwrap();
        let err = handle.insert(pending(1, 7, "b")).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_requests_after_shutdown_fail() {
        let (storage, _temp) = open_storage();
        let handle = spawn_ledger_actor(storage, 16);
        handle.shutdown().await.unwrap();

        let err = handle.insert(pending(1, 1, "late")).await.unwrap_err();
        assert!(matches!(err, Error::Concurrency(_)));
    }
}
