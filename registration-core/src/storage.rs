//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `registrations` - Registration records (key: registration_id, big-endian)
//! - `tokens` - Credential token index (key: token, value: registration_id)
//! - `indices` - Secondary indices (pair uniqueness, per-user listing, email)
//! - `users` - User accounts (key: user_id)
//! - `events` - Event catalogue (key: event_id)
//! - `meta` - Id sequences
//!
//! # Constraints
//!
//! Every check-then-write sequence runs under the store's write guard and
//! commits as a single `WriteBatch`, so the uniqueness constraints hold no
//! matter how many callers race on the same key.

use crate::{
    error::{Constraint, Error, Result},
    types::{
        CredentialToken, Event, EventId, NewEvent, NewUser, PendingRegistration, Registration,
        RegistrationId, User, UserId, VerificationState,
    },
    Config,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode,
    Options, WriteBatch, DB,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Column family names
const CF_REGISTRATIONS: &str = "registrations";
const CF_TOKENS: &str = "tokens";
const CF_INDICES: &str = "indices";
const CF_USERS: &str = "users";
const CF_EVENTS: &str = "events";
const CF_META: &str = "meta";

/// Index key prefixes (in `indices`)
const IDX_PAIR: u8 = b'p';
const IDX_USER_REGISTRATION: u8 = b'u';
const IDX_EMAIL: u8 = b'e';

/// Sequence keys (in `meta`)
const SEQ_REGISTRATIONS: &[u8] = b"seq/registrations";
const SEQ_USERS: &[u8] = b"seq/users";
const SEQ_EVENTS: &[u8] = b"seq/events";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,

    /// Serialises constraint checks with their write batch
    write_guard: Mutex<()>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.db.path())
            .finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        // Database options
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
        db_opts.set_compaction_style(DBCompactionStyle::Level);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_REGISTRATIONS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_TOKENS, Self::cf_options_lookup()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_lookup()),
            ColumnFamilyDescriptor::new(CF_USERS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_EVENTS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened registration store");

        Ok(Self {
            db: Arc::new(db),
            write_guard: Mutex::new(()),
        })
    }

    // Column family options

    fn cf_options_records() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_lookup() -> Options {
        let mut opts = Options::default();
        // Point lookups on every write, use LZ4 + bloom filters
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    // Helper: get column family handle

    fn cf_handle(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    fn get_record<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf_handle(cf_name)?;
        match self.db.get_cf(&cf, key)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    fn scan_records<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf_handle(cf_name)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item?;
            records.push(bincode::deserialize(&value)?);
        }
        Ok(records)
    }

    /// Allocate the next id of a sequence; the bump is written with `batch`
    fn next_sequence(&self, batch: &mut WriteBatch, name: &[u8]) -> Result<u64> {
        let next = self.sequence_value(name)? + 1;
        let cf_meta = self.cf_handle(CF_META)?;
        batch.put_cf(&cf_meta, name, next.to_be_bytes());
        Ok(next)
    }

    fn sequence_value(&self, name: &[u8]) -> Result<u64> {
        let cf_meta = self.cf_handle(CF_META)?;
        match self.db.get_cf(&cf_meta, name)? {
            Some(value) => decode_u64(&value),
            None => Ok(0),
        }
    }

    // Registration operations

    /// Insert a new registration (atomic, constraint-checked)
    ///
    /// Fails with `Error::Conflict` if the (user, event) pair or the token is
    /// already taken. Nothing is written in that case.
    pub fn insert_registration(&self, pending: PendingRegistration) -> Result<Registration> {
        let _guard = self.write_guard.lock();

        let cf_indices = self.cf_handle(CF_INDICES)?;
        let cf_tokens = self.cf_handle(CF_TOKENS)?;
        let cf_registrations = self.cf_handle(CF_REGISTRATIONS)?;

        let pair_key = Self::index_key_pair(pending.user_id, pending.event_id);
        if self.db.get_cf(&cf_indices, &pair_key)?.is_some() {
            return Err(Error::Conflict(Constraint::UserEvent));
        }

        let token_key = pending.token.as_str().as_bytes().to_vec();
        if self.db.get_cf(&cf_tokens, &token_key)?.is_some() {
            return Err(Error::Conflict(Constraint::Token));
        }

        let mut batch = WriteBatch::default();
        let id = RegistrationId::new(self.next_sequence(&mut batch, SEQ_REGISTRATIONS)?);
        let registration = pending.into_registration(id);

        // 1. Record
        batch.put_cf(&cf_registrations, id.to_key(), bincode::serialize(&registration)?);

        // 2. Token -> id
        batch.put_cf(&cf_tokens, &token_key, id.to_key());

        // 3. Pair -> id (uniqueness)
        batch.put_cf(&cf_indices, &pair_key, id.to_key());

        // 4. user || id -> empty (per-user listing)
        let user_key = Self::index_key_user_registration(registration.user_id, Some(id));
        batch.put_cf(&cf_indices, &user_key, b"");

        // Atomic commit
        self.db.write(batch)?;

        tracing::debug!(
            registration_id = %id,
            user_id = %registration.user_id,
            event_id = %registration.event_id,
            "Registration inserted"
        );

        Ok(registration)
    }

    /// Get registration by id
    pub fn get_registration(&self, id: RegistrationId) -> Result<Option<Registration>> {
        self.get_record(CF_REGISTRATIONS, &id.to_key())
    }

    /// Find registration by (user, event)
    pub fn find_registration_by_pair(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> Result<Option<Registration>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let pair_key = Self::index_key_pair(user_id, event_id);

        match self.db.get_cf(&cf_indices, &pair_key)? {
            Some(value) => self.resolve_index(&value),
            None => Ok(None),
        }
    }

    /// Find registration by credential token
    pub fn find_registration_by_token(
        &self,
        token: &CredentialToken,
    ) -> Result<Option<Registration>> {
        let cf_tokens = self.cf_handle(CF_TOKENS)?;

        match self.db.get_cf(&cf_tokens, token.as_str().as_bytes())? {
            Some(value) => self.resolve_index(&value),
            None => Ok(None),
        }
    }

    fn resolve_index(&self, value: &[u8]) -> Result<Option<Registration>> {
        let id = RegistrationId::new(decode_u64(value)?);
        let registration = self.get_registration(id)?.ok_or_else(|| {
            Error::Storage(format!("Index points at missing registration {}", id))
        })?;
        Ok(Some(registration))
    }

    /// Mark a registration verified (atomic, one-way)
    ///
    /// Fails with `CredentialNotFound` for unknown tokens and with
    /// `AlreadyVerified` (carrying the original timestamp) if the credential
    /// was used before. The stored record is untouched on failure.
    pub fn mark_verified(
        &self,
        token: &CredentialToken,
        verified_at: DateTime<Utc>,
    ) -> Result<Registration> {
        let _guard = self.write_guard.lock();

        let mut registration = self
            .find_registration_by_token(token)?
            .ok_or(Error::CredentialNotFound)?;

        if let VerificationState::Verified { at } = registration.verification {
            return Err(Error::AlreadyVerified { verified_at: at });
        }

        registration.verification = VerificationState::Verified { at: verified_at };

        let cf_registrations = self.cf_handle(CF_REGISTRATIONS)?;
        self.db.put_cf(
            &cf_registrations,
            registration.id.to_key(),
            bincode::serialize(&registration)?,
        )?;

        tracing::debug!(
            registration_id = %registration.id,
            verified_at = %verified_at,
            "Registration verified"
        );

        Ok(registration)
    }

    /// Registrations of one user, insertion order
    pub fn registrations_for_user(&self, user_id: UserId) -> Result<Vec<Registration>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let prefix = Self::index_key_user_registration(user_id, None);

        let iter = self
            .db
            .iterator_cf(&cf_indices, IteratorMode::From(prefix.as_slice(), Direction::Forward));

        let mut registrations = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }

            // Extract registration id from key (last 8 bytes)
            let id = RegistrationId::new(decode_u64(&key[prefix.len()..])?);
            if let Some(registration) = self.get_registration(id)? {
                registrations.push(registration);
            }
        }

        Ok(registrations)
    }

    /// All registrations, insertion order
    pub fn all_registrations(&self) -> Result<Vec<Registration>> {
        self.scan_records(CF_REGISTRATIONS)
    }

    // User operations

    /// Insert user (email uniqueness enforced, case-insensitive)
    pub fn insert_user(&self, new_user: NewUser, created_at: DateTime<Utc>) -> Result<User> {
        let _guard = self.write_guard.lock();

        let cf_indices = self.cf_handle(CF_INDICES)?;
        let cf_users = self.cf_handle(CF_USERS)?;

        let email_key = Self::index_key_email(&new_user.email);
        if self.db.get_cf(&cf_indices, &email_key)?.is_some() {
            return Err(Error::Conflict(Constraint::UserEmail));
        }

        let mut batch = WriteBatch::default();
        let id = UserId::new(self.next_sequence(&mut batch, SEQ_USERS)?);
        let user = User {
            id,
            email: new_user.email,
            full_name: new_user.full_name,
            is_admin: new_user.is_admin,
            created_at,
        };

        batch.put_cf(&cf_users, id.to_key(), bincode::serialize(&user)?);
        batch.put_cf(&cf_indices, &email_key, id.to_key());
        self.db.write(batch)?;

        Ok(user)
    }

    /// Get user by id
    pub fn get_user(&self, id: UserId) -> Result<Option<User>> {
        self.get_record(CF_USERS, &id.to_key())
    }

    /// Find user by email (case-insensitive)
    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;

        match self.db.get_cf(&cf_indices, Self::index_key_email(email))? {
            Some(value) => self.get_user(UserId::new(decode_u64(&value)?)),
            None => Ok(None),
        }
    }

    // Event operations

    /// Insert event
    pub fn insert_event(&self, new_event: NewEvent, created_at: DateTime<Utc>) -> Result<Event> {
        let _guard = self.write_guard.lock();

        let cf_events = self.cf_handle(CF_EVENTS)?;

        let mut batch = WriteBatch::default();
        let id = EventId::new(self.next_sequence(&mut batch, SEQ_EVENTS)?);
        let event = Event {
            id,
            title: new_event.title,
            description: new_event.description,
            date: new_event.date,
            location: new_event.location,
            max_attendees: new_event.max_attendees,
            created_at,
        };

        batch.put_cf(&cf_events, id.to_key(), bincode::serialize(&event)?);
        self.db.write(batch)?;

        Ok(event)
    }

    /// Get event by id
    pub fn get_event(&self, id: EventId) -> Result<Option<Event>> {
        self.get_record(CF_EVENTS, &id.to_key())
    }

    /// Page through events, insertion order
    pub fn events(&self, skip: usize, limit: usize) -> Result<Vec<Event>> {
        let cf_events = self.cf_handle(CF_EVENTS)?;

        let mut events = Vec::new();
        for item in self
            .db
            .iterator_cf(&cf_events, IteratorMode::Start)
            .skip(skip)
            .take(limit)
        {
            let (_, value) = item?;
            events.push(bincode::deserialize(&value)?);
        }

        Ok(events)
    }

    // Index key helpers

    fn index_key_pair(user_id: UserId, event_id: EventId) -> Vec<u8> {
        let mut key = Vec::with_capacity(17);
        key.push(IDX_PAIR);
        key.extend_from_slice(&user_id.to_key());
        key.extend_from_slice(&event_id.to_key());
        key
    }

    fn index_key_user_registration(user_id: UserId, id: Option<RegistrationId>) -> Vec<u8> {
        let mut key = Vec::with_capacity(17);
        key.push(IDX_USER_REGISTRATION);
        key.extend_from_slice(&user_id.to_key());
        if let Some(id) = id {
            key.extend_from_slice(&id.to_key());
        }
        key
    }

    fn index_key_email(email: &str) -> Vec<u8> {
        let normalized = email.trim().to_lowercase();
        let mut key = Vec::with_capacity(normalized.len() + 1);
        key.push(IDX_EMAIL);
        key.extend_from_slice(normalized.as_bytes());
        key
    }

    // Statistics

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            total_registrations: self.sequence_value(SEQ_REGISTRATIONS)?,
            total_users: self.sequence_value(SEQ_USERS)?,
            total_events: self.sequence_value(SEQ_EVENTS)?,
        })
    }

    /// Flush memtables to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn decode_u64(bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::Storage(format!("Corrupt id: expected 8 bytes, got {}", bytes.len())))?;
    Ok(u64::from_be_bytes(raw))
}

/// Storage statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct StorageStats {
    /// Registrations ever created
    pub total_registrations: u64,
    /// User accounts
    pub total_users: u64,
    /// Events in the catalogue
    pub total_events: u64,
}
