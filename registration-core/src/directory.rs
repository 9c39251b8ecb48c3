//! User accounts and event catalogue
//!
//! The ledger treats user and event ids as opaque foreign keys; this module
//! owns the records behind them. It shares the ledger's store.

use crate::{
    error::{Constraint, Error, Result},
    storage::Storage,
    types::{Event, EventId, NewEvent, NewUser, User, UserId},
};
use chrono::{Duration, Utc};
use std::sync::Arc;
use validator::Validate;

/// Default page size for event listings
pub const DEFAULT_EVENT_LIMIT: usize = 100;

/// Email of the account created by [`Directory::seed_sample_data`]
pub const SEED_ADMIN_EMAIL: &str = "admin@example.com";

/// Users and events backed by the registration store
#[derive(Debug, Clone)]
pub struct Directory {
    storage: Arc<Storage>,
}

impl Directory {
    /// Create directory over an open store
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Create user account
    pub fn create_user(&self, new_user: NewUser) -> Result<User> {
        let new_user = NewUser {
            email: new_user.email.trim().to_string(),
            full_name: new_user.full_name.trim().to_string(),
            is_admin: new_user.is_admin,
        };
        new_user.validate()?;

        let email = new_user.email.clone();
        let user = self
            .storage
            .insert_user(new_user, Utc::now())
            .map_err(|e| match e {
                Error::Conflict(Constraint::UserEmail) => Error::EmailAlreadyRegistered(email),
                other => other,
            })?;

        tracing::info!(user_id = %user.id, is_admin = user.is_admin, "User created");
        Ok(user)
    }

    /// Get user by id
    pub fn get_user(&self, id: UserId) -> Result<Option<User>> {
        self.storage.get_user(id)
    }

    /// Get user by id, failing if absent
    pub fn require_user(&self, id: UserId) -> Result<User> {
        self.get_user(id)?.ok_or(Error::UserNotFound(id))
    }

    /// Find user by email (case-insensitive)
    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.storage.find_user_by_email(email)
    }

    /// Create event
    pub fn create_event(&self, new_event: NewEvent) -> Result<Event> {
        let new_event = NewEvent {
            title: new_event.title.trim().to_string(),
            ..new_event
        };
        new_event.validate()?;

        let event = self.storage.insert_event(new_event, Utc::now())?;

        tracing::info!(event_id = %event.id, title = %event.title, "Event created");
        Ok(event)
    }

    /// Get event by id
    pub fn get_event(&self, id: EventId) -> Result<Option<Event>> {
        self.storage.get_event(id)
    }

    /// Get event by id, failing if absent
    pub fn require_event(&self, id: EventId) -> Result<Event> {
        self.get_event(id)?.ok_or(Error::EventNotFound(id))
    }

    /// Page through events
    pub fn list_events(&self, skip: usize, limit: usize) -> Result<Vec<Event>> {
        self.storage.events(skip, limit)
    }

    /// Create the administrator account and a sample event on first start
    ///
    /// Returns `false` if the administrator already exists.
    pub fn seed_sample_data(&self) -> Result<bool> {
        if self.find_user_by_email(SEED_ADMIN_EMAIL)?.is_some() {
            return Ok(false);
        }

        self.create_user(NewUser {
            email: SEED_ADMIN_EMAIL.to_string(),
            full_name: "System Administrator".to_string(),
            is_admin: true,
        })?;

        self.create_event(NewEvent {
            title: "Tech Conference 2024".to_string(),
            description: Some(
                "Annual technology conference featuring latest innovations".to_string(),
            ),
            date: Utc::now() + Duration::days(30),
            location: Some("Convention Center".to_string()),
            max_attendees: Some(100),
        })?;

        tracing::info!(admin = SEED_ADMIN_EMAIL, "Initial data created");
        Ok(true)
    }
}
