//! Request handlers and wire types

use crate::{
    auth::{AdminUser, CurrentUser},
    error::ApiError,
    extractors::{extract_json, extract_path, extract_query},
    notifier::RegistrationConfirmation,
    AppState,
};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use registration_core::{
    directory::DEFAULT_EVENT_LIMIT, Event, EventId, NewEvent, NewUser, Registration,
    RegistrationDetails, StorageStats, User, UserId,
};
use serde::{Deserialize, Serialize};

/// Registration as returned to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationView {
    pub id: u64,
    pub user_id: u64,
    pub event_id: u64,
    pub registration_date: DateTime<Utc>,
    pub qr_code_data: String,
    pub qr_code_image: String,
    pub is_verified: bool,
    pub verification_date: Option<DateTime<Utc>>,
}

impl From<Registration> for RegistrationView {
    fn from(registration: Registration) -> Self {
        Self {
            id: registration.id.get(),
            user_id: registration.user_id.get(),
            event_id: registration.event_id.get(),
            registration_date: registration.registration_date,
            is_verified: registration.is_verified(),
            verification_date: registration.verification_date(),
            qr_code_data: registration.token.into_string(),
            qr_code_image: registration.qr_image,
        }
    }
}

/// Registration joined with its user and event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationWithDetails {
    #[serde(flatten)]
    pub registration: RegistrationView,
    pub user: User,
    pub event: Event,
}

impl From<RegistrationDetails> for RegistrationWithDetails {
    fn from(details: RegistrationDetails) -> Self {
        Self {
            registration: details.registration.into(),
            user: details.user,
            event: details.event,
        }
    }
}

/// Self-service sign-up; the administrator role is never granted here
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub event_id: u64,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub qr_code_data: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub message: String,
    pub user_name: String,
    pub event_title: String,
    pub verified_at: DateTime<Utc>,
    pub registration: RegistrationView,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub skip: usize,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub version: &'static str,
    pub stats: StorageStats,
}

/// Health check with store counters
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let stats = state.ledger.stats()?;
    Ok(Json(HealthResponse {
        status: "healthy",
        service: state.ledger.config().service_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        stats,
    }))
}

/// Prometheus text exposition
pub async fn metrics_handler(State(state): State<AppState>) -> Result<String, ApiError> {
    state
        .ledger
        .metrics()
        .export()
        .map_err(|e| ApiError::Internal(format!("Failed to export metrics: {}", e)))
}

pub async fn create_user(
    State(state): State<AppState>,
    body: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let request = extract_json(body)?;
    let user = state.ledger.directory().create_user(NewUser {
        email: request.email,
        full_name: request.full_name,
        is_admin: false,
    })?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Registrations of one user (the user themselves or an administrator)
pub async fn list_user_registrations(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    path: Result<Path<u64>, PathRejection>,
) -> Result<Json<Vec<RegistrationWithDetails>>, ApiError> {
    let user_id = UserId::new(extract_path(path)?);
    if caller.id != user_id && !caller.is_admin {
        return Err(ApiError::Forbidden("Not enough permissions".to_string()));
    }
    state.ledger.directory().require_user(user_id)?;

    registrations_of(&state, user_id)
}

/// Registrations of the caller
pub async fn my_registrations(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
) -> Result<Json<Vec<RegistrationWithDetails>>, ApiError> {
    registrations_of(&state, caller.id)
}

fn registrations_of(
    state: &AppState,
    user_id: UserId,
) -> Result<Json<Vec<RegistrationWithDetails>>, ApiError> {
    let registrations = state
        .ledger
        .list_by_user_detailed(user_id)?
        .into_iter()
        .map(RegistrationWithDetails::from)
        .collect();
    Ok(Json(registrations))
}

pub async fn list_events(
    State(state): State<AppState>,
    query: Result<Query<EventsQuery>, QueryRejection>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let query = extract_query(query)?;
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_LIMIT);
    let events = state.ledger.directory().list_events(query.skip, limit)?;
    Ok(Json(events))
}

pub async fn create_event(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    body: Result<Json<NewEvent>, JsonRejection>,
) -> Result<(StatusCode, Json<Event>), ApiError> {
    let new_event = extract_json(body)?;
    let event = state.ledger.directory().create_event(new_event)?;
    tracing::info!(event_id = %event.id, admin_id = %admin.id, "Event created by admin");
    Ok((StatusCode::CREATED, Json(event)))
}

/// Register the caller for an event and send the confirmation in the background
pub async fn register_for_event(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegistrationView>), ApiError> {
    let request = extract_json(body)?;
    let event = state
        .ledger
        .directory()
        .require_event(EventId::new(request.event_id))?;

    let registration = state.ledger.register(user.id, event.id).await?;

    let confirmation = RegistrationConfirmation {
        to: user.email,
        user_name: user.full_name,
        event_title: event.title,
        qr_image_base64: registration.qr_image.clone(),
    };
    let notifier = state.notifier.clone();
    let registration_id = registration.id;
    tokio::spawn(async move {
        if let Err(e) = notifier.send_registration_confirmation(&confirmation).await {
            tracing::warn!(
                %registration_id,
                dispatcher = notifier.name(),
                error = %e,
                "Failed to send registration confirmation"
            );
        }
    });

    Ok((StatusCode::CREATED, Json(registration.into())))
}

/// Check a presented credential in at the entrance
pub async fn verify_qr(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let request = extract_json(body)?;
    let token = request.qr_code_data.trim();
    if token.is_empty() {
        return Err(ApiError::BadRequest("qr_code_data must not be empty".to_string()));
    }

    let details = state.ledger.verify_detailed(token).await?;
    let verified_at = details
        .registration
        .verification_date()
        .ok_or_else(|| ApiError::Internal("verified registration without timestamp".to_string()))?;
    tracing::info!(registration_id = %details.registration.id, admin_id = %admin.id, "Checked in");

    Ok(Json(VerifyResponse {
        message: "Registration verified successfully".to_string(),
        user_name: details.user.full_name,
        event_title: details.event.title,
        verified_at,
        registration: details.registration.into(),
    }))
}

pub async fn list_all_registrations(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<RegistrationWithDetails>>, ApiError> {
    let registrations = state
        .ledger
        .list_all_detailed()?
        .into_iter()
        .map(RegistrationWithDetails::from)
        .collect();
    Ok(Json(registrations))
}
