//! HTTP surface of the event registration ledger
//!
//! Exposes user/event management, registration with emailed QR credentials
//! and the admin check-in endpoint.

#![forbid(unsafe_code)]

pub mod auth;
pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod notifier;
pub mod telemetry;

use axum::{
    routing::{get, post},
    Router,
};
use registration_core::Ledger;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use auth::{AdminUser, CurrentUser, USER_ID_HEADER};
pub use config::{ServerConfig, SmtpConfig};
pub use error::ApiError;
pub use notifier::{
    dispatcher_from_config, DispatchMode, LogDispatcher, NotificationDispatcher, RecordingDispatcher,
    RegistrationConfirmation, SmtpDispatcher,
};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub notifier: Arc<dyn NotificationDispatcher>,
}

impl AppState {
    pub fn new(ledger: Arc<Ledger>, notifier: Arc<dyn NotificationDispatcher>) -> Self {
        Self { ledger, notifier }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/users", post(handlers::create_user))
        .route(
            "/users/:user_id/registrations",
            get(handlers::list_user_registrations),
        )
        .route(
            "/events",
            get(handlers::list_events).post(handlers::create_event),
        )
        .route("/registrations", post(handlers::register_for_event))
        .route("/my-registrations", get(handlers::my_registrations))
        .route("/admin/verify-qr", post(handlers::verify_qr))
        .route("/admin/registrations", get(handlers::list_all_registrations))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
