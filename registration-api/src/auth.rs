//! Caller identity
//!
//! Authentication happens upstream (gateway or identity provider), which
//! forwards the authenticated user id in [`USER_ID_HEADER`]. Handlers
//! resolve it through the directory with [`CurrentUser`] or [`AdminUser`].

use crate::{error::ApiError, AppState};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use registration_core::{User, UserId};

/// Header carrying the authenticated user id
pub const USER_ID_HEADER: &str = "x-user-id";

/// Authenticated caller
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Authenticated caller holding the administrator role
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("Not authenticated".to_string()))?;

        let user_id = header
            .to_str()
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok())
            .ok_or_else(|| ApiError::Unauthorized("Could not validate credentials".to_string()))?;

        let user = state
            .ledger
            .directory()
            .get_user(UserId::new(user_id))?
            .ok_or_else(|| ApiError::Unauthorized("Could not validate credentials".to_string()))?;

        Ok(CurrentUser(user))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            tracing::warn!(user_id = %user.id, "Non-admin caller rejected");
            return Err(ApiError::Forbidden("Not enough permissions".to_string()));
        }
        Ok(AdminUser(user))
    }
}
