//! Extractor rejection mapping
//!
//! Handlers take `Result<Json<T>, JsonRejection>` (and the path/query
//! equivalents) and unwrap them here, so malformed requests get the same
//! JSON error body as every other failure.

use crate::error::ApiError;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query};
use axum::Json;

/// Unwrap a JSON body, mapping rejections to 400
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    result
        .map(|Json(value)| value)
        .map_err(|err| ApiError::BadRequest(err.body_text()))
}

/// Unwrap path parameters, mapping rejections to 400
pub fn extract_path<T>(result: Result<Path<T>, PathRejection>) -> Result<T, ApiError> {
    result
        .map(|Path(value)| value)
        .map_err(|err| ApiError::BadRequest(err.body_text()))
}

/// Unwrap query parameters, mapping rejections to 400
pub fn extract_query<T>(result: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    result
        .map(|Query(value)| value)
        .map_err(|err| ApiError::BadRequest(err.body_text()))
}
