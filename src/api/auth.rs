use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    response::IntoResponse,
};
use http::StatusCode;
use serde::Deserialize;

use super::{AppState, envelope};
use crate::accounts::{PASSWORD_MAX_CHARS, RegistrationRequest, is_valid_email};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateTokenPayload {
    pub email: String,
    pub password: String,
}

/// POST /v1/authentication/user
pub async fn register_user(
    State(state): State<AppState>,
    payload: Result<Json<RegistrationRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;

    let registration = state.accounts.register(request).await?;
    Ok((StatusCode::CREATED, envelope(registration)))
}

/// PUT /v1/users/activate/{token}
pub async fn activate_user(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.accounts.activate(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/authentication/token
pub async fn create_token(
    State(state): State<AppState>,
    payload: Result<Json<CreateTokenPayload>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;
    if !is_valid_email(&payload.email)
        || payload.password.is_empty()
        || payload.password.chars().count() > PASSWORD_MAX_CHARS
    {
        return Err(ApiError::Validation("email and password are required".to_string()));
    }

    let token = state.issuer.issue(&payload.email, &payload.password).await?;
    Ok((StatusCode::CREATED, envelope(token)))
}
