use axum::{
    Json,
    extract::{Path, Query, State, rejection::QueryRejection},
};
use http::StatusCode;
use serde_json::Value;
use tracing::info;

use super::{AppState, envelope};
use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::store::{PageParams, PaginatedQuery, UserRepository};
use crate::types::UserId;

/// GET /v1/users/{id}
pub async fn get_user(
    State(state): State<AppState>,
    CurrentUser(_viewer): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let user = state.storage.users.get_by_id(&UserId::new(id)).await?;
    Ok(envelope(user))
}

/// PUT /v1/users/{id}/follow
pub async fn follow_user(
    State(state): State<AppState>,
    CurrentUser(follower): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let followee = UserId::new(id);
    if followee == follower.id {
        return Err(ApiError::Validation("users cannot follow themselves".to_string()));
    }
    state.storage.users.get_by_id(&followee).await?;

    state.storage.follows.follow(&follower.id, &followee).await?;
    info!(follower = %follower.id, followee = %followee, "followed user");
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /v1/users/{id}/unfollow
pub async fn unfollow_user(
    State(state): State<AppState>,
    CurrentUser(follower): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let followee = UserId::new(id);
    state.storage.follows.unfollow(&follower.id, &followee).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/users/feed?limit&offset&sort
pub async fn get_feed(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    params: Result<Query<PageParams>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::Validation(e.body_text()))?;
    let page = PaginatedQuery::try_from(params)?;
    let feed = state.storage.posts.feed(&user.id, page).await?;
    Ok(envelope(feed))
}
