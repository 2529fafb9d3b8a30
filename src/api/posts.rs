use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    response::IntoResponse,
};
use http::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::{AppState, envelope};
use crate::auth::{CurrentUser, authorize_post_mutation};
use crate::error::ApiError;
use crate::model::{Post, ROLE_ADMIN, ROLE_MODERATOR, User};
use crate::store::{NewPost, PostPatch};
use crate::types::PostId;

pub const TITLE_MAX_CHARS: usize = 100;
pub const CONTENT_MAX_CHARS: usize = 1000;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePostPayload {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePostPayload {
    pub title: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCommentPayload {
    pub content: String,
}

fn check_length(field: &str, value: &str, max: usize) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::Validation(format!("{} is required", field)));
    }
    if value.chars().count() > max {
        return Err(ApiError::Validation(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(())
}

fn json_payload<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(inner)| inner)
        .map_err(|e| ApiError::Validation(e.body_text()))
}

/// Load a post and check that `user` may mutate it with at least `role`.
async fn load_for_mutation(state: &AppState, user: &User, id: PostId, role: &str) -> Result<Post, ApiError> {
    let post = state.storage.posts.get_by_id(&id).await?;
    let required = state.storage.roles.get_by_name(role).await?;

    if !authorize_post_mutation(user, &post, &required) {
        debug!(user_id = %user.id, post_id = %post.id, required = role, "post mutation forbidden");
        return Err(ApiError::Forbidden);
    }
    Ok(post)
}

/// POST /v1/posts
pub async fn create_post(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<CreatePostPayload>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = json_payload(payload)?;
    check_length("title", &payload.title, TITLE_MAX_CHARS)?;
    check_length("content", &payload.content, CONTENT_MAX_CHARS)?;

    let post = state
        .storage
        .posts
        .create(
            &user.id,
            NewPost {
                title: payload.title,
                content: payload.content,
                tags: payload.tags,
            },
        )
        .await?;
    info!(post_id = %post.id, user_id = %user.id, "created post");
    Ok((StatusCode::CREATED, envelope(post)))
}

/// GET /v1/posts/{id}, with comments
pub async fn get_post(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let mut post = state.storage.posts.get_by_id(&PostId::new(id)).await?;
    post.comments = state.storage.comments.list_by_post(&post.id).await?;
    Ok(envelope(post))
}

/// PATCH /v1/posts/{id}; owner or moderator
pub async fn update_post(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    payload: Result<Json<UpdatePostPayload>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let payload = json_payload(payload)?;
    if let Some(title) = &payload.title {
        check_length("title", title, TITLE_MAX_CHARS)?;
    }
    if let Some(content) = &payload.content {
        check_length("content", content, CONTENT_MAX_CHARS)?;
    }

    let post = load_for_mutation(&state, &user, PostId::new(id), ROLE_MODERATOR).await?;
    let updated = state
        .storage
        .posts
        .update(
            &post.id,
            PostPatch {
                title: payload.title,
                content: payload.content,
            },
        )
        .await?;
    Ok(envelope(updated))
}

/// DELETE /v1/posts/{id}; owner or admin
pub async fn delete_post(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let post = load_for_mutation(&state, &user, PostId::new(id), ROLE_ADMIN).await?;
    state.storage.posts.delete(&post.id).await?;
    info!(post_id = %post.id, user_id = %user.id, "deleted post");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/posts/{id}/comments
pub async fn create_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    payload: Result<Json<CreateCommentPayload>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = json_payload(payload)?;
    check_length("content", &payload.content, CONTENT_MAX_CHARS)?;

    let post = state.storage.posts.get_by_id(&PostId::new(id)).await?;
    let comment = state
        .storage
        .comments
        .create(&post.id, &user.id, payload.content)
        .await?;
    Ok((StatusCode::CREATED, envelope(comment)))
}
