use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    routing,
};
use rearch::Container;
use tracing::instrument;

use crate::{
    api::{ApiError, ApiResponse, CurrentUser},
    comment_service::{
        Comment, CommentError, CommentPayload, CommentWithOwner, ListCommentsParams,
        comment_service_capsule,
    },
    pagination::Page,
};

pub fn router() -> Router<Container> {
    Router::new()
        .route(
            "/api/v1/comments/{video_id}",
            routing::get(list_comments).post(add_comment),
        )
        .route(
            "/api/v1/comments/c/{comment_id}",
            routing::patch(update_comment).delete(delete_comment),
        )
}

impl From<CommentError> for ApiError {
    fn from(error: CommentError) -> Self {
        match error {
            CommentError::Validation(error) => Self::from(error),
            CommentError::VideoNotFound | CommentError::NotFound => Self::not_found(error),
            CommentError::Internal(_) => Self::internal(&error),
        }
    }
}

#[instrument(skip(container))]
async fn list_comments(
    State(container): State<Container>,
    Path(video_id): Path<String>,
    Query(params): Query<ListCommentsParams>,
) -> Result<ApiResponse<Page<CommentWithOwner>>, ApiError> {
    let comments = container
        .read(comment_service_capsule)
        .list_comments(&video_id, params)
        .await?;
    let message = if comments.total_docs == 0 {
        "No comments found"
    } else {
        "Comments fetched successfully"
    };
    Ok(ApiResponse::ok(comments, message))
}

#[instrument(skip(container))]
async fn add_comment(
    State(container): State<Container>,
    CurrentUser(owner): CurrentUser,
    Path(video_id): Path<String>,
    payload: Result<Json<CommentPayload>, JsonRejection>,
) -> Result<ApiResponse<Comment>, ApiError> {
    let Json(payload) = payload?;
    let comment = container
        .read(comment_service_capsule)
        .add_comment(owner, &video_id, payload)
        .await?;
    Ok(ApiResponse::new(
        StatusCode::CREATED,
        comment,
        "Comment added successfully",
    ))
}

#[instrument(skip(container))]
async fn update_comment(
    State(container): State<Container>,
    Path(comment_id): Path<String>,
    payload: Result<Json<CommentPayload>, JsonRejection>,
) -> Result<ApiResponse<Comment>, ApiError> {
    let Json(payload) = payload?;
    let comment = container
        .read(comment_service_capsule)
        .update_comment(&comment_id, payload)
        .await?;
    Ok(ApiResponse::ok(comment, "Comment updated successfully"))
}

#[instrument(skip(container))]
async fn delete_comment(
    State(container): State<Container>,
    Path(comment_id): Path<String>,
) -> Result<ApiResponse<Comment>, ApiError> {
    let comment = container
        .read(comment_service_capsule)
        .delete_comment(&comment_id)
        .await?;
    Ok(ApiResponse::ok(comment, "Comment deleted successfully"))
}
