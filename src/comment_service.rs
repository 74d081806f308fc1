use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use rearch::CapsuleHandle;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    comment_repo::{CommentRepository, NewComment, comment_repository_capsule},
    orm::comment,
    pagination::{Page, PageRequest},
    user_repo::{OwnerSummary, UserRepository, lookup_owners, user_repository_capsule},
    validation::{ValidationError, parse_id, require_text},
    video_repo::{VideoRepository, video_repository_capsule},
};

#[derive(Debug, Default, Deserialize)]
pub struct ListCommentsParams {
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CommentPayload {
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub content: String,
    pub video: Uuid,
    pub owner: Uuid,
    pub created_at: String,
    pub updated_at: String,
}

/// A comment as listed under its video.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentWithOwner {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub content: String,
    pub owner: Option<OwnerSummary>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Error)]
pub enum CommentError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Video not found")]
    VideoNotFound,
    #[error("Comment not found")]
    NotFound,
    #[error("internal/database error: {0}")]
    Internal(anyhow::Error),
}

pub fn comment_service_capsule(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> Arc<dyn CommentService> {
    let comment_repo = Arc::clone(get.as_ref(comment_repository_capsule));
    let video_repo = Arc::clone(get.as_ref(video_repository_capsule));
    let user_repo = Arc::clone(get.as_ref(user_repository_capsule));
    Arc::new(CommentServiceImpl {
        comment_repo,
        video_repo,
        user_repo,
    })
}

#[async_trait]
pub trait CommentService: Send + Sync {
    async fn list_comments(
        &self,
        video_id: &str,
        params: ListCommentsParams,
    ) -> Result<Page<CommentWithOwner>, CommentError>;
    async fn add_comment(
        &self,
        owner: Uuid,
        video_id: &str,
        payload: CommentPayload,
    ) -> Result<Comment, CommentError>;
    async fn update_comment(
        &self,
        comment_id: &str,
        payload: CommentPayload,
    ) -> Result<Comment, CommentError>;
    async fn delete_comment(&self, comment_id: &str) -> Result<Comment, CommentError>;
}

struct CommentServiceImpl {
    comment_repo: Arc<dyn CommentRepository>,
    video_repo: Arc<dyn VideoRepository>,
    user_repo: Arc<dyn UserRepository>,
}

#[async_trait]
impl CommentService for CommentServiceImpl {
    #[instrument(skip(self))]
    async fn list_comments(
        &self,
        video_id: &str,
        params: ListCommentsParams,
    ) -> Result<Page<CommentWithOwner>, CommentError> {
        let video = parse_id("videoId", video_id)?;
        let page = PageRequest::parse(params.page.as_deref(), params.limit.as_deref())
            .map_err(ValidationError::from)?;

        let comments = self
            .comment_repo
            .list_comments(video, page)
            .await
            .map_err(CommentError::Internal)?;
        let owners = lookup_owners(
            self.user_repo.as_ref(),
            comments.docs.iter().map(|comment| comment.owner),
        )
        .await
        .map_err(CommentError::Internal)?;

        comments
            .try_map(|comment| {
                let owner = owners.get(&comment.owner).cloned();
                let comment = Comment::try_from(comment)?;
                anyhow::Ok(CommentWithOwner {
                    id: comment.id,
                    content: comment.content,
                    owner,
                    created_at: comment.created_at,
                    updated_at: comment.updated_at,
                })
            })
            .context("Failed to convert listed comments into external format")
            .map_err(CommentError::Internal)
    }

    #[instrument(skip(self))]
    async fn add_comment(
        &self,
        owner: Uuid,
        video_id: &str,
        payload: CommentPayload,
    ) -> Result<Comment, CommentError> {
        let video = parse_id("videoId", video_id)?;
        let content = require_text("content", payload.content.as_deref())?;

        if self
            .video_repo
            .find_video(video)
            .await
            .map_err(CommentError::Internal)?
            .is_none()
        {
            return Err(CommentError::VideoNotFound);
        }

        self.comment_repo
            .create_comment(NewComment {
                content,
                video,
                owner,
            })
            .await
            .map_err(CommentError::Internal)?
            .try_into()
            .context("Failed to convert new comment into external format")
            .map_err(CommentError::Internal)
    }

    #[instrument(skip(self))]
    async fn update_comment(
        &self,
        comment_id: &str,
        payload: CommentPayload,
    ) -> Result<Comment, CommentError> {
        let id = parse_id("commentId", comment_id)?;
        let content = require_text("content", payload.content.as_deref())?;

        self.comment_repo
            .update_comment(id, content)
            .await
            .map_err(CommentError::Internal)?
            .ok_or(CommentError::NotFound)?
            .try_into()
            .context("Failed to convert updated comment into external format")
            .map_err(CommentError::Internal)
    }

    #[instrument(skip(self))]
    async fn delete_comment(&self, comment_id: &str) -> Result<Comment, CommentError> {
        let id = parse_id("commentId", comment_id)?;

        self.comment_repo
            .delete_comment(id)
            .await
            .map_err(CommentError::Internal)?
            .ok_or(CommentError::NotFound)?
            .try_into()
            .context("Failed to convert deleted comment into external format")
            .map_err(CommentError::Internal)
    }
}

impl TryFrom<comment::Model> for Comment {
    type Error = anyhow::Error;

    fn try_from(comment: comment::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: comment.id,
            content: comment.content,
            video: comment.video,
            owner: comment.owner,
            created_at: comment
                .created_at
                .format(&Rfc3339)
                .context("Failed to format creation timestamp")?,
            updated_at: comment
                .updated_at
                .format(&Rfc3339)
                .context("Failed to format update timestamp")?,
        })
    }
}
