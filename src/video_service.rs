use std::{collections::HashMap, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use rearch::CapsuleHandle;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    media::{MediaUploader, StagedFile, UploadError, media_uploader_capsule, upload_staged},
    orm::video,
    pagination::{Page, PageRequest},
    user_repo::{OwnerSummary, UserRepository, lookup_owners, user_repository_capsule},
    validation::{ValidationError, optional_text, parse_id, require_text},
    video_repo::{
        NewVideo, SortDirection, VideoChanges, VideoListQuery, VideoRepository, VideoSort,
        VideoSortField, video_repository_capsule,
    },
};

/// Query string of a video listing, exactly as the client sent it.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListVideosParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub query: Option<String>,
    pub sort_by: Option<String>,
    pub sort_type: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Default)]
pub struct PublishVideoInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub video_file: Option<StagedFile>,
    pub thumbnail: Option<StagedFile>,
}

#[derive(Debug, Default)]
pub struct UpdateVideoInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub thumbnail: Option<StagedFile>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub video_file: String,
    pub thumbnail: String,
    pub title: String,
    pub description: String,
    pub duration: f64,
    pub views: i64,
    pub is_published: bool,
    pub owner: Uuid,
    /// Timestamp in ISO-8601 format
    pub created_at: String,
    /// Timestamp in ISO-8601 format
    pub updated_at: String,
}

/// A listed video, with its owner resolved.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoWithOwner {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub video_file: String,
    pub thumbnail: String,
    pub title: String,
    pub description: String,
    pub duration: f64,
    pub views: i64,
    pub is_published: bool,
    /// [`None`] when the owning user no longer exists.
    pub owner: Option<OwnerSummary>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Error)]
pub enum VideoError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("No videos found")]
    NoneFound,
    #[error("Video not found")]
    NotFound,
    #[error("failed to upload {asset}: {source}")]
    Upload {
        asset: &'static str,
        #[source]
        source: UploadError,
    },
    #[error("internal/database error: {0}")]
    Internal(anyhow::Error), // NOTE: no #[from] so we have to be explicit
}

pub fn video_service_capsule(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> Arc<dyn VideoService> {
    let video_repo = Arc::clone(get.as_ref(video_repository_capsule));
    let user_repo = Arc::clone(get.as_ref(user_repository_capsule));
    let uploader = Arc::clone(get.as_ref(media_uploader_capsule));
    Arc::new(VideoServiceImpl {
        video_repo,
        user_repo,
        uploader,
    })
}

#[async_trait]
pub trait VideoService: Send + Sync {
    async fn list_videos(
        &self,
        params: ListVideosParams,
    ) -> Result<Page<VideoWithOwner>, VideoError>;
    async fn publish_video(
        &self,
        owner: Uuid,
        input: PublishVideoInput,
    ) -> Result<Video, VideoError>;
    async fn get_video(&self, video_id: &str) -> Result<Video, VideoError>;
    async fn update_video(
        &self,
        video_id: &str,
        input: UpdateVideoInput,
    ) -> Result<Video, VideoError>;
    async fn delete_video(&self, video_id: &str) -> Result<Video, VideoError>;
    async fn toggle_publish(&self, video_id: &str) -> Result<Video, VideoError>;
}

struct VideoServiceImpl {
    video_repo: Arc<dyn VideoRepository>,
    user_repo: Arc<dyn UserRepository>,
    uploader: Arc<dyn MediaUploader>,
}

/// Sorting only applies when both the field and the direction are given.
fn parse_sort(sort_by: Option<&str>, sort_type: Option<&str>) -> Result<VideoSort, ValidationError> {
    let (Some(sort_by), Some(sort_type)) = (optional_text(sort_by), optional_text(sort_type))
    else {
        return Ok(VideoSort::default());
    };

    let field = match sort_by.as_str() {
        "title" => VideoSortField::Title,
        "duration" => VideoSortField::Duration,
        "views" => VideoSortField::Views,
        "createdAt" => VideoSortField::CreatedAt,
        "updatedAt" => VideoSortField::UpdatedAt,
        _ => return Err(ValidationError::UnknownSortField(sort_by)),
    };
    let direction = match sort_type.to_ascii_lowercase().as_str() {
        "asc" => SortDirection::Asc,
        "desc" => SortDirection::Desc,
        _ => return Err(ValidationError::UnknownSortDirection(sort_type)),
    };
    Ok(VideoSort { field, direction })
}

impl VideoServiceImpl {
    async fn upload(&self, asset: &'static str, file: StagedFile) -> Result<String, VideoError> {
        upload_staged(self.uploader.as_ref(), file)
            .await
            .map(|media| media.url.into())
            .map_err(|source| VideoError::Upload { asset, source })
    }
}

#[async_trait]
impl VideoService for VideoServiceImpl {
    #[instrument(skip(self))]
    async fn list_videos(
        &self,
        params: ListVideosParams,
    ) -> Result<Page<VideoWithOwner>, VideoError> {
        let user_id = require_text("userId", params.user_id.as_deref())?;
        let query = VideoListQuery {
            owner: parse_id("userId", &user_id)?,
            search: optional_text(params.query.as_deref()),
            sort: parse_sort(params.sort_by.as_deref(), params.sort_type.as_deref())?,
            page: PageRequest::parse(params.page.as_deref(), params.limit.as_deref())
                .map_err(ValidationError::from)?,
        };

        let videos = self
            .video_repo
            .list_videos(query)
            .await
            .map_err(VideoError::Internal)?;
        if videos.total_docs == 0 {
            return Err(VideoError::NoneFound);
        }

        let owners = lookup_owners(
            self.user_repo.as_ref(),
            videos.docs.iter().map(|video| video.owner),
        )
        .await
        .map_err(VideoError::Internal)?;

        videos
            .try_map(|video| VideoWithOwner::new(video, &owners))
            .context("Failed to convert listed videos into external format")
            .map_err(VideoError::Internal)
    }

    #[instrument(skip(self))]
    async fn publish_video(
        &self,
        owner: Uuid,
        input: PublishVideoInput,
    ) -> Result<Video, VideoError> {
        let title = require_text("title", input.title.as_deref())?;
        let description = require_text("description", input.description.as_deref())?;
        let video_file = input
            .video_file
            .ok_or(ValidationError::MissingField { field: "videoFile" })?;
        let thumbnail = input
            .thumbnail
            .ok_or(ValidationError::MissingField { field: "thumbnail" })?;

        let uploaded_video = upload_staged(self.uploader.as_ref(), video_file)
            .await
            .map_err(|source| VideoError::Upload {
                asset: "video file",
                source,
            })?;
        let thumbnail_url = self.upload("thumbnail", thumbnail).await?;

        let created = self
            .video_repo
            .create_video(NewVideo {
                video_file: uploaded_video.url.into(),
                thumbnail: thumbnail_url,
                title,
                description,
                duration: uploaded_video.duration.unwrap_or_default(),
                owner,
            })
            .await
            .map_err(VideoError::Internal)?;
        info!(video_id = %created.id, "Published video");

        created
            .try_into()
            .context("Failed to convert new video into external format")
            .map_err(VideoError::Internal)
    }

    #[instrument(skip(self))]
    async fn get_video(&self, video_id: &str) -> Result<Video, VideoError> {
        let id = parse_id("videoId", video_id)?;
        self.video_repo
            .find_video(id)
            .await
            .map_err(VideoError::Internal)?
            .ok_or(VideoError::NotFound)?
            .try_into()
            .context("Failed to convert video into external format")
            .map_err(VideoError::Internal)
    }

    #[instrument(skip(self))]
    async fn update_video(
        &self,
        video_id: &str,
        input: UpdateVideoInput,
    ) -> Result<Video, VideoError> {
        let id = parse_id("videoId", video_id)?;
        let title = optional_text(input.title.as_deref());
        let description = optional_text(input.description.as_deref());
        if title.is_none() && description.is_none() {
            return Err(ValidationError::MissingField {
                field: "title or description",
            }
            .into());
        }

        // NOTE: check before uploading so an unknown id costs no upload
        if self
            .video_repo
            .find_video(id)
            .await
            .map_err(VideoError::Internal)?
            .is_none()
        {
            return Err(VideoError::NotFound);
        }

        let thumbnail = match input.thumbnail {
            Some(file) => Some(self.upload("thumbnail", file).await?),
            None => None,
        };

        self.video_repo
            .update_video(
                id,
                VideoChanges {
                    title,
                    description,
                    thumbnail,
                },
            )
            .await
            .map_err(VideoError::Internal)?
            .ok_or(VideoError::NotFound)?
            .try_into()
            .context("Failed to convert updated video into external format")
            .map_err(VideoError::Internal)
    }

    #[instrument(skip(self))]
    async fn delete_video(&self, video_id: &str) -> Result<Video, VideoError> {
        let id = parse_id("videoId", video_id)?;
        self.video_repo
            .delete_video(id)
            .await
            .map_err(VideoError::Internal)?
            .ok_or(VideoError::NotFound)?
            .try_into()
            .context("Failed to convert deleted video into external format")
            .map_err(VideoError::Internal)
    }

    #[instrument(skip(self))]
    async fn toggle_publish(&self, video_id: &str) -> Result<Video, VideoError> {
        let id = parse_id("videoId", video_id)?;
        self.video_repo
            .toggle_publish(id)
            .await
            .map_err(VideoError::Internal)?
            .ok_or(VideoError::NotFound)?
            .try_into()
            .context("Failed to convert toggled video into external format")
            .map_err(VideoError::Internal)
    }
}

impl TryFrom<video::Model> for Video {
    type Error = anyhow::Error;

    fn try_from(video: video::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: video.id,
            video_file: video.video_file,
            thumbnail: video.thumbnail,
            title: video.title,
            description: video.description,
            duration: video.duration,
            views: video.views,
            is_published: video.is_published,
            owner: video.owner,
            created_at: video
                .created_at
                .format(&Rfc3339)
                .context("Failed to format creation timestamp")?,
            updated_at: video
                .updated_at
                .format(&Rfc3339)
                .context("Failed to format update timestamp")?,
        })
    }
}

impl VideoWithOwner {
    fn new(video: video::Model, owners: &HashMap<Uuid, OwnerSummary>) -> anyhow::Result<Self> {
        let owner = owners.get(&video.owner).cloned();
        let video = Video::try_from(video)?;
        Ok(Self {
            id: video.id,
            video_file: video.video_file,
            thumbnail: video.thumbnail,
            title: video.title,
            description: video.description,
            duration: video.duration,
            views: video.views,
            is_published: video.is_published,
            owner,
            created_at: video.created_at,
            updated_at: video.updated_at,
        })
    }
}
