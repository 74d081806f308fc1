use axum::{
    Router,
    extract::{Multipart, Path, Query, State, multipart::MultipartRejection},
    http::StatusCode,
    routing,
};
use rearch::Container;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    api::{ApiError, ApiResponse, CurrentUser, UploadForm},
    config::upload_dir_capsule,
    pagination::Page,
    video_service::{
        ListVideosParams, PublishVideoInput, UpdateVideoInput, Video, VideoError, VideoService,
        VideoWithOwner, video_service_capsule,
    },
};

pub fn router() -> Router<Container> {
    Router::new()
        .route(
            "/api/v1/videos",
            routing::get(list_videos).post(publish_video),
        )
        .route(
            "/api/v1/videos/{video_id}",
            routing::get(get_video).patch(update_video).delete(delete_video),
        )
        .route(
            "/api/v1/videos/toggle/publish/{video_id}",
            routing::patch(toggle_publish),
        )
}

impl From<VideoError> for ApiError {
    fn from(error: VideoError) -> Self {
        match error {
            VideoError::Validation(error) => Self::from(error),
            VideoError::NoneFound | VideoError::NotFound => Self::not_found(error),
            VideoError::Upload { .. } | VideoError::Internal(_) => Self::internal(&error),
        }
    }
}

#[instrument(skip(container))]
async fn list_videos(
    State(container): State<Container>,
    Query(params): Query<ListVideosParams>,
) -> Result<ApiResponse<Page<VideoWithOwner>>, ApiError> {
    let videos = container
        .read(video_service_capsule)
        .list_videos(params)
        .await?;
    Ok(ApiResponse::ok(videos, "Videos fetched successfully"))
}

#[instrument(skip(container, multipart))]
async fn publish_video(
    State(container): State<Container>,
    CurrentUser(owner): CurrentUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<Video>, ApiError> {
    let (service, staging_dir) = container.read((video_service_capsule, upload_dir_capsule));
    publish_upload(service.as_ref(), &staging_dir, owner, multipart?).await
}

async fn publish_upload(
    service: &dyn VideoService,
    staging_dir: &std::path::Path,
    owner: Uuid,
    multipart: Multipart,
) -> Result<ApiResponse<Video>, ApiError> {
    let mut form = UploadForm::read(multipart, staging_dir).await?;
    let video = service
        .publish_video(
            owner,
            PublishVideoInput {
                title: form.take_text("title"),
                description: form.take_text("description"),
                video_file: form.take_file("videoFile"),
                thumbnail: form.take_file("thumbnail"),
            },
        )
        .await?;
    Ok(ApiResponse::new(
        StatusCode::CREATED,
        video,
        "Video uploaded successfully",
    ))
}

#[instrument(skip(container))]
async fn get_video(
    State(container): State<Container>,
    Path(video_id): Path<String>,
) -> Result<ApiResponse<Video>, ApiError> {
    let video = container
        .read(video_service_capsule)
        .get_video(&video_id)
        .await?;
    Ok(ApiResponse::ok(video, "Video details fetched successfully"))
}

#[instrument(skip(container, multipart))]
async fn update_video(
    State(container): State<Container>,
    Path(video_id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<Video>, ApiError> {
    let (service, staging_dir) = container.read((video_service_capsule, upload_dir_capsule));
    update_upload(service.as_ref(), &staging_dir, &video_id, multipart?).await
}

async fn update_upload(
    service: &dyn VideoService,
    staging_dir: &std::path::Path,
    video_id: &str,
    multipart: Multipart,
) -> Result<ApiResponse<Video>, ApiError> {
    let mut form = UploadForm::read(multipart, staging_dir).await?;
    let video = service
        .update_video(
            video_id,
            UpdateVideoInput {
                title: form.take_text("title"),
                description: form.take_text("description"),
                thumbnail: form.take_file("thumbnail"),
            },
        )
        .await?;
    Ok(ApiResponse::ok(video, "Video updated successfully"))
}

#[instrument(skip(container))]
async fn delete_video(
    State(container): State<Container>,
    Path(video_id): Path<String>,
) -> Result<ApiResponse<Video>, ApiError> {
    let video = container
        .read(video_service_capsule)
        .delete_video(&video_id)
        .await?;
    Ok(ApiResponse::ok(video, "Video deleted successfully"))
}

#[instrument(skip(container))]
async fn toggle_publish(
    State(container): State<Container>,
    Path(video_id): Path<String>,
) -> Result<ApiResponse<Video>, ApiError> {
    let video = container
        .read(video_service_capsule)
        .toggle_publish(&video_id)
        .await?;
    let message = if video.is_published {
        "Video published"
    } else {
        "Video unpublished"
    };
    Ok(ApiResponse::ok(video, message))
}
