use std::{collections::HashMap, fmt, path::Path};

use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, FromRequestParts, Multipart,
        multipart::{Field, MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing,
};
use rearch::Container;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    comment_routes, config::max_upload_bytes_capsule, media::StagedFile, tweet_routes,
    validation::ValidationError, video_routes,
};

/// Header carrying the id of the caller, set by the authenticating proxy.
pub const USER_ID_HEADER: &str = "x-user-id";

pub fn router(container: Container) -> Router {
    let max_upload_bytes = container.read(max_upload_bytes_capsule);

    Router::new()
        .route("/api/v1/healthcheck", routing::get(healthcheck))
        .merge(video_routes::router())
        .merge(comment_routes::router())
        .merge(tweet_routes::router())
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(container)
}

#[instrument]
async fn healthcheck() -> ApiResponse<&'static str> {
    ApiResponse::ok("OK", "Service is healthy")
}

/// The envelope every successful response is wrapped in.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: u16,
    pub data: T,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn new(status: StatusCode, data: T, message: impl Into<String>) -> Self {
        Self {
            status: status.as_u16(),
            data,
            message: message.into(),
        }
    }

    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self::new(StatusCode::OK, data, message)
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}

/// A failed request, rendered with the same envelope as a successful one.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    error_id: Uuid,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    status: u16,
    data: (),
    message: String,
    error_id: String,
}

impl ApiError {
    pub fn client(status: StatusCode, message: impl fmt::Display) -> Self {
        let error_id = Uuid::new_v4();
        let message = message.to_string();
        info!(%error_id, %status, reason = message, "User submitted a bad request");
        Self {
            status,
            message,
            error_id,
        }
    }

    pub fn bad_request(message: impl fmt::Display) -> Self {
        Self::client(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl fmt::Display) -> Self {
        Self::client(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl fmt::Display) -> Self {
        Self::client(StatusCode::NOT_FOUND, message)
    }

    /// Logs `error` and hides it from the client behind a generic message.
    pub fn internal(error: &(impl fmt::Debug + ?Sized)) -> Self {
        let error_id = Uuid::new_v4();
        error!(%error_id, ?error, "Encountered an error during a request");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Internal server error".to_owned(),
            error_id,
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                status: self.status.as_u16(),
                data: (),
                message: self.message,
                error_id: self.error_id.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        Self::bad_request(error)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::client(rejection.status(), rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::client(rejection.status(), rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(error: MultipartError) -> Self {
        Self::client(error.status(), error.body_text())
    }
}

/// The caller, as identified by the [`USER_ID_HEADER`] header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CurrentUser(pub Uuid);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::unauthorized("Unauthorized request"))?;
        header
            .to_str()
            .ok()
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
            .map(Self)
            .ok_or_else(|| ApiError::unauthorized("Invalid user identity"))
    }
}

/// Text fields and staged files of a `multipart/form-data` body.
#[derive(Debug, Default)]
pub struct UploadForm {
    fields: HashMap<String, String>,
    files: HashMap<String, StagedFile>,
}

impl UploadForm {
    /// Drains `multipart`, streaming every file part into `staging_dir`.
    /// Empty file parts are treated as absent.
    ///
    /// # Errors
    /// Will return [`Err`] when the body is malformed or a file cannot be staged.
    pub async fn read(mut multipart: Multipart, staging_dir: &Path) -> Result<Self, ApiError> {
        let mut form = Self::default();
        while let Some(mut field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };
            match field.file_name().map(str::to_owned) {
                Some(file_name) => {
                    if let Some(staged) = stage_field(&mut field, staging_dir, &file_name).await? {
                        form.files.insert(name, staged);
                    }
                }
                None => {
                    form.fields.insert(name, field.text().await?);
                }
            }
        }
        Ok(form)
    }

    pub fn take_text(&mut self, name: &str) -> Option<String> {
        self.fields.remove(name)
    }

    pub fn take_file(&mut self, name: &str) -> Option<StagedFile> {
        self.files.remove(name)
    }
}

/// Writes a file part to disk chunk by chunk. An empty part stages nothing.
async fn stage_field(
    field: &mut Field<'_>,
    staging_dir: &Path,
    file_name: &str,
) -> Result<Option<StagedFile>, ApiError> {
    let (staged, mut file) =
        StagedFile::create(staging_dir, file_name).map_err(|err| ApiError::internal(&err))?;
    let mut written = 0;
    while let Some(chunk) = field.chunk().await? {
        written += chunk.len();
        file.write_all(&chunk)
            .await
            .map_err(|err| ApiError::internal(&err))?;
    }
    file.flush().await.map_err(|err| ApiError::internal(&err))?;
    Ok((written > 0).then_some(staged))
}
