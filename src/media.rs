use std::{
    collections::BTreeMap,
    fmt, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use rearch::CapsuleHandle;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tempfile::TempPath;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::{fs::File, io::AsyncWriteExt};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::cloudinary_config_capsule;

#[derive(Clone)]
pub struct CloudinaryConfig {
    pub base_url: Url,
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

impl fmt::Debug for CloudinaryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudinaryConfig")
            .field("base_url", &self.base_url.as_str())
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

impl CloudinaryConfig {
    fn upload_url(&self) -> Result<Url, url::ParseError> {
        let mut base_url = self.base_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        base_url.join(&format!("v1_1/{}/auto/upload", self.cloud_name))
    }
}

/// A file received from a client, held on local disk until it is uploaded.
///
/// The file is deleted when the value is dropped, so a request that fails
/// before reaching the upload step leaves nothing behind.
#[derive(Debug)]
pub struct StagedFile {
    path: TempPath,
    file_name: String,
}

impl StagedFile {
    /// Creates an empty file inside `dir` along with a handle to fill it through.
    ///
    /// # Errors
    /// Will return [`Err`] if the file cannot be created.
    pub fn create(dir: &Path, file_name: &str) -> io::Result<(Self, File)> {
        let (file, path) = tempfile::Builder::new()
            .prefix("upload-")
            .tempfile_in(dir)?
            .into_parts();
        let staged = Self {
            path,
            file_name: file_name.to_owned(),
        };
        Ok((staged, File::from_std(file)))
    }

    /// Writes `contents` into a fresh file inside `dir`.
    ///
    /// # Errors
    /// Will return [`Err`] if the file cannot be created or written.
    pub async fn stage(dir: &Path, file_name: &str, contents: &[u8]) -> io::Result<Self> {
        let (staged, mut file) = Self::create(dir, file_name)?;
        file.write_all(contents).await?;
        file.flush().await?;
        Ok(staged)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    fn discard(self) {
        let path: PathBuf = self.path.to_path_buf();
        if let Err(err) = self.path.close() {
            warn!(?err, path = %path.display(), "Failed to remove staged file");
        }
    }
}

/// What the media provider reports back for a stored asset.
#[derive(Clone, Debug, PartialEq)]
pub struct UploadedMedia {
    pub url: Url,
    pub public_id: String,
    /// Playback length in seconds; only present for audio and video.
    pub duration: Option<f64>,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to read staged file: {0}")]
    Io(#[from] io::Error),
    #[error("invalid upload URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("request to media provider failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("media provider rejected the upload ({status}): {message}")]
    Rejected { status: u16, message: String },
}

pub fn media_uploader_capsule(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> Arc<dyn MediaUploader> {
    let config = get.as_ref(cloudinary_config_capsule).clone();
    Arc::new(CloudinaryUploader {
        client: reqwest::Client::new(),
        config,
    })
}

#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(&self, file: &StagedFile) -> Result<UploadedMedia, UploadError>;
}

/// Uploads `file`, then removes it from local disk whatever the outcome.
///
/// # Errors
/// Will return [`Err`] when the upload fails.
pub async fn upload_staged(
    uploader: &dyn MediaUploader,
    file: StagedFile,
) -> Result<UploadedMedia, UploadError> {
    let result = uploader.upload(&file).await;
    file.discard();
    result
}

struct CloudinaryUploader {
    client: reqwest::Client,
    config: CloudinaryConfig,
}

#[derive(Deserialize)]
struct CloudinaryUploadResponse {
    secure_url: String,
    public_id: String,
    duration: Option<f64>,
}

#[derive(Deserialize)]
struct CloudinaryErrorResponse {
    error: CloudinaryErrorMessage,
}

#[derive(Deserialize)]
struct CloudinaryErrorMessage {
    message: String,
}

#[async_trait]
impl MediaUploader for CloudinaryUploader {
    #[instrument(skip(self))]
    async fn upload(&self, file: &StagedFile) -> Result<UploadedMedia, UploadError> {
        let contents = File::open(file.path()).await?;
        let len = contents.metadata().await?.len();
        let timestamp = OffsetDateTime::now_utc().unix_timestamp().to_string();
        let signature = sign_params(
            &BTreeMap::from([("timestamp", timestamp.as_str())]),
            &self.config.api_secret,
        );

        let form = Form::new()
            .part(
                "file",
                Part::stream_with_length(reqwest::Body::from(contents), len)
                    .file_name(file.file_name().to_owned()),
            )
            .text("api_key", self.config.api_key.clone())
            .text("timestamp", timestamp)
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        let response = self
            .client
            .post(self.config.upload_url()?)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<CloudinaryErrorResponse>()
                .await
                .map_or_else(|_| status.to_string(), |body| body.error.message);
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: CloudinaryUploadResponse = response.json().await?;
        debug!(public_id = body.public_id, "Uploaded file to Cloudinary");
        Ok(UploadedMedia {
            url: Url::parse(&body.secure_url)?,
            public_id: body.public_id,
            duration: body.duration,
        })
    }
}

/// Cloudinary request signature: the params joined as a sorted query
/// string, directly followed by the API secret, hashed with SHA-256.
fn sign_params(params: &BTreeMap<&str, &str>, api_secret: &str) -> String {
    let to_sign = params
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}
