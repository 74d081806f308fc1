use std::{
    env::{self, VarError},
    path::PathBuf,
};

use anyhow::Context;
use rearch::{CData, CapsuleHandle, Container};
use sea_orm::{ConnectOptions, Database, DbConn};
use tracing::{info, instrument, warn};
use url::Url;

use crate::media::CloudinaryConfig;

/// # Errors
/// Will return [`Err`] if the connection to the database fails
/// or the upload directory cannot be created.
#[instrument]
pub async fn init_container() -> anyhow::Result<Container> {
    info!("Initializing container");
    let container = Container::new();

    let (db_connection_options, set_db_conn, upload_dir) = container.read((
        db_connection_options_capsule,
        db_conn_init_action,
        upload_dir_capsule,
    ));

    info!(?db_connection_options, "Connecting to database");
    set_db_conn(Database::connect(db_connection_options).await?);

    tokio::fs::create_dir_all(&upload_dir)
        .await
        .with_context(|| format!("Failed to create upload directory {}", upload_dir.display()))?;

    info!("Container initialized");
    Ok(container)
}

/// # Panics
/// Panics when environment variable is not set or is invalid.
#[must_use]
pub fn db_connection_options_capsule(_: CapsuleHandle) -> ConnectOptions {
    required_env_var("DB_URL").into()
}

fn db_conn_manager(
    CapsuleHandle { register, .. }: CapsuleHandle,
) -> (Option<DbConn>, impl use<> + CData + Fn(Option<DbConn>)) {
    register.register(rearch_effects::state::<rearch_effects::Cloned<_>>(None))
}

pub fn db_conn_init_action(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> impl use<> + CData + Fn(DbConn) {
    let set_db_conn = get.as_ref(db_conn_manager).1.clone();
    move |db| set_db_conn(Some(db))
}

/// # Panics
/// Panics when the [`DbConn`] was not set via [`db_conn_init_action`].
pub fn db_conn_capsule(CapsuleHandle { mut get, .. }: CapsuleHandle) -> DbConn {
    let db_conn = get.as_ref(db_conn_manager).0.clone();
    db_conn.expect("DbConn should've been set via db_conn_init_action!")
}

/// # Panics
/// Panics when environment variable is invalid.
pub fn addr_capsule(_: CapsuleHandle) -> String {
    const DEFAULT_ADDR: &str = "127.0.0.1:8000";
    optional_env_var("ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_owned())
}

/// Directory where multipart uploads are staged before they are sent to Cloudinary.
///
/// # Panics
/// Panics when environment variable is invalid.
pub fn upload_dir_capsule(_: CapsuleHandle) -> PathBuf {
    optional_env_var("UPLOAD_DIR").map_or_else(
        || env::temp_dir().join("vidtube-uploads"),
        PathBuf::from,
    )
}

/// # Panics
/// Panics when environment variable is not a number.
pub fn max_upload_bytes_capsule(_: CapsuleHandle) -> usize {
    const ENV_VAR_NAME: &str = "MAX_UPLOAD_BYTES";
    const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

    optional_env_var(ENV_VAR_NAME).map_or(DEFAULT_MAX_UPLOAD_BYTES, |raw| {
        raw.parse()
            .unwrap_or_else(|err| panic!("{ENV_VAR_NAME} is not a byte count: {err}"))
    })
}

/// # Panics
/// Panics when a credential is not set or the base URL is invalid.
pub fn cloudinary_config_capsule(_: CapsuleHandle) -> CloudinaryConfig {
    const DEFAULT_BASE_URL: &str = "https://api.cloudinary.com";

    let base_url = optional_env_var("CLOUDINARY_BASE_URL")
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
    CloudinaryConfig {
        base_url: Url::parse(&base_url)
            .unwrap_or_else(|err| panic!("CLOUDINARY_BASE_URL is not a URL: {err}")),
        cloud_name: required_env_var("CLOUDINARY_CLOUD_NAME"),
        api_key: required_env_var("CLOUDINARY_API_KEY"),
        api_secret: required_env_var("CLOUDINARY_API_SECRET"),
    }
}

fn required_env_var(name: &str) -> String {
    env::var(name).unwrap_or_else(|err| match err {
        VarError::NotPresent => panic!("{name} is not set"),
        VarError::NotUnicode(actual) => {
            panic!("{name} is invalid unicode: {}", actual.display());
        }
    })
}

fn optional_env_var(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            info!(value, "{name} environment variable set");
            Some(value)
        }
        Err(VarError::NotPresent) => {
            warn!("{name} environment variable not set; using default");
            None
        }
        Err(VarError::NotUnicode(actual)) => {
            panic!("{name} environment variable is invalid: {}", actual.display());
        }
    }
}
