//! File upload endpoint and client
//!
//! `POST /api/upload` accepts a multipart body and streams every file field
//! to the upload directory under a generated name. Only the extension of the
//! client-supplied name survives, after sanitizing.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use axum::extract::multipart::{Field, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{ChatError, Result};

pub const UPLOAD_ROUTE: &str = "/api/upload";
pub const UPLOAD_SUCCESS: &str = "File uploaded successfully!";
pub const UPLOAD_FAILURE: &str = "File upload failed.";
pub const METHOD_NOT_ALLOWED: &str = "Method not allowed";
/// Shown by the client when the request never got an answer
pub const UPLOAD_RETRY_HINT: &str = "Upload failed. Please try again.";

const MAX_EXTENSION_LEN: usize = 16;

/// Metadata about one stored file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub field: String,
    pub original_name: String,
    pub stored_name: String,
    pub size: u64,
    pub content_type: Option<String>,
}

/// Body of every upload response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<StoredFile>>,
}

impl UploadReceipt {
    fn message(message: &str) -> Self {
        Self {
            message: message.to_string(),
            files: None,
        }
    }
}

#[derive(Clone)]
struct UploadState {
    dir: Arc<PathBuf>,
}

/// Build the upload router storing into `dir`, rejecting bodies over `limit` bytes.
pub fn router(dir: PathBuf, limit: usize) -> Router {
    let state = UploadState { dir: Arc::new(dir) };
    Router::new()
        .route(UPLOAD_ROUTE, post(handle_upload).fallback(method_not_allowed))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(state)
}

/// Bind `listen` and serve uploads until Ctrl+C.
pub async fn serve(listen: &str, dir: PathBuf, limit: usize) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("failed to create upload directory {}", dir.display()))?;

    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind upload listener on {listen}"))?;
    let addr: SocketAddr = listener.local_addr()?;
    info!("Upload endpoint listening on http://{addr}{UPLOAD_ROUTE}, storing in {}", dir.display());

    axum::serve(listener, router(dir, limit))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("upload server exited with error")?;

    info!("Upload endpoint stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("Upload server shutdown signal listener failed");
    }
}

async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(UploadReceipt::message(METHOD_NOT_ALLOWED)),
    )
        .into_response()
}

async fn handle_upload(
    State(state): State<UploadState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Response {
    let multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            warn!("Rejected upload body: {rejection}");
            return failure();
        }
    };

    match store_files(&state.dir, multipart).await {
        Ok(files) => {
            info!("Stored {} uploaded file(s)", files.len());
            let receipt = UploadReceipt {
                message: UPLOAD_SUCCESS.to_string(),
                files: Some(files),
            };
            (StatusCode::OK, Json(receipt)).into_response()
        }
        Err(e) => {
            warn!("Upload failed: {e}");
            failure()
        }
    }
}

fn failure() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(UploadReceipt::message(UPLOAD_FAILURE)),
    )
        .into_response()
}

/// Store every file field of the body. On any error, files already written
/// for this request are removed again.
async fn store_files(dir: &Path, mut multipart: Multipart) -> Result<Vec<StoredFile>> {
    tokio::fs::create_dir_all(dir).await?;
    let mut stored: Vec<StoredFile> = Vec::new();

    let outcome: Result<()> = async {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ChatError::UploadFailed(e.body_text()))?
        {
            if field.file_name().is_none() {
                debug!("Skipping non-file field {:?}", field.name());
                continue;
            }
            stored.push(store_field(dir, field).await?);
        }
        Ok(())
    }
    .await;

    if let Err(e) = outcome {
        for file in &stored {
            let _ = tokio::fs::remove_file(dir.join(&file.stored_name)).await;
        }
        return Err(e);
    }
    Ok(stored)
}

async fn store_field(dir: &Path, mut field: Field<'_>) -> Result<StoredFile> {
    let original_name = base_name(field.file_name().unwrap_or_default()).to_string();
    let field_name = field.name().unwrap_or_default().to_string();
    let content_type = field.content_type().map(str::to_string);
    let stored_name = stored_name_for(&original_name);
    let path = dir.join(&stored_name);

    let mut file = tokio::fs::File::create(&path).await?;
    let mut size = 0u64;
    let written: Result<()> = async {
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| ChatError::UploadFailed(e.body_text()))?
        {
            file.write_all(&chunk).await?;
            size += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(())
    }
    .await;

    if let Err(e) = written {
        drop(file);
        let _ = tokio::fs::remove_file(&path).await;
        return Err(e);
    }

    debug!("Stored {original_name:?} as {stored_name} ({size} bytes)");
    Ok(StoredFile {
        field: field_name,
        original_name,
        stored_name,
        size,
        content_type,
    })
}

/// Last path component of a client-supplied name, for either separator.
fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Extension of `name`, lower-cased, if it is short plain ASCII alphanumeric.
pub fn sanitize_extension(name: &str) -> Option<String> {
    let base = base_name(name);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > MAX_EXTENSION_LEN {
        return None;
    }
    if !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Fresh storage name: a v4 UUID plus the sanitized extension, if any.
pub fn stored_name_for(original: &str) -> String {
    let id = Uuid::new_v4();
    match sanitize_extension(original) {
        Some(ext) => format!("{id}.{ext}"),
        None => id.to_string(),
    }
}

/// Post the file at `path` to `endpoint` as form field `file`.
///
/// Transport errors map to [`UPLOAD_RETRY_HINT`]; a server-side failure
/// carries the server's message.
pub async fn upload_file(
    client: &reqwest::Client,
    endpoint: &str,
    path: &Path,
) -> Result<UploadReceipt> {
    let data = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());

    let part = reqwest::multipart::Part::bytes(data).file_name(file_name);
    let form = reqwest::multipart::Form::new().part("file", part);

    let response = client
        .post(endpoint)
        .multipart(form)
        .send()
        .await
        .map_err(|e| {
            warn!("Upload request to {endpoint} failed: {e}");
            ChatError::UploadFailed(UPLOAD_RETRY_HINT.to_string())
        })?;

    let status = response.status();
    let receipt: UploadReceipt = response.json().await.map_err(|e| {
        warn!("Unreadable upload response ({status}): {e}");
        ChatError::UploadFailed(UPLOAD_RETRY_HINT.to_string())
    })?;

    if status.is_success() {
        Ok(receipt)
    } else {
        Err(ChatError::UploadFailed(receipt.message))
    }
}
