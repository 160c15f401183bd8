//! PUT, DELETE and the management origin.

use std::io;
use std::pin::pin;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tracing::{debug, info};

use crate::drive::{Entry, EntryWriter, Metadata, join_path};
use crate::error::{FetchError, FetchResult};
use crate::fetch::{HyperFetch, Target};
use crate::http::body::Body;
use crate::http::multipart::{self, Multipart};
use crate::http::request::Request;
use crate::http::response::{Response, StatusCode};

/// Form field whose parts are stored as files.
pub const FILE_FIELD: &str = "file";

/// Copies `source` into `writer` chunk by chunk.
///
/// The next chunk is only pulled once the writer accepted the previous one.
/// Any failure on either side aborts the writer.
pub async fn pipeline<S>(source: S, mut writer: Box<dyn EntryWriter>) -> FetchResult<Entry>
where
    S: Stream<Item = io::Result<Bytes>> + Send,
{
    let mut source = pin!(source);
    while let Some(chunk) = source.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                writer.abort().await;
                return Err(stream_error(e));
            }
        };
        if let Err(e) = writer.write(chunk).await {
            writer.abort().await;
            return Err(e.into());
        }
    }
    Ok(writer.finish().await?)
}

pub async fn put(fetch: &HyperFetch, target: &Target, request: Request) -> FetchResult<Response> {
    let handle = fetch.registry().get_drive(&target.hostname).await?;
    let drive = handle.drive();

    let content_type = request.header("Content-Type").unwrap_or_default().to_string();
    let body = request.body.into_stream();

    if !content_type.contains("multipart/form-data") {
        let writer = drive.create_write_stream(&target.pathname, None).await?;
        let entry = pipeline(body, writer).await?;
        info!(path = %entry.key, bytes = entry.size(), drive = %handle.url(), "File written");
        return Ok(Response::ok(Body::Empty));
    }

    let boundary = multipart::boundary(&content_type)
        .ok_or_else(|| FetchError::BadRequest("Missing multipart boundary".to_string()))?;
    let mut form = Multipart::new(body, &boundary);

    while let Some(part) = form.next_part().await.map_err(stream_error)? {
        if part.name.as_deref() != Some(FILE_FIELD) {
            debug!(field = ?part.name, "Skipping form field");
            continue;
        }
        let filename = part
            .filename
            .filter(|name| !name.is_empty())
            .ok_or_else(|| FetchError::BadRequest("File part is missing a filename".to_string()))?;

        let path = join_path(&target.pathname, &filename);
        let metadata = Metadata {
            mtime: Some(now_millis()),
        };
        let writer = drive.create_write_stream(&path, Some(metadata)).await?;
        let entry = pipeline(form.part_body(), writer).await?;
        info!(
            path = %entry.key,
            bytes = entry.size(),
            content_type = part.content_type.as_deref().unwrap_or("unknown"),
            drive = %handle.url(),
            "File uploaded"
        );
    }

    Ok(Response::ok(Body::Empty))
}

pub async fn delete(fetch: &HyperFetch, target: &Target) -> FetchResult<Response> {
    let handle = fetch.registry().get_drive(&target.hostname).await?;
    let drive = handle.drive();
    let path = target.pathname.as_str();

    if target.is_directory() {
        let entries = drive.list(path).await?;
        if entries.is_empty() {
            return Err(FetchError::not_found());
        }
        for entry in &entries {
            drive.del(&entry.key).await?;
        }
        info!(path, deleted = entries.len(), drive = %handle.url(), "Directory deleted");
        return Ok(Response::ok(Body::Empty));
    }

    drive.entry(path).await?.ok_or_else(FetchError::not_found)?;
    drive.del(path).await?;
    info!(path, drive = %handle.url(), "File deleted");
    Ok(Response::ok(Body::Empty))
}

/// `GET hyper://localhost/?key=`: the URL of an existing writable drive.
pub async fn resolve_key(fetch: &HyperFetch, target: &Target) -> FetchResult<Response> {
    let key = key_param(target)?;
    let handle = fetch.registry().get_drive_from_key(&key, false).await?;
    Ok(Response::text(StatusCode::Ok, handle.url()))
}

/// `POST hyper://localhost/?key=`: the URL of a writable drive, created on
/// first use.
pub async fn create_key(fetch: &HyperFetch, target: &Target) -> FetchResult<Response> {
    let key = key_param(target)?;
    let handle = fetch.registry().get_drive_from_key(&key, true).await?;
    Ok(Response::text(StatusCode::Ok, handle.core().url()))
}

fn key_param(target: &Target) -> FetchResult<String> {
    target
        .param("key")
        .filter(|key| !key.is_empty())
        .ok_or_else(|| FetchError::BadRequest("Must specify key parameter to resolve".to_string()))
}

/// Malformed form data is a 400, any other stream failure a 500.
fn stream_error(e: io::Error) -> FetchError {
    match e.kind() {
        io::ErrorKind::InvalidData => FetchError::BadRequest(e.to_string()),
        _ => FetchError::Io(e),
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
