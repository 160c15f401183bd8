//! GET and HEAD against drive paths.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::drive::{Drive, Entry, join_path};
use crate::error::{FetchError, FetchResult};
use crate::fetch::{HyperFetch, Target};
use crate::http::body::Body;
use crate::http::mime::get_mime_type;
use crate::http::range::{ByteRange, parse_range};
use crate::http::response::{
    HEADER_CONTENT_LENGTH, HEADER_CONTENT_TYPE, MIME_APPLICATION_JSON, MIME_TEXT_HTML,
    MIME_TEXT_PLAIN, Response, ResponseBuilder, StatusCode,
};

pub const INDEX_FILE: &str = "index.html";

/// Lists the children of directory `path`. Children that are not files
/// themselves get a trailing `/`.
pub async fn list_entries(drive: &dyn Drive, path: &str) -> FetchResult<Vec<String>> {
    let mut entries = Vec::new();
    for name in drive.readdir(path).await? {
        let child = join_path(path, &name);
        if drive.entry(&child).await?.is_some() {
            entries.push(name);
        } else {
            entries.push(format!("{name}/"));
        }
    }
    Ok(entries)
}

pub async fn get(
    fetch: &HyperFetch,
    target: &Target,
    accept: &str,
    range: Option<&str>,
) -> FetchResult<Response> {
    let handle = fetch.registry().get_drive(&target.hostname).await?;
    let drive = handle.drive();
    let path = target.pathname.as_str();

    if !target.is_directory() {
        return serve_file(drive, path, range).await;
    }

    let entries = list_entries(drive, path).await?;
    if entries.is_empty() && path != "/" {
        return Ok(Response::json(StatusCode::NotFound, &entries)?);
    }

    if !target.has_param("noResolve") && entries.iter().any(|name| name == INDEX_FILE) {
        debug!(path, "Serving directory index file");
        return serve_file(drive, &join_path(path, INDEX_FILE), range).await;
    }

    if accept.contains("text/html") {
        let page = fetch.renderer().render(&target.url, &entries, fetch).await;
        return Ok(ResponseBuilder::new(StatusCode::Ok)
            .header(HEADER_CONTENT_TYPE, MIME_TEXT_HTML)
            .body(page)
            .build());
    }

    Ok(Response::json(StatusCode::Ok, &entries)?)
}

pub async fn head(
    fetch: &HyperFetch,
    target: &Target,
    accept: &str,
    range: Option<&str>,
) -> FetchResult<Response> {
    let handle = fetch.registry().get_drive(&target.hostname).await?;
    let drive = handle.drive();
    let path = target.pathname.as_str();

    if target.is_directory() {
        let entries = list_entries(drive, path).await?;
        if entries.is_empty() && path != "/" {
            return Ok(ResponseBuilder::new(StatusCode::NotFound)
                .header(HEADER_CONTENT_TYPE, MIME_TEXT_PLAIN)
                .build());
        }

        let has_index = !target.has_param("noResolve") && entries.iter().any(|n| n == INDEX_FILE);
        let content_type = if has_index || accept.contains("text/html") {
            MIME_TEXT_HTML
        } else {
            MIME_APPLICATION_JSON
        };
        return Ok(ResponseBuilder::new(StatusCode::NoContent)
            .header("Accept-Ranges", "bytes")
            .header(HEADER_CONTENT_TYPE, content_type)
            .build());
    }

    let entry = drive.entry(path).await?.ok_or_else(FetchError::not_found)?;
    let (headers, _) = file_headers(&entry, path, range);
    Ok(ResponseBuilder::new(StatusCode::Ok).headers(headers).build())
}

async fn serve_file(drive: &dyn Drive, path: &str, range: Option<&str>) -> FetchResult<Response> {
    let entry = drive.entry(path).await?.ok_or_else(FetchError::not_found)?;
    let (headers, range) = file_headers(&entry, path, range);
    let body = drive.create_read_stream(path, range).await?;

    Ok(ResponseBuilder::new(StatusCode::Ok)
        .headers(headers)
        .body(Body::Stream(body))
        .build())
}

/// Headers describing `entry`, and the byte range to serve if the request
/// asked for exactly one satisfiable range.
fn file_headers(
    entry: &Entry,
    path: &str,
    range_header: Option<&str>,
) -> (HashMap<String, String>, Option<ByteRange>) {
    let size = entry.size();
    let mut headers = HashMap::new();
    headers.insert("ETag".to_string(), entry.seq.to_string());
    headers.insert(HEADER_CONTENT_TYPE.to_string(), get_mime_type(path));
    headers.insert("Accept-Ranges".to_string(), "bytes".to_string());

    if let Some(mtime) = entry.mtime() {
        let modified = UNIX_EPOCH + Duration::from_millis(mtime);
        headers.insert("Last-Modified".to_string(), last_modified(modified));
    }

    let range = range_header
        .and_then(|header| parse_range(size, header).ok())
        .and_then(|ranges| ranges.single_bytes());

    match range {
        Some(range) => {
            headers.insert(HEADER_CONTENT_LENGTH.to_string(), range.len().to_string());
            headers.insert("Content-Range".to_string(), range.content_range(size));
        }
        None => {
            headers.insert(HEADER_CONTENT_LENGTH.to_string(), size.to_string());
        }
    }

    (headers, range)
}

fn last_modified(time: SystemTime) -> String {
    httpdate::fmt_http_date(time)
}
