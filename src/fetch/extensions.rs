//! Extension messaging over `/$/extensions/`.
//!
//! Lists channels and their peers, relays messages to peers, and streams
//! swarm events as Server-Sent Events:
//!
//! ```text
//! id:<peer key>
//! event:<channel name>
//! data:<payload line>
//!
//! ```

use std::io;

use bytes::Bytes;
use futures_util::stream::{self, Stream};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::drive::{Peer, PeerStats, SwarmEvent};
use crate::error::{FetchError, FetchResult};
use crate::fetch::{HyperFetch, Target};
use crate::http::body::Body;
use crate::http::request::Request;
use crate::http::response::{
    HEADER_CONTENT_TYPE, MIME_EVENT_STREAM, Response, ResponseBuilder, StatusCode,
};

pub const EVENT_PEER_OPEN: &str = "peer-open";
pub const EVENT_PEER_REMOVE: &str = "peer-remove";

/// Peer as exposed to clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo<'a> {
    pub remote_public_key: Option<&'a str>,
    pub remote_type: Option<&'a str>,
    pub remote_address: Option<&'a str>,
    pub stats: &'a PeerStats,
}

impl<'a> From<&'a Peer> for PeerInfo<'a> {
    fn from(peer: &'a Peer) -> Self {
        Self {
            remote_public_key: peer.remote_public_key.as_deref(),
            remote_type: peer.remote_type.as_deref(),
            remote_address: peer.remote_address.as_deref(),
            stats: &peer.stats,
        }
    }
}

pub async fn list_extensions(
    fetch: &HyperFetch,
    target: &Target,
    accept: &str,
) -> FetchResult<Response> {
    let handle = fetch.registry().get_drive(&target.hostname).await?;

    if accept.contains("text/event-stream") {
        debug!(drive = %handle.url(), "Opening extension event stream");
        return Ok(ResponseBuilder::new(StatusCode::Ok)
            .header(HEADER_CONTENT_TYPE, MIME_EVENT_STREAM)
            .header("Cache-Control", "no-cache")
            .body(Body::from_stream(event_stream(handle.core().subscribe())))
            .build());
    }

    Ok(Response::json(StatusCode::Ok, &handle.extension_names())?)
}

pub async fn extension_peers(
    fetch: &HyperFetch,
    target: &Target,
    name: &str,
) -> FetchResult<Response> {
    let handle = fetch.registry().get_drive(&target.hostname).await?;
    handle.extension(name);

    let peers = handle.extension_peers(name);
    let infos: Vec<PeerInfo<'_>> = peers.iter().map(PeerInfo::from).collect();
    Ok(Response::json(StatusCode::Ok, &infos)?)
}

pub async fn broadcast(
    fetch: &HyperFetch,
    target: &Target,
    name: &str,
    request: Request,
) -> FetchResult<Response> {
    let handle = fetch.registry().get_drive(&target.hostname).await?;
    let extension = handle.extension(name);

    let payload = request.body.collect().await?;
    debug!(extension = name, bytes = payload.len(), "Broadcasting extension message");
    extension.broadcast(payload);

    Ok(Response::ok(Body::Empty))
}

pub async fn send_to_peer(
    fetch: &HyperFetch,
    target: &Target,
    name: &str,
    peer_id: &str,
    request: Request,
) -> FetchResult<Response> {
    let handle = fetch.registry().get_drive(&target.hostname).await?;
    let extension = handle.extension(name);

    let peer = handle
        .extension_peers(name)
        .into_iter()
        .find(|peer| peer.id() == Some(peer_id))
        .ok_or_else(|| FetchError::NotFound("Peer Not Found".to_string()))?;

    let payload = request.body.collect().await?;
    debug!(extension = name, peer = peer_id, bytes = payload.len(), "Sending extension message");
    extension.send(payload, &peer);

    Ok(Response::ok(Body::Empty))
}

/// Swarm events from `events` as SSE records.
///
/// Dropping the stream unsubscribes. The stream ends when the core goes
/// away.
pub fn event_stream(
    events: broadcast::Receiver<SwarmEvent>,
) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
    stream::unfold(events, |mut events| async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(record) = format_event(&event) {
                        return Some((Ok(Bytes::from(record)), events));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Extension event stream fell behind");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

/// Formats one event as an SSE record. Events about peers without an id
/// have nothing to report and yield `None`.
pub fn format_event(event: &SwarmEvent) -> Option<String> {
    match event {
        SwarmEvent::PeerOpen(peer) => Some(sse_record(peer.id()?, EVENT_PEER_OPEN, None)),
        SwarmEvent::PeerRemove(peer) => Some(sse_record(peer.id()?, EVENT_PEER_REMOVE, None)),
        SwarmEvent::Message {
            extension,
            peer,
            payload,
        } => {
            let data = String::from_utf8_lossy(payload);
            Some(sse_record(peer.id().unwrap_or_default(), extension, Some(data.as_ref())))
        }
    }
}

fn sse_record(id: &str, event: &str, data: Option<&str>) -> String {
    let mut record = format!("id:{id}\nevent:{event}\n");
    for line in data.into_iter().flat_map(|data| data.split('\n')) {
        record.push_str("data:");
        record.push_str(line);
        record.push('\n');
    }
    record.push('\n');
    record
}
