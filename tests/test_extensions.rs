mod common;

use std::time::Duration;

use common::{body_string, get, read_only, request, writable};
use drivefetch::drive::{Peer, PeerStats};
use drivefetch::http::body::BodyStream;
use drivefetch::http::request::Method;
use drivefetch::http::response::StatusCode;
use futures_util::StreamExt;

fn peer(id: &str, extensions: &[&str]) -> Peer {
    Peer {
        remote_public_key: Some(id.to_string()),
        remote_address: Some("10.0.0.2:4000".to_string()),
        remote_type: Some("tcp".to_string()),
        stats: PeerStats::default(),
        remote_extensions: extensions.iter().map(|e| e.to_string()).collect(),
    }
}

async fn next_record(events: &mut BodyStream) -> String {
    let chunk = tokio::time::timeout(Duration::from_secs(1), events.next())
        .await
        .expect("no event within a second")
        .expect("event stream ended")
        .unwrap();
    String::from_utf8(chunk.to_vec()).unwrap()
}

async fn subscribe(fetch: &drivefetch::fetch::HyperFetch, origin: &str) -> BodyStream {
    let req = request(Method::GET, origin, "/$/extensions/")
        .header("Accept", "text/event-stream")
        .build()
        .unwrap();
    let response = fetch.fetch(req).await;
    assert_eq!(response.status, StatusCode::Ok);
    assert_eq!(
        response.header("Content-Type"),
        Some("text/event-stream; charset=utf-8")
    );
    response.body.into_stream()
}

#[tokio::test]
async fn test_event_stream_reports_peer_open() {
    let (sdk, fetch) = writable();
    let mut events = subscribe(&fetch, "blog").await;

    let core = sdk.drive("blog").unwrap().memory_core();
    core.connect(peer("aa11", &[]));

    let record = next_record(&mut events).await;
    assert!(record.contains("event:peer-open"));
    assert!(record.contains("aa11"));
    assert_eq!(record, "id:aa11\nevent:peer-open\n\n");
}

#[tokio::test]
async fn test_event_stream_skips_peers_without_handshake() {
    let (sdk, fetch) = writable();
    let mut events = subscribe(&fetch, "blog").await;

    let core = sdk.drive("blog").unwrap().memory_core();
    core.abort_handshake(Peer::default());
    core.connect(peer("aa11", &[]));
    core.disconnect("aa11");

    assert_eq!(next_record(&mut events).await, "id:aa11\nevent:peer-open\n\n");
    assert_eq!(next_record(&mut events).await, "id:aa11\nevent:peer-remove\n\n");
}

#[tokio::test]
async fn test_event_stream_relays_messages() {
    let (sdk, fetch) = writable();
    let mut events = subscribe(&fetch, "blog").await;

    let core = sdk.drive("blog").unwrap().memory_core();
    core.connect(peer("aa11", &["chat"]));
    assert_eq!(next_record(&mut events).await, "id:aa11\nevent:peer-open\n\n");

    // Messages only arrive on channels registered locally
    assert!(!core.receive("chat", "aa11", "too early"));
    fetch.fetch(get("blog", "/$/extensions/chat")).await;
    assert!(core.receive("chat", "aa11", "hi\nthere"));

    assert_eq!(
        next_record(&mut events).await,
        "id:aa11\nevent:chat\ndata:hi\ndata:there\n\n"
    );
}

#[tokio::test]
async fn test_dropping_event_stream_unsubscribes() {
    let (sdk, fetch) = writable();
    let events = subscribe(&fetch, "blog").await;

    let core = sdk.drive("blog").unwrap().memory_core();
    assert_eq!(core.subscriber_count(), 1);

    drop(events);
    assert_eq!(core.subscriber_count(), 0);
}

#[tokio::test]
async fn test_list_extension_names() {
    let (_, fetch) = writable();

    let names = body_string(fetch.fetch(get("blog", "/$/extensions/")).await).await;
    assert_eq!(names, "[]");

    fetch.fetch(get("blog", "/$/extensions/chat")).await;
    fetch.fetch(get("blog", "/$/extensions/presence")).await;

    let response = fetch.fetch(get("blog", "/$/extensions/")).await;
    assert_eq!(response.header("Content-Type"), Some("application/json"));
    let names: Vec<String> = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(names, vec!["chat", "presence"]);
}

#[tokio::test]
async fn test_registration_is_idempotent() {
    let (sdk, fetch) = writable();

    fetch.fetch(get("blog", "/$/extensions/chat")).await;
    fetch.fetch(get("blog", "/$/extensions/chat")).await;
    let req = request(Method::POST, "blog", "/$/extensions/chat")
        .body("x")
        .build()
        .unwrap();
    fetch.fetch(req).await;

    let core = sdk.drive("blog").unwrap().memory_core();
    assert_eq!(core.registered_extensions(), 1);
}

#[tokio::test]
async fn test_extension_peers() {
    let (sdk, fetch) = writable();
    fetch.fetch(get("blog", "/")).await;

    let core = sdk.drive("blog").unwrap().memory_core();
    core.connect(peer("aa11", &["chat"]));
    core.connect(peer("bb22", &["other"]));

    let response = fetch.fetch(get("blog", "/$/extensions/chat")).await;
    assert_eq!(response.status, StatusCode::Ok);

    let peers: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    let peers = peers.as_array().unwrap();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0]["remotePublicKey"], "aa11");
    assert_eq!(peers[0]["remoteType"], "tcp");
    assert_eq!(peers[0]["remoteAddress"], "10.0.0.2:4000");
    assert_eq!(peers[0]["stats"]["downloadedBlocks"], 0);
}

#[tokio::test]
async fn test_broadcast() {
    let (sdk, fetch) = writable();
    fetch.fetch(get("blog", "/")).await;

    let core = sdk.drive("blog").unwrap().memory_core();
    core.connect(peer("aa11", &["chat"]));
    core.connect(peer("bb22", &["chat"]));
    core.connect(peer("cc33", &[]));

    let req = request(Method::POST, "blog", "/$/extensions/chat")
        .body("hello")
        .build()
        .unwrap();
    let response = fetch.fetch(req).await;
    assert_eq!(response.status, StatusCode::Ok);

    let outbox = core.outbox();
    let mut recipients: Vec<&str> = outbox.iter().map(|m| m.peer.as_str()).collect();
    recipients.sort();
    assert_eq!(recipients, vec!["aa11", "bb22"]);
    assert!(outbox.iter().all(|m| &m.payload[..] == b"hello" && m.extension == "chat"));
}

#[tokio::test]
async fn test_send_to_peer() {
    let (sdk, fetch) = writable();
    fetch.fetch(get("blog", "/")).await;

    let core = sdk.drive("blog").unwrap().memory_core();
    core.connect(peer("aa11", &["chat"]));
    core.connect(peer("bb22", &["chat"]));

    let req = request(Method::POST, "blog", "/$/extensions/chat/bb22")
        .body("psst")
        .build()
        .unwrap();
    assert_eq!(fetch.fetch(req).await.status, StatusCode::Ok);

    let outbox = core.outbox();
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].peer, "bb22");
    assert_eq!(&outbox[0].payload[..], b"psst");
}

#[tokio::test]
async fn test_send_to_unknown_peer() {
    let (sdk, fetch) = writable();
    fetch.fetch(get("blog", "/")).await;

    let core = sdk.drive("blog").unwrap().memory_core();
    core.connect(peer("aa11", &["other"]));

    let req = request(Method::POST, "blog", "/$/extensions/chat/aa11")
        .body("psst")
        .build()
        .unwrap();
    let response = fetch.fetch(req).await;

    assert_eq!(response.status, StatusCode::NotFound);
    assert_eq!(response.header("Content-Type"), Some("text/plain; charset=utf-8"));
    assert_eq!(body_string(response).await, "Peer Not Found");
    assert!(core.outbox().is_empty());
}

#[tokio::test]
async fn test_extensions_disabled() {
    let (sdk, fetch) = read_only();

    let response = fetch.fetch(get("blog", "/$/extensions/")).await;
    assert_eq!(response.status, StatusCode::NotFound);

    let req = request(Method::POST, "blog", "/$/extensions/chat")
        .body("x")
        .build()
        .unwrap();
    assert_eq!(fetch.fetch(req).await.status, StatusCode::MethodNotAllowed);

    let core = sdk.drive("blog").unwrap().memory_core();
    assert_eq!(core.registered_extensions(), 0);
}
