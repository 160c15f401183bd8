mod common;

use std::time::Duration;

use common::writable;
use drivefetch::drive::Peer;
use drivefetch::fetch::HyperFetch;
use drivefetch::http::connection::Connection;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

fn serve(fetch: HyperFetch) -> (DuplexStream, JoinHandle<anyhow::Result<()>>) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let task = tokio::spawn(async move {
        let mut conn = Connection::new(server, fetch);
        conn.run().await
    });
    (client, task)
}

/// Reads until the response head is complete and returns everything read.
async fn read_head(client: &mut DuplexStream) -> String {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    while !buf.ends_with(b"\r\n\r\n") {
        let n = client.read(&mut byte).await.unwrap();
        assert!(n > 0, "connection closed mid-head");
        buf.push(byte[0]);
    }
    String::from_utf8(buf).unwrap()
}

#[tokio::test]
async fn test_put_then_get_on_one_connection() {
    let (_, fetch) = writable();
    let (mut client, task) = serve(fetch);

    client
        .write_all(
            b"PUT /a.txt HTTP/1.1\r\nHost: blog\r\nContent-Length: 5\r\n\r\nhello\
              GET /a.txt HTTP/1.1\r\nHost: blog\r\nConnection: close\r\n\r\n",
        )
        .await
        .unwrap();

    let mut out = String::new();
    client.read_to_string(&mut out).await.unwrap();
    task.await.unwrap().unwrap();

    let (put, get) = out.split_at(out.rfind("HTTP/1.1").unwrap());
    assert!(put.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(get.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(get.contains("Content-Length: 5\r\n"));
    assert!(get.ends_with("\r\n\r\nhello"));
}

#[tokio::test]
async fn test_large_body_is_streamed() {
    let (_, fetch) = writable();
    let (mut client, task) = serve(fetch);

    let content = "x".repeat(200 * 1024);
    let head = format!(
        "PUT /big.txt HTTP/1.1\r\nHost: blog\r\nContent-Length: {}\r\n\r\n",
        content.len()
    );

    client.write_all(head.as_bytes()).await.unwrap();
    client.write_all(content.as_bytes()).await.unwrap();
    client
        .write_all(b"GET /big.txt HTTP/1.1\r\nHost: blog\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let mut out = Vec::new();
    client.read_to_end(&mut out).await.unwrap();
    task.await.unwrap().unwrap();

    let text = String::from_utf8(out).unwrap();
    assert!(text.contains(&format!("Content-Length: {}\r\n", content.len())));
    assert!(text.ends_with(&content));
}

#[tokio::test]
async fn test_head_has_no_body() {
    let (_, fetch) = writable();
    common::put(&fetch, "blog", "/a.txt", "hello").await;
    let (mut client, task) = serve(fetch);

    client
        .write_all(b"HEAD /a.txt HTTP/1.1\r\nHost: blog\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let mut out = String::new();
    client.read_to_string(&mut out).await.unwrap();
    task.await.unwrap().unwrap();

    assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(out.contains("Content-Length: 5\r\n"));
    assert!(out.ends_with("\r\n\r\n"));
}

#[tokio::test]
async fn test_malformed_request_closes_connection() {
    let (_, fetch) = writable();
    let (mut client, task) = serve(fetch);

    client.write_all(b"BREW /pot HTTP/1.1\r\n\r\n").await.unwrap();

    assert!(task.await.unwrap().is_err());
}

#[tokio::test]
async fn test_event_stream_over_connection() {
    let (sdk, fetch) = writable();
    let (mut client, task) = serve(fetch);

    client
        .write_all(b"GET /$/extensions/ HTTP/1.1\r\nHost: blog\r\nAccept: text/event-stream\r\n\r\n")
        .await
        .unwrap();

    let head = read_head(&mut client).await;
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(head.contains("Transfer-Encoding: chunked\r\n"));

    let core = sdk.drive("blog").unwrap().memory_core();
    core.connect(Peer {
        remote_public_key: Some("aa11".to_string()),
        ..Peer::default()
    });

    let mut received = String::new();
    while !received.contains("event:peer-open") {
        let mut chunk = [0u8; 256];
        let n = tokio::time::timeout(Duration::from_secs(1), client.read(&mut chunk))
            .await
            .unwrap()
            .unwrap();
        assert!(n > 0, "event stream closed");
        received.push_str(&String::from_utf8_lossy(&chunk[..n]));
    }
    assert!(received.contains("id:aa11\n"));

    // Hanging up ends the subscription
    drop(client);
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(core.subscriber_count(), 0);
}

#[tokio::test]
async fn test_chunked_upload_is_decoded() {
    let (_, fetch) = writable();
    let (mut client, task) = serve(fetch);

    client
        .write_all(
            b"PUT /c.txt HTTP/1.1\r\nHost: blog\r\nTransfer-Encoding: chunked\r\n\r\n\
              5\r\nhello\r\n6;ext=1\r\n world\r\n0\r\nX-Trailer: yes\r\n\r\n\
              GET /c.txt HTTP/1.1\r\nHost: blog\r\nConnection: close\r\n\r\n",
        )
        .await
        .unwrap();

    let mut out = String::new();
    client.read_to_string(&mut out).await.unwrap();
    task.await.unwrap().unwrap();

    let (put, get) = out.split_at(out.rfind("HTTP/1.1").unwrap());
    assert!(put.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(get.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(get.contains("Content-Length: 11\r\n"));
    assert!(get.ends_with("\r\n\r\nhello world"));
}

#[tokio::test]
async fn test_malformed_chunked_upload_is_rejected() {
    let (_, fetch) = writable();
    let (mut client, task) = serve(fetch.clone());

    client
        .write_all(
            b"PUT /c.txt HTTP/1.1\r\nHost: blog\r\nTransfer-Encoding: chunked\r\n\r\n\
              zz\r\nhello\r\n0\r\n\r\n",
        )
        .await
        .unwrap();

    let mut out = String::new();
    client.read_to_string(&mut out).await.unwrap();
    task.await.unwrap().unwrap();

    assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    let response = fetch.fetch(common::get("blog", "/c.txt")).await;
    assert_eq!(response.status, drivefetch::http::response::StatusCode::NotFound);
}

#[tokio::test]
async fn test_truncated_chunked_upload_stores_nothing() {
    let (_, fetch) = writable();
    let (mut client, task) = serve(fetch.clone());

    client
        .write_all(b"PUT /c.txt HTTP/1.1\r\nHost: blog\r\nTransfer-Encoding: chunked\r\n\r\na\r\nhel")
        .await
        .unwrap();
    client.shutdown().await.unwrap();

    let mut out = String::new();
    client.read_to_string(&mut out).await.unwrap();
    task.await.unwrap().unwrap();

    assert!(out.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
    let response = fetch.fetch(common::get("blog", "/c.txt")).await;
    assert_eq!(response.status, drivefetch::http::response::StatusCode::NotFound);
}

#[tokio::test]
async fn test_unsupported_transfer_coding_closes_connection() {
    let (_, fetch) = writable();
    let (mut client, task) = serve(fetch);

    client
        .write_all(b"PUT /c.txt HTTP/1.1\r\nHost: blog\r\nTransfer-Encoding: gzip\r\n\r\n")
        .await
        .unwrap();

    assert!(task.await.unwrap().is_err());
}

#[tokio::test]
async fn test_half_closed_client_gets_response() {
    let (_, fetch) = writable();
    common::put(&fetch, "blog", "/a.txt", "hello").await;

    for _ in 0..20 {
        let (mut client, task) = serve(fetch.clone());

        client
            .write_all(b"GET /a.txt HTTP/1.1\r\nHost: blog\r\n\r\n")
            .await
            .unwrap();
        client.shutdown().await.unwrap();

        let mut out = String::new();
        client.read_to_string(&mut out).await.unwrap();
        task.await.unwrap().unwrap();

        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.ends_with("\r\n\r\nhello"));
    }
}
