use drivefetch::http::body::Body;
use drivefetch::http::request::{Method, Request, RequestBuilder};

fn request(method: Method, path: &str, headers: &[(&str, &str)]) -> Request {
    Request {
        method,
        path: path.to_string(),
        version: "HTTP/1.1".to_string(),
        headers: headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        body: Body::Empty,
    }
}

#[test]
fn test_request_header_retrieval() {
    let req = request(
        Method::GET,
        "/",
        &[("Host", "example"), ("Content-Type", "application/json")],
    );

    assert_eq!(req.header("Host"), Some("example"));
    assert_eq!(req.header("Content-Type"), Some("application/json"));
    assert_eq!(req.header("Missing"), None);
}

#[test]
fn test_request_header_case_insensitive() {
    let req = request(Method::GET, "/", &[("accept", "text/html")]);

    assert_eq!(req.header("Accept"), Some("text/html"));
    assert_eq!(req.accept(), "text/html");
}

#[test]
fn test_request_accept_missing() {
    let req = request(Method::GET, "/", &[]);
    assert_eq!(req.accept(), "");
}

#[test]
fn test_request_content_length_parsing() {
    let req = request(Method::PUT, "/a.txt", &[("Content-Length", "42")]);
    assert_eq!(req.content_length(), 42);
}

#[test]
fn test_request_content_length_missing() {
    let req = request(Method::GET, "/", &[]);
    assert_eq!(req.content_length(), 0);
}

#[test]
fn test_request_keep_alive_http11_default() {
    let req = request(Method::GET, "/", &[]);
    assert!(req.keep_alive());
}

#[test]
fn test_request_keep_alive_http10_default() {
    let mut req = request(Method::GET, "/", &[]);
    req.version = "HTTP/1.0".to_string();
    assert!(!req.keep_alive());
}

#[test]
fn test_request_keep_alive_close() {
    let req = request(Method::GET, "/", &[("Connection", "Close")]);
    assert!(!req.keep_alive());
}

#[test]
fn test_request_method_from_string() {
    assert_eq!(Method::from_str("GET"), Some(Method::GET));
    assert_eq!(Method::from_str("DELETE"), Some(Method::DELETE));
    assert_eq!(Method::from_str("INVALID"), None);
    assert_eq!(Method::from_str("get"), None); // Case-sensitive
}

#[test]
fn test_request_url_from_host_header() {
    let req = request(Method::GET, "/docs/a.txt?noResolve", &[("Host", "blog:8080")]);
    let url = req.url().unwrap();

    assert_eq!(url.scheme(), "hyper");
    assert_eq!(url.host_str(), Some("blog"));
    assert_eq!(url.path(), "/docs/a.txt");
    assert_eq!(url.query(), Some("noResolve"));
}

#[test]
fn test_request_url_absolute_target() {
    let req = request(Method::GET, "hyper://example/index.html", &[("Host", "ignored")]);
    let url = req.url().unwrap();

    assert_eq!(url.host_str(), Some("example"));
    assert_eq!(url.path(), "/index.html");
}

#[test]
fn test_request_builder() {
    let req = RequestBuilder::new()
        .method(Method::PUT)
        .path("/a.txt")
        .header("Host", "drive")
        .body("hello")
        .build()
        .unwrap();

    assert_eq!(req.method, Method::PUT);
    assert_eq!(req.version, "HTTP/1.1");
    assert_eq!(req.body.as_bytes(), Some(&b"hello"[..]));
}

#[test]
fn test_request_builder_requires_path() {
    assert!(RequestBuilder::new().method(Method::GET).build().is_err());
}

#[tokio::test]
async fn test_request_with_streamed_body() {
    let (tx, body) = Body::channel(2);
    let mut req = request(Method::PUT, "/a.txt", &[]);
    req.body = body;

    tokio::spawn(async move {
        tx.send(Ok("hello ".into())).await.unwrap();
        tx.send(Ok("world".into())).await.unwrap();
    });

    let collected = req.body.collect().await.unwrap();
    assert_eq!(&collected[..], b"hello world");
}
