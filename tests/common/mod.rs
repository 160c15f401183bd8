#![allow(dead_code)]

use std::sync::Arc;

use drivefetch::drive::memory::MemorySdk;
use drivefetch::fetch::{FetchOptions, HyperFetch};
use drivefetch::http::body::Body;
use drivefetch::http::request::{Method, Request, RequestBuilder};
use drivefetch::http::response::Response;

pub fn writable() -> (Arc<MemorySdk>, HyperFetch) {
    with_options(FetchOptions::writable())
}

pub fn read_only() -> (Arc<MemorySdk>, HyperFetch) {
    with_options(FetchOptions::default())
}

pub fn with_options(options: FetchOptions) -> (Arc<MemorySdk>, HyperFetch) {
    let sdk = Arc::new(MemorySdk::new());
    let fetch = HyperFetch::new(sdk.clone(), options);
    (sdk, fetch)
}

pub fn request(method: Method, origin: &str, path: &str) -> RequestBuilder {
    RequestBuilder::new()
        .method(method)
        .path(path)
        .header("Host", origin)
}

pub fn get(origin: &str, path: &str) -> Request {
    request(Method::GET, origin, path).build().unwrap()
}

pub async fn put(fetch: &HyperFetch, origin: &str, path: &str, content: &str) -> Response {
    let req = request(Method::PUT, origin, path)
        .body(Body::from(content.to_string()))
        .build()
        .unwrap();
    fetch.fetch(req).await
}

pub async fn body_string(response: Response) -> String {
    let bytes = response.body.collect().await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
