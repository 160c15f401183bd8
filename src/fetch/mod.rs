//! Request/response adapter over drives.
//!
//! [`HyperFetch`] takes a request addressed to a drive origin, resolves the
//! drive through the [`DriveRegistry`] and hands the request to the read
//! path, the write path or the extension messaging handlers.
//!
//! | Method | Path | Handler |
//! |---|---|---|
//! | GET | `/$/extensions/` | [`extensions::list_extensions`] |
//! | GET | `/$/extensions/{name}` | [`extensions::extension_peers`] |
//! | POST | `/$/extensions/{name}` | [`extensions::broadcast`] |
//! | POST | `/$/extensions/{name}/{peer}` | [`extensions::send_to_peer`] |
//! | GET | `localhost/?key=` | [`write::resolve_key`] |
//! | POST | `localhost/?key=` | [`write::create_key`] |
//! | PUT | any | [`write::put`] |
//! | DELETE | any | [`write::delete`] |
//! | HEAD | any | [`read::head`] |
//! | GET | any | [`read::get`] |

pub mod extensions;
pub mod read;
pub mod render;
pub mod write;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use url::Url;

use crate::drive::registry::DEFAULT_TIMEOUT;
use crate::drive::{DriveRegistry, Sdk};
use crate::error::{FetchError, FetchResult};
use crate::http::request::{Method, Request};
use crate::http::response::{Response, StatusCode};
use render::{DefaultIndexRenderer, IndexRenderer};

/// Origin that manages writable drives instead of naming one.
pub const SPECIAL_DOMAIN: &str = "localhost";
/// Reserved path under which extension channels live on every drive.
pub const EXTENSIONS_PREFIX: &str = "/$/extensions/";

#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Serve PUT, DELETE and the management origin
    pub writable: bool,
    /// Serve the `/$/extensions/` routes
    pub extension_messages: bool,
    /// Bound on opening a drive
    pub timeout: Duration,
    /// Bound on cached drives, unbounded when `None`
    pub max_drives: Option<usize>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            writable: false,
            extension_messages: false,
            timeout: DEFAULT_TIMEOUT,
            max_drives: None,
        }
    }
}

impl FetchOptions {
    /// Read-write options; extension messages follow `writable`.
    pub fn writable() -> Self {
        Self {
            writable: true,
            extension_messages: true,
            ..Self::default()
        }
    }
}

/// The drive addressed by a request, split out of its URL.
#[derive(Debug, Clone)]
pub struct Target {
    pub url: Url,
    /// Origin naming the drive
    pub hostname: String,
    /// Percent-decoded path inside the drive
    pub pathname: String,
}

impl Target {
    pub fn new(url: Url) -> FetchResult<Self> {
        let hostname = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| FetchError::BadRequest("Request does not name a drive".to_string()))?
            .to_string();

        let pathname = urlencoding::decode(url.path())
            .map_err(|_| FetchError::BadRequest("Request path is not valid UTF-8".to_string()))?
            .into_owned();
        let pathname = if pathname.is_empty() { "/".to_string() } else { pathname };

        Ok(Self {
            url,
            hostname,
            pathname,
        })
    }

    /// A trailing separator marks a directory.
    pub fn is_directory(&self) -> bool {
        self.pathname.ends_with('/')
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.url.query_pairs().any(|(key, _)| key == name)
    }

    pub fn param(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }
}

/// What a request resolves to, before any drive is touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    ListExtensions,
    ExtensionPeers { name: String },
    Broadcast { name: String },
    SendToPeer { name: String, peer: String },
    ResolveKey,
    CreateKey,
    Put,
    Delete,
    Head,
    Get,
    NotAllowed,
}

impl Route {
    pub fn resolve(method: Method, target: &Target, options: &FetchOptions) -> Route {
        let path = target.pathname.as_str();

        if options.extension_messages {
            if let Some(rest) = path.strip_prefix(EXTENSIONS_PREFIX) {
                let segments: Vec<&str> = rest.split('/').collect();
                match (method, segments.as_slice()) {
                    (Method::GET, [""]) => return Route::ListExtensions,
                    (Method::GET, [name]) => {
                        return Route::ExtensionPeers {
                            name: name.to_string(),
                        };
                    }
                    (Method::POST, [name]) if !name.is_empty() => {
                        return Route::Broadcast {
                            name: name.to_string(),
                        };
                    }
                    (Method::POST, [name, peer]) if !name.is_empty() && !peer.is_empty() => {
                        return Route::SendToPeer {
                            name: name.to_string(),
                            peer: peer.to_string(),
                        };
                    }
                    _ => {}
                }
            }
        }

        if options.writable {
            if target.hostname == SPECIAL_DOMAIN && path == "/" {
                match method {
                    Method::GET => return Route::ResolveKey,
                    Method::POST => return Route::CreateKey,
                    _ => {}
                }
            }
            match method {
                Method::PUT => return Route::Put,
                Method::DELETE => return Route::Delete,
                _ => {}
            }
        }

        match method {
            Method::HEAD => Route::Head,
            Method::GET => Route::Get,
            _ => Route::NotAllowed,
        }
    }
}

struct Inner {
    registry: DriveRegistry,
    options: FetchOptions,
    renderer: Arc<dyn IndexRenderer>,
}

/// Cheap to clone; clones share the drive cache.
#[derive(Clone)]
pub struct HyperFetch {
    inner: Arc<Inner>,
}

impl HyperFetch {
    pub fn new(sdk: Arc<dyn Sdk>, options: FetchOptions) -> Self {
        Self::with_renderer(sdk, options, Arc::new(DefaultIndexRenderer))
    }

    /// Like [`HyperFetch::new`] with a custom HTML directory listing.
    pub fn with_renderer(
        sdk: Arc<dyn Sdk>,
        options: FetchOptions,
        renderer: Arc<dyn IndexRenderer>,
    ) -> Self {
        let registry = DriveRegistry::new(sdk)
            .with_timeout(options.timeout)
            .with_max_drives(options.max_drives);
        Self {
            inner: Arc::new(Inner {
                registry,
                options,
                renderer,
            }),
        }
    }

    pub fn registry(&self) -> &DriveRegistry {
        &self.inner.registry
    }

    pub fn options(&self) -> &FetchOptions {
        &self.inner.options
    }

    pub(crate) fn renderer(&self) -> &dyn IndexRenderer {
        self.inner.renderer.as_ref()
    }

    /// Serves one request. Failures become error responses.
    pub async fn fetch(&self, request: Request) -> Response {
        match self.dispatch(request).await {
            Ok(response) => response,
            Err(e) => {
                match e.status() {
                    StatusCode::InternalServerError | StatusCode::GatewayTimeout => {
                        warn!(error = %e, "Request failed");
                    }
                    status => debug!(status = status.as_u16(), error = %e, "Request rejected"),
                }
                e.into_response()
            }
        }
    }

    async fn dispatch(&self, request: Request) -> FetchResult<Response> {
        let url = request
            .url()
            .map_err(|e| FetchError::BadRequest(format!("Invalid request URL: {e}")))?;
        let target = Target::new(url)?;
        let route = Route::resolve(request.method, &target, self.options());

        debug!(
            ?route,
            origin = %target.hostname,
            path = %target.pathname,
            "Routing request"
        );

        // Owned copies: `Request` is not `Sync`, so no borrow of it may live
        // across an await.
        let accept = request.accept().to_string();
        let range = request.header("Range").map(str::to_string);

        match route {
            Route::ListExtensions => extensions::list_extensions(self, &target, &accept).await,
            Route::ExtensionPeers { name } => extensions::extension_peers(self, &target, &name).await,
            Route::Broadcast { name } => extensions::broadcast(self, &target, &name, request).await,
            Route::SendToPeer { name, peer } => {
                extensions::send_to_peer(self, &target, &name, &peer, request).await
            }
            Route::ResolveKey => write::resolve_key(self, &target).await,
            Route::CreateKey => write::create_key(self, &target).await,
            Route::Put => write::put(self, &target, request).await,
            Route::Delete => write::delete(self, &target).await,
            Route::Head => read::head(self, &target, &accept, range.as_deref()).await,
            Route::Get => read::get(self, &target, &accept, range.as_deref()).await,
            Route::NotAllowed => Ok(Response::method_not_allowed()),
        }
    }
}
