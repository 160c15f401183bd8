//! Interface of the replicated, versioned storage engine.
//!
//! The adapter never touches the append-only log, replication or discovery
//! directly. Everything it needs from the engine goes through these traits.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;

use crate::drive::types::{Entry, Metadata, Peer, SwarmEvent};
use crate::http::body::BodyStream;
use crate::http::range::ByteRange;

/// Entry point into the storage engine.
#[async_trait]
pub trait Sdk: Send + Sync {
    /// Locates the drive named by `origin` (a name or a public key) and opens
    /// it in a namespace keyed by the drive's identity.
    async fn get(&self, origin: &str) -> anyhow::Result<Arc<dyn Drive>>;

    /// Length of the `db` core in the namespace called `name`.
    ///
    /// Zero means nothing was ever written there.
    async fn named_core_length(&self, name: &str) -> anyhow::Result<u64>;

    /// Opens the writable drive in the namespace called `name`, creating it
    /// when missing.
    async fn open_named(&self, name: &str) -> anyhow::Result<Arc<dyn Drive>>;
}

/// A versioned file tree on top of a core.
#[async_trait]
pub trait Drive: Send + Sync {
    fn core(&self) -> Arc<dyn Core>;

    async fn ready(&self) -> anyhow::Result<()>;

    /// The file entry at `path`. `None` for missing paths and directories.
    async fn entry(&self, path: &str) -> anyhow::Result<Option<Entry>>;

    /// Names of the immediate children of directory `path`.
    async fn readdir(&self, path: &str) -> anyhow::Result<Vec<String>>;

    /// Every file entry below directory `path`, recursively.
    async fn list(&self, path: &str) -> anyhow::Result<Vec<Entry>>;

    /// Streams the content at `path`, optionally limited to `range`.
    async fn create_read_stream(
        &self,
        path: &str,
        range: Option<ByteRange>,
    ) -> anyhow::Result<BodyStream>;

    /// Opens a writer that replaces the content at `path` once finished.
    async fn create_write_stream(
        &self,
        path: &str,
        metadata: Option<Metadata>,
    ) -> anyhow::Result<Box<dyn EntryWriter>>;

    async fn del(&self, path: &str) -> anyhow::Result<()>;
}

/// Destination of a write. Each `write` completes only when the chunk has
/// been accepted, which is what paces the source.
#[async_trait]
pub trait EntryWriter: Send {
    async fn write(&mut self, chunk: Bytes) -> anyhow::Result<()>;

    async fn finish(self: Box<Self>) -> anyhow::Result<Entry>;

    /// Gives up on the write. Bytes already accepted are not rolled back by
    /// every engine.
    async fn abort(self: Box<Self>);
}

/// The replicated log behind a drive, and its live peer connections.
pub trait Core: Send + Sync {
    /// Hex public key
    fn id(&self) -> String;

    fn url(&self) -> String {
        format!("hyper://{}/", self.id())
    }

    /// Number of blocks in the log
    fn length(&self) -> u64;

    fn peers(&self) -> Vec<Peer>;

    /// Registers an extension channel. Messages peers send on it are
    /// published as [`SwarmEvent::Message`].
    fn register_extension(&self, name: &str) -> Arc<dyn Extension>;

    /// Live feed of peer and message events. Dropping the receiver
    /// unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<SwarmEvent>;
}

/// A registered extension channel.
pub trait Extension: Send + Sync {
    fn name(&self) -> &str;

    /// Sends to every connected peer that registered the same name.
    fn broadcast(&self, payload: Bytes);

    fn send(&self, payload: Bytes, peer: &Peer);
}
