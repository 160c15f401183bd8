//! In-process storage engine.
//!
//! Keeps every drive in memory and simulates the replication swarm, so the
//! adapter can be served and tested without a real peer-to-peer engine.
//! Peers are attached by hand through [`MemoryCore`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use anyhow::bail;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::stream;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;

use crate::drive::store::{Core, Drive, EntryWriter, Extension, Sdk};
use crate::drive::types::{Blob, Entry, Metadata, Peer, SwarmEvent};
use crate::drive::{dir_prefix, normalize_path};
use crate::http::body::BodyStream;
use crate::http::range::ByteRange;

const READ_CHUNK: usize = 64 * 1024;
const EVENT_CAPACITY: usize = 256;

fn random_key() -> String {
    hex::encode(rand::random::<[u8; 32]>())
}

fn is_key(origin: &str) -> bool {
    origin.len() == 64 && origin.bytes().all(|b| b.is_ascii_hexdigit())
}

#[derive(Default)]
pub struct MemorySdk {
    /// Drives by every origin they were opened under, and by id
    drives: RwLock<HashMap<String, Arc<MemoryDrive>>>,
    /// Writable drives by namespace name
    named: RwLock<HashMap<String, Arc<MemoryDrive>>>,
    opens: AtomicUsize,
}

impl MemorySdk {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times a drive was opened through [`Sdk::get`] or
    /// [`Sdk::open_named`].
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Looks up an already opened drive by origin, id or namespace name.
    pub fn drive(&self, origin: &str) -> Option<Arc<MemoryDrive>> {
        if let Some(drive) = self.drives.read().get(origin) {
            return Some(drive.clone());
        }
        self.named.read().get(origin).cloned()
    }
}

#[async_trait]
impl Sdk for MemorySdk {
    async fn get(&self, origin: &str) -> anyhow::Result<Arc<dyn Drive>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        // Opening suspends in a real engine
        tokio::task::yield_now().await;

        let mut drives = self.drives.write();
        if let Some(drive) = drives.get(origin) {
            return Ok(drive.clone());
        }

        // Unknown keys belong to someone else; names are local and writable
        let drive = if is_key(origin) {
            MemoryDrive::new(origin.to_string(), false)
        } else {
            MemoryDrive::new(random_key(), true)
        };
        drives.insert(origin.to_string(), drive.clone());
        drives.insert(drive.state.core.id.clone(), drive.clone());

        Ok(drive)
    }

    async fn named_core_length(&self, name: &str) -> anyhow::Result<u64> {
        Ok(self
            .named
            .read()
            .get(name)
            .map(|drive| drive.state.core.length())
            .unwrap_or(0))
    }

    async fn open_named(&self, name: &str) -> anyhow::Result<Arc<dyn Drive>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        let mut named = self.named.write();
        if let Some(drive) = named.get(name) {
            return Ok(drive.clone());
        }

        let drive = MemoryDrive::new(random_key(), true);
        // header block
        drive.state.core.append();
        named.insert(name.to_string(), drive.clone());
        self.drives
            .write()
            .insert(drive.state.core.id.clone(), drive.clone());

        Ok(drive)
    }
}

struct StoredFile {
    entry: Entry,
    data: Bytes,
}

struct DriveState {
    core: Arc<MemoryCore>,
    writable: bool,
    files: RwLock<BTreeMap<String, StoredFile>>,
    blob_bytes: AtomicU64,
}

pub struct MemoryDrive {
    state: Arc<DriveState>,
}

impl MemoryDrive {
    fn new(id: String, writable: bool) -> Arc<Self> {
        Arc::new(Self {
            state: Arc::new(DriveState {
                core: Arc::new(MemoryCore::new(id)),
                writable,
                files: RwLock::new(BTreeMap::new()),
                blob_bytes: AtomicU64::new(0),
            }),
        })
    }

    /// The concrete core, for attaching simulated peers.
    pub fn memory_core(&self) -> Arc<MemoryCore> {
        self.state.core.clone()
    }
}

#[async_trait]
impl Drive for MemoryDrive {
    fn core(&self) -> Arc<dyn Core> {
        self.state.core.clone()
    }

    async fn ready(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn entry(&self, path: &str) -> anyhow::Result<Option<Entry>> {
        let key = normalize_path(path);
        Ok(self.state.files.read().get(&key).map(|f| f.entry.clone()))
    }

    async fn readdir(&self, path: &str) -> anyhow::Result<Vec<String>> {
        let prefix = dir_prefix(path);
        let files = self.state.files.read();

        let mut names: Vec<String> = Vec::new();
        for key in files.range(prefix.clone()..).map(|(key, _)| key) {
            let Some(rest) = key.strip_prefix(&prefix) else {
                break;
            };
            let child = rest.split('/').next().unwrap_or(rest);
            if names.last().map(String::as_str) != Some(child) {
                names.push(child.to_string());
            }
        }

        Ok(names)
    }

    async fn list(&self, path: &str) -> anyhow::Result<Vec<Entry>> {
        let prefix = dir_prefix(path);
        let files = self.state.files.read();

        Ok(files
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .map(|(_, file)| file.entry.clone())
            .collect())
    }

    async fn create_read_stream(
        &self,
        path: &str,
        range: Option<ByteRange>,
    ) -> anyhow::Result<BodyStream> {
        let key = normalize_path(path);
        let data = match self.state.files.read().get(&key) {
            Some(file) => file.data.clone(),
            None => bail!("no entry at {key}"),
        };

        let data = match range {
            Some(range) => {
                let start = range.start as usize;
                let end = (range.end as usize).saturating_add(1).min(data.len());
                if start > end {
                    bail!("range {range} is outside of {key}");
                }
                data.slice(start..end)
            }
            None => data,
        };

        let chunks: Vec<std::io::Result<Bytes>> = data
            .chunks(READ_CHUNK)
            .map(|chunk| Ok(data.slice_ref(chunk)))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn create_write_stream(
        &self,
        path: &str,
        metadata: Option<Metadata>,
    ) -> anyhow::Result<Box<dyn EntryWriter>> {
        if !self.state.writable {
            bail!("drive {} is not writable", self.state.core.id);
        }

        Ok(Box::new(MemoryWriter {
            state: self.state.clone(),
            key: normalize_path(path),
            metadata,
            buf: BytesMut::new(),
        }))
    }

    async fn del(&self, path: &str) -> anyhow::Result<()> {
        if !self.state.writable {
            bail!("drive {} is not writable", self.state.core.id);
        }

        let key = normalize_path(path);
        if self.state.files.write().remove(&key).is_some() {
            self.state.core.append();
        }
        Ok(())
    }
}

struct MemoryWriter {
    state: Arc<DriveState>,
    key: String,
    metadata: Option<Metadata>,
    buf: BytesMut,
}

#[async_trait]
impl EntryWriter for MemoryWriter {
    async fn write(&mut self, chunk: Bytes) -> anyhow::Result<()> {
        self.buf.extend_from_slice(&chunk);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> anyhow::Result<Entry> {
        let MemoryWriter {
            state,
            key,
            metadata,
            buf,
        } = *self;
        let data = buf.freeze();
        let byte_length = data.len() as u64;
        let byte_offset = state.blob_bytes.fetch_add(byte_length, Ordering::SeqCst);

        let mut files = state.files.write();
        let entry = Entry {
            key: key.clone(),
            seq: state.core.append(),
            blob: Blob {
                byte_offset,
                byte_length,
            },
            metadata,
        };
        files.insert(
            key,
            StoredFile {
                entry: entry.clone(),
                data,
            },
        );

        Ok(entry)
    }

    async fn abort(self: Box<Self>) {}
}

/// A message an extension sent to a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub extension: String,
    pub peer: String,
    pub payload: Bytes,
}

struct Swarm {
    peers: Mutex<Vec<Peer>>,
    outbox: Mutex<Vec<OutboundMessage>>,
}

impl Swarm {
    fn deliver(&self, extension: &str, payload: &Bytes, peer: &Peer) {
        if let Some(id) = peer.id() {
            self.outbox.lock().push(OutboundMessage {
                extension: extension.to_string(),
                peer: id.to_string(),
                payload: payload.clone(),
            });
        }
    }
}

pub struct MemoryCore {
    id: String,
    length: AtomicU64,
    swarm: Arc<Swarm>,
    extensions: Mutex<HashSet<String>>,
    events: broadcast::Sender<SwarmEvent>,
}

impl MemoryCore {
    fn new(id: String) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            id,
            length: AtomicU64::new(0),
            swarm: Arc::new(Swarm {
                peers: Mutex::new(Vec::new()),
                outbox: Mutex::new(Vec::new()),
            }),
            extensions: Mutex::new(HashSet::new()),
            events,
        }
    }

    /// Appends a block and returns its sequence number.
    fn append(&self) -> u64 {
        self.length.fetch_add(1, Ordering::SeqCst)
    }

    /// Simulates a peer completing its handshake.
    pub fn connect(&self, peer: Peer) {
        self.swarm.peers.lock().push(peer.clone());
        let _ = self.events.send(SwarmEvent::PeerOpen(peer));
    }

    /// Simulates a peer connection dropping.
    pub fn disconnect(&self, peer_id: &str) -> Option<Peer> {
        let peer = {
            let mut peers = self.swarm.peers.lock();
            let index = peers.iter().position(|p| p.id() == Some(peer_id))?;
            peers.remove(index)
        };
        let _ = self.events.send(SwarmEvent::PeerRemove(peer.clone()));
        Some(peer)
    }

    /// Simulates a connection that dropped before its handshake finished.
    pub fn abort_handshake(&self, peer: Peer) {
        let _ = self.events.send(SwarmEvent::PeerRemove(peer));
    }

    /// Simulates `peer_id` sending `payload` on an extension channel.
    ///
    /// Returns false when the channel is not registered locally or the peer
    /// is not connected; such messages are dropped.
    pub fn receive(&self, extension: &str, peer_id: &str, payload: impl Into<Bytes>) -> bool {
        if !self.extensions.lock().contains(extension) {
            return false;
        }
        let Some(peer) = self
            .swarm
            .peers
            .lock()
            .iter()
            .find(|p| p.id() == Some(peer_id))
            .cloned()
        else {
            return false;
        };

        let _ = self.events.send(SwarmEvent::Message {
            extension: extension.to_string(),
            peer,
            payload: payload.into(),
        });
        true
    }

    /// Everything sent to peers so far.
    pub fn outbox(&self) -> Vec<OutboundMessage> {
        self.swarm.outbox.lock().clone()
    }

    pub fn registered_extensions(&self) -> usize {
        self.extensions.lock().len()
    }

    /// Live event subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }
}

impl Core for MemoryCore {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn length(&self) -> u64 {
        self.length.load(Ordering::SeqCst)
    }

    fn peers(&self) -> Vec<Peer> {
        self.swarm.peers.lock().clone()
    }

    fn register_extension(&self, name: &str) -> Arc<dyn Extension> {
        self.extensions.lock().insert(name.to_string());
        Arc::new(MemoryExtension {
            name: name.to_string(),
            swarm: self.swarm.clone(),
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<SwarmEvent> {
        self.events.subscribe()
    }
}

struct MemoryExtension {
    name: String,
    swarm: Arc<Swarm>,
}

impl Extension for MemoryExtension {
    fn name(&self) -> &str {
        &self.name
    }

    fn broadcast(&self, payload: Bytes) {
        let peers = self.swarm.peers.lock().clone();
        for peer in peers.iter().filter(|p| p.supports(&self.name)) {
            self.swarm.deliver(&self.name, &payload, peer);
        }
    }

    fn send(&self, payload: Bytes, peer: &Peer) {
        self.swarm.deliver(&self.name, &payload, peer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    async fn write(drive: &MemoryDrive, path: &str, data: &'static [u8]) -> Entry {
        let mut writer = drive.create_write_stream(path, None).await.unwrap();
        writer.write(Bytes::from_static(data)).await.unwrap();
        writer.finish().await.unwrap()
    }

    #[tokio::test]
    async fn sequence_numbers_increase_with_every_write() {
        let drive = MemoryDrive::new(random_key(), true);
        let first = write(&drive, "/a.txt", b"1").await;
        let second = write(&drive, "/a.txt", b"22").await;

        assert!(second.seq > first.seq);
        assert_eq!(second.size(), 2);
        assert_eq!(second.blob.byte_offset, 1);
    }

    #[tokio::test]
    async fn readdir_lists_immediate_children_once() {
        let drive = MemoryDrive::new(random_key(), true);
        write(&drive, "/a/b.txt", b"x").await;
        write(&drive, "/a/c/d.txt", b"x").await;
        write(&drive, "/a/c/e.txt", b"x").await;
        write(&drive, "/z.txt", b"x").await;

        assert_eq!(drive.readdir("/a/").await.unwrap(), vec!["b.txt", "c"]);
        assert_eq!(drive.readdir("/").await.unwrap(), vec!["a", "z.txt"]);
        assert_eq!(drive.list("/a/").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn ranged_read_is_inclusive() {
        let drive = MemoryDrive::new(random_key(), true);
        write(&drive, "/f", b"0123456789").await;

        let mut stream = drive
            .create_read_stream("/f", Some(ByteRange { start: 2, end: 4 }))
            .await
            .unwrap();
        let chunk = stream.next().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"234");
    }

    #[tokio::test]
    async fn remote_drives_reject_writes() {
        let drive = MemoryDrive::new(random_key(), false);
        assert!(drive.create_write_stream("/a", None).await.is_err());
    }
}
