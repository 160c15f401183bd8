use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Metadata stored alongside an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Modification time in milliseconds since the Unix epoch
    pub mtime: Option<u64>,
}

/// Location of an entry's content in the blob store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blob {
    pub byte_offset: u64,
    pub byte_length: u64,
}

/// The file record at a path and the version that wrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Absolute path inside the drive
    pub key: String,
    /// Log position of the write that produced this entry
    pub seq: u64,
    pub blob: Blob,
    pub metadata: Option<Metadata>,
}

impl Entry {
    pub fn size(&self) -> u64 {
        self.blob.byte_length
    }

    pub fn mtime(&self) -> Option<u64> {
        self.metadata.as_ref().and_then(|m| m.mtime)
    }
}

/// Transfer counters for one replication connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerStats {
    pub uploaded_bytes: u64,
    pub uploaded_blocks: u64,
    pub downloaded_bytes: u64,
    pub downloaded_blocks: u64,
}

/// A connected replication counterpart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Peer {
    /// Hex public key, absent until the handshake completes
    pub remote_public_key: Option<String>,
    pub remote_address: Option<String>,
    pub remote_type: Option<String>,
    pub stats: PeerStats,
    /// Extension channel names the remote side has registered
    pub remote_extensions: Vec<String>,
}

impl Peer {
    pub fn id(&self) -> Option<&str> {
        self.remote_public_key.as_deref()
    }

    pub fn supports(&self, extension: &str) -> bool {
        self.remote_extensions.iter().any(|name| name == extension)
    }
}

/// Something that happened on a drive's replication swarm.
#[derive(Debug, Clone)]
pub enum SwarmEvent {
    /// A peer finished its handshake
    PeerOpen(Peer),
    /// A peer connection dropped
    PeerRemove(Peer),
    /// A peer sent a payload on a registered extension channel
    Message {
        extension: String,
        peer: Peer,
        payload: Bytes,
    },
}
