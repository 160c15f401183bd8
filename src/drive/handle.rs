use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::drive::store::{Core, Drive, Extension};
use crate::drive::types::Peer;

/// An opened drive shared by every request against its origins.
///
/// Owns the extension channels registered through the adapter, at most one
/// per name.
pub struct DriveHandle {
    drive: Arc<dyn Drive>,
    core: Arc<dyn Core>,
    extensions: Mutex<Vec<Arc<dyn Extension>>>,
    last_used: AtomicU64,
}

impl DriveHandle {
    pub fn new(drive: Arc<dyn Drive>) -> Self {
        let core = drive.core();
        Self {
            drive,
            core,
            extensions: Mutex::new(Vec::new()),
            last_used: AtomicU64::new(0),
        }
    }

    /// Canonical identity (hex public key).
    pub fn id(&self) -> String {
        self.core.id()
    }

    pub fn url(&self) -> String {
        self.core.url()
    }

    pub fn drive(&self) -> &dyn Drive {
        self.drive.as_ref()
    }

    pub fn core(&self) -> &dyn Core {
        self.core.as_ref()
    }

    /// Returns the channel registered under `name`, registering it first if
    /// needed.
    pub fn extension(&self, name: &str) -> Arc<dyn Extension> {
        let mut extensions = self.extensions.lock();
        if let Some(existing) = extensions.iter().find(|ext| ext.name() == name) {
            return existing.clone();
        }

        tracing::info!(extension = name, drive = %self.url(), "Initializing extension");
        let extension = self.core.register_extension(name);
        extensions.push(extension.clone());
        extension
    }

    /// Registered channel names in registration order.
    pub fn extension_names(&self) -> Vec<String> {
        self.extensions
            .lock()
            .iter()
            .map(|ext| ext.name().to_string())
            .collect()
    }

    /// Connected peers that registered `name` on their side.
    pub fn extension_peers(&self, name: &str) -> Vec<Peer> {
        self.core
            .peers()
            .into_iter()
            .filter(|peer| peer.supports(name))
            .collect()
    }

    pub(crate) fn touch(&self, tick: u64) {
        self.last_used.store(tick, Ordering::Relaxed);
    }

    pub(crate) fn last_used(&self) -> u64 {
        self.last_used.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for DriveHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveHandle")
            .field("id", &self.id())
            .field("extensions", &self.extension_names())
            .finish()
    }
}
