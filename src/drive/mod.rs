//! Drives and the registry that hands them out.
//!
//! `store` describes what the adapter needs from the storage engine,
//! `memory` is an in-process engine, and `registry` caches opened drives
//! per origin.

pub mod handle;
pub mod memory;
pub mod registry;
pub mod store;
pub mod types;

pub use handle::DriveHandle;
pub use registry::DriveRegistry;
pub use store::{Core, Drive, EntryWriter, Extension, Sdk};
pub use types::{Entry, Metadata, Peer, PeerStats, SwarmEvent};

/// Normalizes a drive path: leading `/`, no empty, `.` or `..` segments,
/// no trailing `/`.
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Joins `name` onto `base` and normalizes the result. `..` never climbs
/// above the root.
pub fn join_path(base: &str, name: &str) -> String {
    normalize_path(&format!("{base}/{name}"))
}

/// The key prefix shared by everything inside directory `path`.
pub fn dir_prefix(path: &str) -> String {
    let path = normalize_path(path);
    if path == "/" { path } else { format!("{path}/") }
}
