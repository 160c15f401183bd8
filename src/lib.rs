//! drivefetch - HTTP adapter for peer-replicated drives
//!
//! Maps method-and-path requests against `hyper://` origins onto drive
//! reads, writes, listings and extension messaging.

pub mod config;
pub mod drive;
pub mod error;
pub mod fetch;
pub mod http;
pub mod server;
