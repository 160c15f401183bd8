//! HTTP protocol implementation.
//!
//! A small HTTP/1.1 front end for the drive adapter, with keep-alive
//! connections, streamed (length-framed or chunked) request bodies and
//! streamed (chunked) responses.
//!
//! # Architecture
//!
//! - **`connection`**: The request-response state machine for one client
//! - **`parser`**: Parses request heads from byte buffers
//! - **`request`**: HTTP request representation, origin and URL extraction
//! - **`response`**: Tagged response type with builder pattern
//! - **`body`**: Empty, buffered or streamed bodies shared by both directions
//! - **`writer`**: Serializes and writes responses to the client
//! - **`mime`**: MIME type detection based on file extensions
//! - **`range`**: `Range` header parsing
//! - **`multipart`**: Streaming `multipart/form-data` decomposition
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Wait for incoming request head
//!        └──────┬──────┘
//!               │ Request received
//!               ▼
//!        ┌──────────────────┐
//!        │   Processing     │ ← Run handler, pump request body
//!        └──────┬───────────┘
//!               │ Response ready
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← Send response; unsized streams watch for disconnect
//!        └──────┬───────────┘
//!               │ Response sent
//!               ├─ Keep-Alive → Reading (same connection)
//!               └─ Close / client gone → Closed
//! ```

pub mod body;
pub mod connection;
pub mod mime;
pub mod multipart;
pub mod parser;
pub mod range;
pub mod request;
pub mod response;
pub mod writer;
