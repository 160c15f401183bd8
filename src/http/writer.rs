use bytes::Bytes;
use futures_util::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::body::{Body, BodyStream};
use crate::http::response::{HEADER_CONTENT_LENGTH, Response};

const HTTP_VERSION: &str = "HTTP/1.1";

fn serialize_head(resp: &Response, chunked: bool) -> Vec<u8> {
    let mut buf = Vec::new();

    // Status line
    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.status.reason_phrase()
    );
    buf.extend_from_slice(status_line.as_bytes());

    // Headers
    for (k, v) in &resp.headers {
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    if chunked {
        buf.extend_from_slice(b"Transfer-Encoding: chunked\r\n");
    }

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    buf
}

enum Payload {
    None,
    Fixed(Bytes),
    Raw(BodyStream),
    Chunked(BodyStream),
}

/// Writes one response to the client.
///
/// Bodies with a known length are written as-is. A streamed body without a
/// Content-Length header is sent with chunked transfer encoding so the
/// connection can be reused afterwards.
pub struct ResponseWriter {
    head: Vec<u8>,
    written: usize,
    payload: Payload,
}

impl ResponseWriter {
    /// `head_only` suppresses the body, as required for HEAD requests.
    pub fn new(response: Response, head_only: bool) -> Self {
        let has_length = response.headers.contains_key(HEADER_CONTENT_LENGTH);
        let chunked = !head_only && !has_length && matches!(response.body, Body::Stream(_));
        let head = serialize_head(&response, chunked);

        let payload = match response.body {
            _ if head_only => Payload::None,
            Body::Empty => Payload::None,
            Body::Full(bytes) => Payload::Fixed(bytes),
            Body::Stream(stream) if chunked => Payload::Chunked(stream),
            Body::Stream(stream) => Payload::Raw(stream),
        };

        Self {
            head,
            written: 0,
            payload,
        }
    }

    /// Whether the body is a stream of unknown length, which only ends when
    /// its producer stops.
    pub fn is_unsized(&self) -> bool {
        matches!(self.payload, Payload::Chunked(_))
    }

    pub async fn write_to_stream<W>(&mut self, stream: &mut W) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        while self.written < self.head.len() {
            let n = stream.write(&self.head[self.written..]).await?;

            if n == 0 {
                return Err(anyhow::anyhow!("connection closed while writing"));
            }

            self.written += n;
        }

        match std::mem::replace(&mut self.payload, Payload::None) {
            Payload::None => {}
            Payload::Fixed(bytes) => stream.write_all(&bytes).await?,
            Payload::Raw(mut body) => {
                while let Some(chunk) = body.next().await {
                    stream.write_all(&chunk?).await?;
                    stream.flush().await?;
                }
            }
            Payload::Chunked(mut body) => {
                while let Some(chunk) = body.next().await {
                    let chunk = chunk?;
                    if chunk.is_empty() {
                        continue;
                    }
                    stream
                        .write_all(format!("{:x}\r\n", chunk.len()).as_bytes())
                        .await?;
                    stream.write_all(&chunk).await?;
                    stream.write_all(b"\r\n").await?;
                    stream.flush().await?;
                }
                stream.write_all(b"0\r\n\r\n").await?;
            }
        }

        stream.flush().await?;
        Ok(())
    }
}
