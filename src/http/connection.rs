use std::io;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadHalf, WriteHalf};

use crate::fetch::HyperFetch;
use crate::http::body::{Body, BodySender};
use crate::http::parser::{ParseError, parse_http_request};
use crate::http::request::{Method, Request};
use crate::http::response::Response;
use crate::http::writer::ResponseWriter;

/// Chunks buffered between the socket and a handler reading the body.
const BODY_CHANNEL_DEPTH: usize = 4;
const READ_CHUNK: usize = 8192;
/// Bound on a chunk-size or trailer line.
const MAX_CHUNK_LINE: usize = 8192;

pub struct Connection<S> {
    reader: ReadHalf<S>,
    writer: WriteHalf<S>,
    buffer: Vec<u8>,
    state: ConnectionState,
    fetch: HyperFetch,
}

pub enum ConnectionState {
    Reading,
    Processing(Request),
    Writing(ResponseWriter, bool), // bool = keep_alive?
    Closed,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(stream: S, fetch: HyperFetch) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader,
            writer,
            buffer: Vec::with_capacity(4096),
            state: ConnectionState::Reading,
            fetch,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            match std::mem::replace(&mut self.state, ConnectionState::Closed) {
                ConnectionState::Reading => {
                    self.state = match self.read_request().await? {
                        Some(req) => ConnectionState::Processing(req),
                        None => ConnectionState::Closed,
                    };
                }

                ConnectionState::Processing(req) => {
                    let keep_alive = req.keep_alive();
                    let head_only = req.method == Method::HEAD;
                    let method = req.method;
                    let target = req.path.clone();

                    let (response, body_intact) = self.handle_request(req).await;
                    tracing::info!(
                        method = method.as_str(),
                        path = %target,
                        status = response.status.as_u16(),
                        "Request handled"
                    );

                    let writer = ResponseWriter::new(response, head_only);
                    // Without an intact body the next request cannot be located
                    self.state = ConnectionState::Writing(writer, keep_alive && body_intact);
                }

                ConnectionState::Writing(mut writer, keep_alive) => {
                    let closed = if writer.is_unsized() {
                        // An unsized stream may never end on its own, so the
                        // read side is watched for the client going away.
                        tokio::select! {
                            res = writer.write_to_stream(&mut self.writer) => {
                                res?;
                                false
                            }
                            res = wait_for_close(&mut self.reader, &mut self.buffer) => {
                                res?;
                                true
                            }
                        }
                    } else {
                        // A half-closed client still gets its response
                        writer.write_to_stream(&mut self.writer).await?;
                        false
                    };

                    self.state = if closed {
                        tracing::debug!("Client closed connection while response was streaming");
                        ConnectionState::Closed
                    } else if keep_alive {
                        ConnectionState::Reading // go back for next request
                    } else {
                        ConnectionState::Closed
                    };
                }

                ConnectionState::Closed => {
                    break;
                }
            }
        }

        Ok(())
    }

    pub async fn read_request(&mut self) -> anyhow::Result<Option<Request>> {
        loop {
            // Try parsing whatever we already have
            match parse_http_request(&self.buffer) {
                Ok((request, consumed)) => {
                    // Remove consumed bytes
                    self.buffer.drain(..consumed);
                    return Ok(Some(request));
                }

                Err(ParseError::Incomplete) => {
                    // Need more data → fall through to read
                }

                Err(e) => {
                    // Malformed request → protocol error
                    return Err(anyhow::anyhow!("HTTP parse error: {:?}", e));
                }
            }

            // Read more data
            let mut temp = [0u8; 1024];
            let n = self.reader.read(&mut temp).await?;

            if n == 0 {
                // Client closed connection
                return Ok(None);
            }

            self.buffer.extend_from_slice(&temp[..n]);
        }
    }

    /// Runs the handler while the request body is pumped off the socket.
    ///
    /// The flag is false when the body could not be read in full; the
    /// handler has then seen the failure as a body error.
    async fn handle_request(&mut self, mut req: Request) -> (Response, bool) {
        let framing = if req.is_chunked() {
            Framing::Chunked
        } else {
            match req.content_length() {
                0 => return (self.fetch.fetch(req).await, true),
                length => Framing::Length(length),
            }
        };

        let (tx, body) = Body::channel(BODY_CHANNEL_DEPTH);
        req.body = body;

        let fetch = self.fetch.clone();
        let (response, pumped) = tokio::join!(
            fetch.fetch(req),
            pump_body(&mut self.reader, &mut self.buffer, framing, tx),
        );

        match pumped {
            Ok(()) => (response, true),
            Err(e) => {
                tracing::debug!(error = %e, "Request body was not received intact");
                (response, false)
            }
        }
    }
}

/// How the request body is delimited on the wire.
#[derive(Debug, Clone, Copy)]
enum Framing {
    Length(usize),
    Chunked,
}

/// Forwards body chunks to the handler for as long as it listens.
///
/// Bytes are still consumed after the handler stops listening, so the next
/// request on the connection starts at the right offset.
struct BodyPump {
    tx: BodySender,
    listening: bool,
}

impl BodyPump {
    async fn send(&mut self, chunk: Bytes) {
        if self.listening {
            self.listening = self.tx.send(Ok(chunk)).await.is_ok();
        }
    }

    /// Hands `err` to the handler so a partial body is never taken as complete.
    async fn fail(&mut self, err: &io::Error) {
        if self.listening {
            let _ = self
                .tx
                .send(Err(io::Error::new(err.kind(), err.to_string())))
                .await;
            self.listening = false;
        }
    }
}

async fn pump_body<R>(
    reader: &mut R,
    buffer: &mut Vec<u8>,
    framing: Framing,
    tx: BodySender,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut pump = BodyPump {
        tx,
        listening: true,
    };

    let result = match framing {
        Framing::Length(length) => pump_length(reader, buffer, length, &mut pump).await,
        Framing::Chunked => pump_chunked(reader, buffer, &mut pump).await,
    };
    if let Err(e) = &result {
        pump.fail(e).await;
    }
    result
}

/// Feeds exactly `length` body bytes to the handler.
async fn pump_length<R>(
    reader: &mut R,
    buffer: &mut Vec<u8>,
    mut length: usize,
    pump: &mut BodyPump,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let buffered = buffer.len().min(length);
    if buffered > 0 {
        let chunk = Bytes::copy_from_slice(&buffer[..buffered]);
        buffer.drain(..buffered);
        length -= buffered;
        pump.send(chunk).await;
    }

    let mut temp = vec![0u8; READ_CHUNK];
    while length > 0 {
        let want = length.min(READ_CHUNK);
        let n = reader.read(&mut temp[..want]).await?;
        if n == 0 {
            return Err(body_eof());
        }

        length -= n;
        pump.send(Bytes::copy_from_slice(&temp[..n])).await;
    }

    Ok(())
}

/// Decodes a `Transfer-Encoding: chunked` body and feeds its data to the
/// handler. Trailer fields are read and dropped.
async fn pump_chunked<R>(
    reader: &mut R,
    buffer: &mut Vec<u8>,
    pump: &mut BodyPump,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    loop {
        let line = read_line(reader, buffer).await?;
        let size = line
            .split(';')
            .next()
            .map(str::trim)
            .filter(|size| size.bytes().all(|b| b.is_ascii_hexdigit()))
            .and_then(|size| usize::from_str_radix(size, 16).ok())
            .ok_or_else(|| invalid_body("malformed chunk size"))?;

        if size == 0 {
            while !read_line(reader, buffer).await?.is_empty() {}
            return Ok(());
        }

        let mut remaining = size;
        while remaining > 0 {
            if buffer.is_empty() && !fill(reader, buffer).await? {
                return Err(body_eof());
            }
            let n = buffer.len().min(remaining);
            let chunk = Bytes::copy_from_slice(&buffer[..n]);
            buffer.drain(..n);
            remaining -= n;
            pump.send(chunk).await;
        }

        if !read_line(reader, buffer).await?.is_empty() {
            return Err(invalid_body("chunk data longer than its declared size"));
        }
    }
}

/// Next CRLF-terminated line, without the terminator.
async fn read_line<R>(reader: &mut R, buffer: &mut Vec<u8>) -> io::Result<String>
where
    R: AsyncRead + Unpin,
{
    loop {
        if let Some(pos) = buffer.windows(2).position(|w| w == b"\r\n") {
            let line = String::from_utf8_lossy(&buffer[..pos]).into_owned();
            buffer.drain(..pos + 2);
            return Ok(line);
        }
        if buffer.len() > MAX_CHUNK_LINE {
            return Err(invalid_body("chunk line too long"));
        }
        if !fill(reader, buffer).await? {
            return Err(body_eof());
        }
    }
}

/// Appends whatever the socket has next. False once the peer closed.
async fn fill<R>(reader: &mut R, buffer: &mut Vec<u8>) -> io::Result<bool>
where
    R: AsyncRead + Unpin,
{
    let mut temp = [0u8; 1024];
    let n = reader.read(&mut temp).await?;
    buffer.extend_from_slice(&temp[..n]);
    Ok(n > 0)
}

fn body_eof() -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "client closed connection before sending the whole body",
    )
}

fn invalid_body(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

/// Resolves once the peer closes its side of the connection.
///
/// Pipelined bytes that arrive in the meantime are kept for the next request.
async fn wait_for_close<R>(reader: &mut R, buffer: &mut Vec<u8>) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut temp = [0u8; 1024];
    loop {
        let n = reader.read(&mut temp).await?;
        if n == 0 {
            return Ok(());
        }
        buffer.extend_from_slice(&temp[..n]);
    }
}
