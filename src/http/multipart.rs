//! Streaming `multipart/form-data` reader.
//!
//! Parts are read one at a time straight off the request body. A part's
//! bytes are handed out as they arrive, so a large upload never has to be
//! held in memory.

use std::io;

use bytes::{Buf, Bytes, BytesMut};
use futures_util::stream::{self, Stream, StreamExt};

use crate::http::body::BodyStream;

const MAX_PART_HEAD: usize = 16 * 1024;

/// Headers of a single form part.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Part {
    /// Form field name from `Content-Disposition`
    pub name: Option<String>,
    /// Declared file name, present for file uploads
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

enum State {
    Preamble,
    Boundary,
    Body,
    Done,
}

pub struct Multipart {
    source: BodyStream,
    buf: BytesMut,
    /// `--boundary`
    dash_boundary: Vec<u8>,
    /// `\r\n--boundary`
    delimiter: Vec<u8>,
    state: State,
    eof: bool,
}

/// Extracts the boundary parameter from a `multipart/form-data` content type.
pub fn boundary(content_type: &str) -> Option<String> {
    let (essence, params) = content_type.split_once(';')?;
    if !essence.trim().eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    parse_params(params)
        .into_iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

impl Multipart {
    pub fn new(source: BodyStream, boundary: &str) -> Self {
        let dash_boundary = [b"--", boundary.as_bytes()].concat();
        let delimiter = [b"\r\n", dash_boundary.as_slice()].concat();
        Self {
            source,
            buf: BytesMut::new(),
            dash_boundary,
            delimiter,
            state: State::Preamble,
            eof: false,
        }
    }

    /// Advances to the next part, skipping whatever is left of the current one.
    ///
    /// Returns `None` after the closing boundary.
    pub async fn next_part(&mut self) -> io::Result<Option<Part>> {
        loop {
            match self.state {
                State::Done => return Ok(None),
                State::Body => while self.next_chunk().await?.is_some() {},
                State::Preamble => self.skip_preamble().await?,
                State::Boundary => {
                    self.fill_to(2).await?;
                    if self.buf.starts_with(b"--") {
                        self.state = State::Done;
                        return Ok(None);
                    }
                    if !self.buf.starts_with(b"\r\n") {
                        return Err(invalid("malformed multipart boundary line"));
                    }
                    self.buf.advance(2);

                    let part = self.read_part_head().await?;
                    self.state = State::Body;
                    return Ok(Some(part));
                }
            }
        }
    }

    /// Next chunk of the current part's body, `None` once the part ends.
    pub async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        if !matches!(self.state, State::Body) {
            return Ok(None);
        }

        loop {
            if let Some(pos) = find(&self.buf, &self.delimiter) {
                if pos > 0 {
                    return Ok(Some(self.buf.split_to(pos).freeze()));
                }
                self.buf.advance(self.delimiter.len());
                self.state = State::Boundary;
                return Ok(None);
            }

            // Hold back enough bytes to recognise a delimiter split across reads
            let keep = self.delimiter.len() - 1;
            if self.buf.len() > keep {
                let ready = self.buf.len() - keep;
                return Ok(Some(self.buf.split_to(ready).freeze()));
            }

            if !self.fill().await? {
                return Err(unexpected_eof());
            }
        }
    }

    /// The current part's body as a stream.
    pub fn part_body(&mut self) -> impl Stream<Item = io::Result<Bytes>> + Send + '_ {
        stream::unfold(Some(self), |reader| async move {
            let reader = reader?;
            match reader.next_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(reader))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    async fn skip_preamble(&mut self) -> io::Result<()> {
        loop {
            if let Some(pos) = find(&self.buf, &self.dash_boundary) {
                self.buf.advance(pos + self.dash_boundary.len());
                self.state = State::Boundary;
                return Ok(());
            }

            let keep = self.dash_boundary.len() - 1;
            if self.buf.len() > keep {
                let skip = self.buf.len() - keep;
                self.buf.advance(skip);
            }

            if !self.fill().await? {
                return Err(unexpected_eof());
            }
        }
    }

    async fn read_part_head(&mut self) -> io::Result<Part> {
        loop {
            if self.buf.starts_with(b"\r\n") {
                self.buf.advance(2);
                return Ok(Part::default());
            }
            if let Some(end) = find(&self.buf, b"\r\n\r\n") {
                let head = self.buf.split_to(end + 4);
                return parse_part_head(&head[..end]);
            }
            if self.buf.len() > MAX_PART_HEAD {
                return Err(invalid("multipart part headers too large"));
            }
            if !self.fill().await? {
                return Err(unexpected_eof());
            }
        }
    }

    async fn fill_to(&mut self, len: usize) -> io::Result<()> {
        while self.buf.len() < len {
            if !self.fill().await? {
                return Err(unexpected_eof());
            }
        }
        Ok(())
    }

    async fn fill(&mut self) -> io::Result<bool> {
        if self.eof {
            return Ok(false);
        }
        match self.source.next().await {
            Some(chunk) => {
                self.buf.extend_from_slice(&chunk?);
                Ok(true)
            }
            None => {
                self.eof = true;
                Ok(false)
            }
        }
    }
}

fn parse_part_head(head: &[u8]) -> io::Result<Part> {
    let head = std::str::from_utf8(head).map_err(|_| invalid("multipart headers are not UTF-8"))?;
    let mut part = Part::default();

    for line in head.split("\r\n") {
        let Some((key, value)) = line.split_once(':') else {
            return Err(invalid("malformed multipart header"));
        };

        if key.trim().eq_ignore_ascii_case("Content-Disposition") {
            let (_, params) = value.split_once(';').unwrap_or((value, ""));
            for (name, value) in parse_params(params) {
                match name.to_ascii_lowercase().as_str() {
                    "name" => part.name = Some(value),
                    "filename" => part.filename = Some(value),
                    _ => {}
                }
            }
        } else if key.trim().eq_ignore_ascii_case("Content-Type") {
            part.content_type = Some(value.trim().to_string());
        }
    }

    Ok(part)
}

/// Splits `a=1; b="x;y"` into key/value pairs, honouring quotes.
fn parse_params(params: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut chars = params.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if *c == ';' || c.is_whitespace()) {
            chars.next();
        }

        let key: String = chars.by_ref().take_while(|c| *c != '=').collect();
        if key.trim().is_empty() {
            break;
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => value.extend(chars.next()),
                    '"' => break,
                    c => value.push(c),
                }
            }
            // drop anything between the closing quote and the separator
            for c in chars.by_ref() {
                if c == ';' {
                    break;
                }
            }
        } else {
            value = chars.by_ref().take_while(|c| *c != ';').collect();
        }

        out.push((key.trim().to_string(), value.trim().to_string()));
    }

    out
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

fn unexpected_eof() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "multipart body ended early")
}
