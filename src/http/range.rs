//! `Range` request header parsing.
//!
//! ```text
//! Range: bytes=<start>-<end>
//! Range: bytes=<start>-
//! Range: bytes=-<suffix-length>
//! Range: bytes=0-99, 200-299
//! ```
//!
//! Ranges are resolved against the size of the resource: open ends are
//! filled in, ends past the last byte are clamped, and specs that cannot be
//! satisfied are dropped.

use std::fmt;

/// An inclusive byte range `[start, end]` within a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// The `Content-Range` header value for a resource of `size` bytes.
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// The satisfiable ranges of a `Range` header, in request order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ranges {
    /// Range unit, `bytes` for every range this adapter can serve
    pub unit: String,
    pub ranges: Vec<ByteRange>,
}

impl Ranges {
    /// The range to serve, if the header asked for exactly one byte range.
    pub fn single_bytes(&self) -> Option<ByteRange> {
        match self.ranges.as_slice() {
            [range] if self.unit == "bytes" => Some(*range),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeError {
    /// The header does not follow `unit=spec[,spec]` syntax
    Malformed,
    /// No spec overlaps the resource
    Unsatisfiable,
}

/// Parses `header` against a resource of `size` bytes.
pub fn parse_range(size: u64, header: &str) -> Result<Ranges, RangeError> {
    let (unit, specs) = header.split_once('=').ok_or(RangeError::Malformed)?;

    let mut ranges = Vec::new();
    for spec in specs.split(',') {
        let spec = spec.trim();
        let (start, end) = spec.split_once('-').ok_or(RangeError::Malformed)?;
        let start = parse_bound(start)?;
        let end = parse_bound(end)?;

        let (start, end) = match (start, end) {
            // bytes=-N: the last N bytes
            (None, Some(suffix)) => (size.saturating_sub(suffix), size.checked_sub(1)),
            (Some(start), None) => (start, size.checked_sub(1)),
            (Some(start), Some(end)) => (start, Some(end.min(size.saturating_sub(1)))),
            (None, None) => return Err(RangeError::Malformed),
        };

        match end {
            Some(end) if start <= end && start < size => ranges.push(ByteRange { start, end }),
            _ => {}
        }
    }

    if ranges.is_empty() {
        return Err(RangeError::Unsatisfiable);
    }

    Ok(Ranges {
        unit: unit.trim().to_string(),
        ranges,
    })
}

fn parse_bound(s: &str) -> Result<Option<u64>, RangeError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }
    s.parse::<u64>().map(Some).map_err(|_| RangeError::Malformed)
}
