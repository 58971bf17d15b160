//! Frame extraction.
//!
//! A frame body runs from the end of its tag to the next tag occurrence.
//! Tag literals are plain text, so one can also appear inside a JSON
//! string of the payload; a candidate boundary where the body so far is
//! only a JSON prefix is passed over, as long as including it does not
//! turn the body into something that can never parse.

use std::ops::Range;

use super::decode::{probe, Probe};
use super::tags::{TagHit, TagKind, TagScanner};

/// One logical message located in the session buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Kind of the introducing tag.
    pub kind: TagKind,
    /// Offset of the introducing tag.
    pub tag_offset: usize,
    /// Body bytes, excluding the tag.
    pub body: Range<usize>,
    /// `true` when a following tag closes the body; an open frame ends at
    /// the buffer end and may still grow.
    pub complete: bool,
}

impl Frame {
    /// Body bytes within `buf`.
    #[must_use]
    pub fn body<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        &buf[self.body.clone()]
    }

    /// Offset one past the last body byte.
    #[must_use]
    pub fn end(&self) -> usize {
        self.body.end
    }
}

/// Extract the frame introduced by the tag occurrence `hit`.
#[must_use]
pub fn extract(buf: &[u8], scanner: &TagScanner, hit: TagHit) -> Frame {
    let start = hit.offset + scanner.tags().tag_len();
    let frame = |end: usize, complete: bool| Frame {
        kind: hit.kind,
        tag_offset: hit.offset,
        body: start..end,
        complete,
    };

    // First boundary at which the body was still an unfinished value.
    let mut first_open: Option<usize> = None;

    for next in scanner.hits_after(hit.offset) {
        match probe(&buf[start..next.offset]) {
            Probe::Incomplete => {
                first_open.get_or_insert(next.offset);
            }
            Probe::Complete => return frame(next.offset, true),
            Probe::Malformed => return frame(first_open.unwrap_or(next.offset), true),
        }
    }

    // Bytes past the lexed prefix may still turn out to be a tag.
    let lexed = scanner.scanned().clamp(start, buf.len());
    match first_open {
        Some(open) if probe(&buf[start..lexed]) == Probe::Malformed => frame(open, true),
        _ => frame(buf.len(), false),
    }
}
