//! Tag table and incremental two-symbol lexer.
//!
//! The upstream stream introduces every logical message with one of two
//! fixed-length ASCII literals. [`TagScanner`] records tag occurrences as
//! bytes arrive and remembers how far it has looked, so bytes already
//! lexed are never scanned again.

use std::collections::VecDeque;

use crate::{AppError, Result};

/// Kind of message introduced by a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    /// Tool-invocation notice.
    Tool,
    /// Model-stream event.
    Model,
}

impl TagKind {
    /// Short lowercase label used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Model => "model",
        }
    }
}

/// One tag occurrence inside the session buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagHit {
    /// Byte offset of the first tag byte.
    pub offset: usize,
    /// Which literal matched.
    pub kind: TagKind,
}

/// The pair of tag literals recognized by the demultiplexer.
///
/// Both literals are non-empty, distinct, and share one byte length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSet {
    tool: Box<[u8]>,
    model: Box<[u8]>,
}

impl TagSet {
    /// Build a tag table from the two literals.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if either literal is empty, the literals
    /// are identical, or their byte lengths differ.
    pub fn new(tool: &str, model: &str) -> Result<Self> {
        if tool.is_empty() || model.is_empty() {
            return Err(AppError::Config("tag literals must not be empty".into()));
        }
        if tool == model {
            return Err(AppError::Config(format!(
                "tool_tag and model_tag must differ, both are '{tool}'"
            )));
        }
        if tool.len() != model.len() {
            return Err(AppError::Config(format!(
                "tag literals must have the same byte length: '{tool}' is {}, '{model}' is {}",
                tool.len(),
                model.len()
            )));
        }

        Ok(Self {
            tool: tool.as_bytes().into(),
            model: model.as_bytes().into(),
        })
    }

    /// Byte length shared by both literals.
    #[must_use]
    pub fn tag_len(&self) -> usize {
        self.tool.len()
    }

    /// Which literal, if any, starts exactly at `pos`.
    #[must_use]
    pub fn match_at(&self, buf: &[u8], pos: usize) -> Option<TagKind> {
        let window = buf.get(pos..pos + self.tag_len())?;
        if window == &*self.tool {
            Some(TagKind::Tool)
        } else if window == &*self.model {
            Some(TagKind::Model)
        } else {
            None
        }
    }

    /// Earliest tag occurrence starting at or after `start`.
    #[must_use]
    pub fn find_from(&self, buf: &[u8], start: usize) -> Option<TagHit> {
        let len = self.tag_len();
        let mut pos = start;

        while pos + len <= buf.len() {
            // Only the first byte of either literal can begin a match.
            let rel = memchr::memchr2(self.tool[0], self.model[0], &buf[pos..=buf.len() - len])?;
            let at = pos + rel;
            if let Some(kind) = self.match_at(buf, at) {
                return Some(TagHit { offset: at, kind });
            }
            pos = at + 1;
        }

        None
    }

    /// Earliest tag occurrence after the tag starting at `from_offset`.
    ///
    /// The search begins at `from_offset + tag_len`, so a candidate can
    /// never overlap the tag it follows.
    #[must_use]
    pub fn find_next(&self, buf: &[u8], from_offset: usize) -> Option<TagHit> {
        self.find_from(buf, from_offset + self.tag_len())
    }
}

impl Default for TagSet {
    fn default() -> Self {
        Self {
            tool: b"Tool :"[..].into(),
            model: b"Toly :"[..].into(),
        }
    }
}

/// Incremental lexer over a growing, prefix-consumed buffer.
///
/// Offsets of recorded hits are relative to the current buffer start and
/// are shifted by [`TagScanner::consume`].
#[derive(Debug, Clone)]
pub struct TagScanner {
    tags: TagSet,
    hits: VecDeque<TagHit>,
    /// First buffer position not yet checked for a tag start.
    scan_pos: usize,
}

impl TagScanner {
    /// Create a lexer for the given tag table.
    #[must_use]
    pub fn new(tags: TagSet) -> Self {
        Self {
            tags,
            hits: VecDeque::new(),
            scan_pos: 0,
        }
    }

    /// Tag table in use.
    #[must_use]
    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Lex bytes appended to `buf` since the previous call.
    pub fn advance(&mut self, buf: &[u8]) {
        while let Some(hit) = self.tags.find_from(buf, self.scan_pos) {
            self.hits.push_back(hit);
            self.scan_pos = hit.offset + self.tags.tag_len();
        }
        // The last `tag_len - 1` bytes may still be the head of a tag.
        let settled = buf.len().saturating_sub(self.tags.tag_len() - 1);
        self.scan_pos = self.scan_pos.max(settled);
    }

    /// First recorded tag occurrence.
    #[must_use]
    pub fn first_hit(&self) -> Option<TagHit> {
        self.hits.front().copied()
    }

    /// First recorded occurrence starting at or after `offset`.
    #[must_use]
    pub fn hit_at_or_after(&self, offset: usize) -> Option<TagHit> {
        self.hits.iter().find(|hit| hit.offset >= offset).copied()
    }

    /// Recorded occurrences that follow the tag at `tag_offset`.
    #[must_use]
    pub fn hits_after(&self, tag_offset: usize) -> impl Iterator<Item = TagHit> + '_ {
        let body_start = tag_offset + self.tags.tag_len();
        self.hits
            .iter()
            .filter(move |hit| hit.offset >= body_start)
            .copied()
    }

    /// Length of the buffer prefix already lexed. Every tag starting
    /// before this offset has been recorded.
    #[must_use]
    pub fn scanned(&self) -> usize {
        self.scan_pos
    }

    /// Number of leading bytes known not to contain any part of a tag.
    ///
    /// Bytes before this offset that precede the first hit are preamble
    /// and may be discarded.
    #[must_use]
    pub fn settled_prefix(&self) -> usize {
        self.first_hit().map_or(self.scan_pos, |hit| hit.offset)
    }

    /// Forget the first `n` buffer bytes, shifting recorded offsets.
    pub fn consume(&mut self, n: usize) {
        while self.hits.front().is_some_and(|hit| hit.offset < n) {
            self.hits.pop_front();
        }
        for hit in &mut self.hits {
            hit.offset -= n;
        }
        self.scan_pos = self.scan_pos.saturating_sub(n);
    }

    /// Drop all lexer state.
    pub fn reset(&mut self) {
        self.hits.clear();
        self.scan_pos = 0;
    }
}
