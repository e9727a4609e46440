//! Reading cursor over a document's flat text.
//!
//! Position is an absolute byte offset (always on a character boundary).
//! Movement operations return the text of the granule the cursor landed on,
//! or `None` at a document boundary. Hitting a boundary plays the boundary
//! cue; with wrap enabled the cursor wraps instead and plays the wrap cue.

use std::sync::Arc;

use super::{VBufferDocument, VBufferNode};
use crate::audio::{Cue, CueSink};

pub struct Cursor {
    doc: Arc<VBufferDocument>,
    offset: usize,
    /// A fresh cursor sits logically before the document: reads behave as
    /// if at offset 0, but there is no current node until it moves, so the
    /// first quick-nav jump lands on the first matching element instead of
    /// skipping past it.
    placed: bool,
    wrap: bool,
    cues: Arc<dyn CueSink>,
}

impl Cursor {
    pub fn new(doc: Arc<VBufferDocument>, cues: Arc<dyn CueSink>) -> Self {
        Self {
            doc,
            offset: 0,
            placed: false,
            wrap: false,
            cues,
        }
    }

    pub fn set_wrap(&mut self, wrap: bool) {
        self.wrap = wrap;
    }

    pub fn wrap(&self) -> bool {
        self.wrap
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn document(&self) -> &Arc<VBufferDocument> {
        &self.doc
    }

    /// Swaps in a new snapshot, clamping the position into range.
    pub fn set_document(&mut self, doc: Arc<VBufferDocument>) {
        self.offset = clamp_to_char_boundary(&doc.flat_text, self.offset);
        self.doc = doc;
    }

    /// Moves to an absolute offset, clamped to the text.
    pub fn move_to(&mut self, offset: usize) {
        self.offset = clamp_to_char_boundary(&self.doc.flat_text, offset);
        self.placed = true;
    }

    /// True once the cursor has taken a position in the document.
    pub fn is_placed(&self) -> bool {
        self.placed
    }

    /// Node bracketing the current position, once the cursor has one.
    pub fn current_node(&self) -> Option<&VBufferNode> {
        if !self.placed {
            return None;
        }
        self.doc.find_node_at_offset(self.offset)
    }

    /// Character at the current position.
    pub fn current_char(&self) -> Option<String> {
        self.doc.flat_text[self.offset..]
            .chars()
            .next()
            .map(|c| c.to_string())
    }

    /// Line containing the current position, separator excluded.
    pub fn current_line(&self) -> Option<String> {
        let text = &self.doc.flat_text;
        if text.is_empty() {
            return None;
        }
        let (start, end) = line_bounds(text, self.offset);
        Some(text[start..end].to_string())
    }

    /// Word containing (or starting at) the current position.
    pub fn current_word(&self) -> Option<String> {
        let text = &self.doc.flat_text;
        if text.is_empty() {
            return None;
        }
        let start = word_start(text, self.offset);
        let end = word_end(text, start);
        (start < end).then(|| text[start..end].to_string())
    }

    pub fn next_char(&mut self) -> Option<String> {
        self.placed = true;
        let text = &self.doc.flat_text;
        let current = text[self.offset..].chars().next();
        let target = current.map(|c| self.offset + c.len_utf8());
        match target {
            Some(next) if next < text.len() => {
                self.offset = next;
                self.current_char()
            }
            _ => self.hit_boundary(0, Self::current_char),
        }
    }

    pub fn prev_char(&mut self) -> Option<String> {
        self.placed = true;
        let text = &self.doc.flat_text;
        match text[..self.offset].chars().next_back() {
            Some(c) => {
                self.offset -= c.len_utf8();
                self.current_char()
            }
            None => {
                let last = last_char_offset(text);
                self.hit_boundary(last, Self::current_char)
            }
        }
    }

    /// Skips the rest of the current word and the following whitespace,
    /// landing on the next word's first character.
    pub fn next_word(&mut self) -> Option<String> {
        self.placed = true;
        let text = &self.doc.flat_text;
        let mut pos = self.offset;
        while let Some(c) = text[pos..].chars().next() {
            if c.is_whitespace() {
                break;
            }
            pos += c.len_utf8();
        }
        while let Some(c) = text[pos..].chars().next() {
            if !c.is_whitespace() {
                break;
            }
            pos += c.len_utf8();
        }
        if pos < text.len() {
            self.offset = pos;
            self.current_word()
        } else {
            let start = first_word_offset(text);
            self.hit_boundary(start, Self::current_word)
        }
    }

    /// Steps back over whitespace, then over the preceding word, landing on
    /// that word's first character.
    pub fn prev_word(&mut self) -> Option<String> {
        self.placed = true;
        let text = &self.doc.flat_text;
        let mut pos = self.offset;
        while let Some(c) = text[..pos].chars().next_back() {
            if !c.is_whitespace() {
                break;
            }
            pos -= c.len_utf8();
        }
        if pos == 0 {
            let start = last_word_offset(text);
            return self.hit_boundary(start, Self::current_word);
        }
        while let Some(c) = text[..pos].chars().next_back() {
            if c.is_whitespace() {
                break;
            }
            pos -= c.len_utf8();
        }
        self.offset = pos;
        self.current_word()
    }

    pub fn next_line(&mut self) -> Option<String> {
        self.placed = true;
        let text = &self.doc.flat_text;
        let (_, end) = line_bounds(text, self.offset);
        let next_start = end + 1; // past the separator
        if end < text.len() && next_start < text.len() {
            self.offset = next_start;
            self.current_line()
        } else {
            self.hit_boundary(0, Self::current_line)
        }
    }

    pub fn prev_line(&mut self) -> Option<String> {
        self.placed = true;
        let text = &self.doc.flat_text;
        let (start, _) = line_bounds(text, self.offset);
        if start == 0 {
            let last = line_bounds(text, last_char_offset(text)).0;
            return self.hit_boundary(last, Self::current_line);
        }
        let (prev_start, _) = line_bounds(text, start - 1);
        self.offset = prev_start;
        self.current_line()
    }

    /// Boundary policy: wrap to `wrap_target` with the wrap cue, or stay put
    /// with the boundary cue and report nothing.
    fn hit_boundary(
        &mut self,
        wrap_target: usize,
        read: impl Fn(&Self) -> Option<String>,
    ) -> Option<String> {
        if self.wrap && !self.doc.flat_text.is_empty() {
            self.cues.play(Cue::Wrap);
            self.offset = wrap_target;
            read(self)
        } else {
            self.cues.play(Cue::Boundary);
            None
        }
    }
}

fn clamp_to_char_boundary(text: &str, offset: usize) -> usize {
    if text.is_empty() {
        return 0;
    }
    let mut clamped = offset.min(text.len() - 1);
    while clamped > 0 && !text.is_char_boundary(clamped) {
        clamped -= 1;
    }
    clamped
}

/// Line bracketing `offset`: `(start, end)` with `end` at the separator or
/// text end.
fn line_bounds(text: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(text.len());
    let start = text[..offset].rfind('\n').map_or(0, |i| i + 1);
    let end = text[offset..]
        .find('\n')
        .map_or(text.len(), |i| offset + i);
    (start, end)
}

/// Start of the word bracketing `offset` (or `offset` itself in whitespace).
fn word_start(text: &str, offset: usize) -> usize {
    let mut start = offset.min(text.len());
    while let Some(c) = text[..start].chars().next_back() {
        if c.is_whitespace() {
            break;
        }
        start -= c.len_utf8();
    }
    start
}

/// End of the word starting at `start`.
fn word_end(text: &str, start: usize) -> usize {
    let mut end = start;
    while let Some(c) = text[end..].chars().next() {
        if c.is_whitespace() {
            break;
        }
        end += c.len_utf8();
    }
    end
}

/// Offset of the first non-whitespace character.
fn first_word_offset(text: &str) -> usize {
    text.char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map_or(0, |(i, _)| i)
}

/// Offset of the last word's first character.
fn last_word_offset(text: &str) -> usize {
    let mut end = text.len();
    while let Some(c) = text[..end].chars().next_back() {
        if !c.is_whitespace() {
            break;
        }
        end -= c.len_utf8();
    }
    word_start(text, end.saturating_sub(1))
}

/// Offset of the final character, or 0 for empty text.
fn last_char_offset(text: &str) -> usize {
    text.char_indices().next_back().map_or(0, |(i, _)| i)
}
