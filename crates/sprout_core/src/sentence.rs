//! Cursor-based symbol sequence consumed by the dispatch algorithm.
//!
//! A [`Sentence`] owns its symbols, a read cursor that starts *before* the
//! first symbol, and a stack of saved cursor positions used to carve
//! bracketed sub-sequences out of their parent.

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

/// Returned by cursor reads that have nothing to return.
pub const SENTINEL: char = '\0';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SentenceError {
    #[error("pop_and_cut called without a saved position")]
    EmptyPositionStack,
    #[error("invalid cut span: saved position {start}, current position {end}")]
    InvalidSpan { start: isize, end: isize },
    #[error("remove range {start}..{end} out of bounds for length {len}")]
    OutOfBounds { start: usize, end: usize, len: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sentence {
    symbols: Vec<char>,
    position: isize,
    position_stack: Vec<isize>,
    unique_symbols: usize,
}

impl Sentence {
    pub fn new(axiom: &str) -> Self {
        let mut sentence = Self {
            symbols: axiom.chars().collect(),
            position: -1,
            position_stack: Vec::new(),
            unique_symbols: 0,
        };
        sentence.update_unique_symbols();
        sentence
    }

    pub fn empty() -> Self {
        Self::new("")
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Cursor position; `-1` while before the first symbol.
    pub fn position(&self) -> isize {
        self.position
    }

    pub fn unique_symbols(&self) -> usize {
        self.unique_symbols
    }

    pub fn chars(&self) -> impl Iterator<Item = char> + '_ {
        self.symbols.iter().copied()
    }

    pub fn has_next(&self) -> bool {
        self.position + 1 < self.symbols.len() as isize
    }

    /// Advances the cursor and returns the symbol under it.
    ///
    /// At the end of the buffer the cursor stays put and the last symbol is
    /// returned again; callers check [`Sentence::has_next`] first.
    pub fn next(&mut self) -> char {
        if self.has_next() {
            self.position += 1;
        }
        self.current()
    }

    pub fn peek_next(&self) -> char {
        if self.has_next() {
            self.symbols[(self.position + 1) as usize]
        } else {
            SENTINEL
        }
    }

    pub fn current(&self) -> char {
        if self.position < 0 {
            return SENTINEL;
        }
        self.symbols
            .get(self.position as usize)
            .copied()
            .unwrap_or(SENTINEL)
    }

    pub fn push_position(&mut self) {
        self.position_stack.push(self.position);
    }

    pub fn pop_position(&mut self) -> Result<(), SentenceError> {
        self.position = self
            .position_stack
            .pop()
            .ok_or(SentenceError::EmptyPositionStack)?;
        self.clamp_position();
        Ok(())
    }

    /// Pops a saved position `p` and, with `q` the current cursor, removes the
    /// inclusive span `[p, q]`. Returns the interior `(p, q)` as a new sentence
    /// and leaves the cursor on `p - 1`, just before the closed gap.
    pub fn pop_and_cut(&mut self) -> Result<Sentence, SentenceError> {
        let end = self.position;
        let start = self
            .position_stack
            .pop()
            .ok_or(SentenceError::EmptyPositionStack)?;
        if start < 0 || end <= start || end as usize >= self.symbols.len() {
            // Restore so the caller can still inspect the sentence.
            self.position_stack.push(start);
            return Err(SentenceError::InvalidSpan { start, end });
        }

        let (start, end) = (start as usize, end as usize);
        let interior: String = self.symbols[start + 1..end].iter().collect();
        self.symbols.drain(start..=end);
        self.position = start as isize - 1;
        self.update_unique_symbols();

        Ok(Sentence::new(&interior))
    }

    pub fn set(&mut self, text: &str) -> &mut Self {
        self.symbols = text.chars().collect();
        self.clamp_position();
        self.update_unique_symbols();
        self
    }

    pub fn append(&mut self, text: &str) -> &mut Self {
        self.symbols.extend(text.chars());
        self.update_unique_symbols();
        self
    }

    pub fn prepend(&mut self, text: &str) -> &mut Self {
        let mut symbols: Vec<char> = text.chars().collect();
        symbols.append(&mut self.symbols);
        self.symbols = symbols;
        self.update_unique_symbols();
        self
    }

    pub fn remove(&mut self, start: usize, count: usize) -> Result<&mut Self, SentenceError> {
        let end = start + count;
        if end > self.symbols.len() {
            return Err(SentenceError::OutOfBounds {
                start,
                end,
                len: self.symbols.len(),
            });
        }
        self.symbols.drain(start..end);
        self.clamp_position();
        self.update_unique_symbols();
        Ok(self)
    }

    /// Inserts `other` so that its first symbol lands at `index`.
    pub fn insert_sentence(&mut self, index: usize, other: &Sentence) -> &mut Self {
        let index = index.min(self.symbols.len());
        self.symbols
            .splice(index..index, other.symbols.iter().copied());
        self.update_unique_symbols();
        self
    }

    fn clamp_position(&mut self) {
        let last = self.symbols.len() as isize - 1;
        if self.position > last {
            self.position = last;
        }
    }

    fn update_unique_symbols(&mut self) {
        self.unique_symbols = self.symbols.iter().collect::<BTreeSet<_>>().len();
    }
}

impl fmt::Display for Sentence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in &self.symbols {
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl From<&str> for Sentence {
    fn from(value: &str) -> Self {
        Sentence::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_walks_buffer_and_sticks_at_end() {
        let mut sentence = Sentence::new("AB");
        assert_eq!(sentence.position(), -1);
        assert!(sentence.has_next());
        assert_eq!(sentence.next(), 'A');
        assert_eq!(sentence.peek_next(), 'B');
        assert_eq!(sentence.next(), 'B');
        assert!(!sentence.has_next());
        assert_eq!(sentence.peek_next(), SENTINEL);
        assert_eq!(sentence.next(), 'B');
        assert_eq!(sentence.position(), 1);
    }

    #[test]
    fn empty_sentence_yields_sentinel() {
        let mut sentence = Sentence::empty();
        assert!(!sentence.has_next());
        assert_eq!(sentence.next(), SENTINEL);
        assert_eq!(sentence.current(), SENTINEL);
    }

    #[test]
    fn pop_and_cut_extracts_interior_and_closes_gap() {
        let mut sentence = Sentence::new("X[YW]Z");
        sentence.next();
        sentence.next();
        sentence.push_position();
        let p = sentence.position();
        sentence.next();
        sentence.next();
        sentence.next();
        let q = sentence.position();
        let before = sentence.len() as isize;

        let cut = sentence.pop_and_cut().expect("balanced cut");

        assert_eq!(cut.to_string(), "YW");
        assert_eq!(cut.len() as isize, q - p - 1);
        assert_eq!(sentence.len() as isize, before - (q - p + 1));
        assert_eq!(sentence.to_string(), "XZ");
        assert_eq!(sentence.position(), 0);
        assert_eq!(sentence.next(), 'Z');
    }

    #[test]
    fn pop_and_cut_without_saved_position_fails() {
        let mut sentence = Sentence::new("AB");
        sentence.next();
        assert_eq!(
            sentence.pop_and_cut(),
            Err(SentenceError::EmptyPositionStack)
        );
    }

    #[test]
    fn pop_and_cut_rejects_degenerate_span() {
        let mut sentence = Sentence::new("[");
        sentence.next();
        sentence.push_position();
        let err = sentence.pop_and_cut().expect_err("span must be rejected");
        assert_eq!(err, SentenceError::InvalidSpan { start: 0, end: 0 });
        assert_eq!(sentence.to_string(), "[");
    }

    #[test]
    fn push_and_pop_position_restore_cursor() {
        let mut sentence = Sentence::new("ABC");
        sentence.next();
        sentence.push_position();
        sentence.next();
        sentence.next();
        sentence.pop_position().expect("saved position");
        assert_eq!(sentence.current(), 'A');
    }

    #[test]
    fn unique_symbols_tracks_edits() {
        let mut sentence = Sentence::new("AAB");
        assert_eq!(sentence.unique_symbols(), 2);
        sentence.append("C");
        assert_eq!(sentence.unique_symbols(), 3);
        sentence.remove(0, 3).expect("in range");
        assert_eq!(sentence.to_string(), "C");
        assert_eq!(sentence.unique_symbols(), 1);
        assert!(sentence.remove(0, 2).is_err());
    }

    #[test]
    fn restored_cursor_never_points_past_the_end() {
        let mut sentence = Sentence::new("ABC");
        sentence.next();
        sentence.next();
        sentence.next();
        sentence.push_position();
        sentence.remove(1, 2).expect("in range");
        sentence.pop_position().expect("saved position");

        assert_eq!(sentence.position(), 0);
        assert_eq!(sentence.next(), 'A');

        sentence.push_position();
        sentence.set("");
        sentence.pop_position().expect("saved position");
        assert_eq!(sentence.position(), -1);
        assert_eq!(sentence.next(), SENTINEL);
    }

    #[test]
    fn prepend_and_insert_compose() {
        let mut sentence = Sentence::new("XZ");
        sentence.insert_sentence(1, &Sentence::new("[Y]"));
        assert_eq!(sentence.to_string(), "X[Y]Z");
        sentence.prepend("A");
        assert_eq!(sentence.to_string(), "AX[Y]Z");
    }
}
