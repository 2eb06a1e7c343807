//! The live query string and the caret inside it.

use std::sync::{Mutex, RwLock};

#[derive(Debug, Default)]
struct QueryInner {
    runes: Vec<char>,
    saved: Vec<char>,
}

/// Mutable rune sequence with a saved copy for restore-after-cancel.
#[derive(Debug, Default)]
pub struct QueryText {
    inner: RwLock<QueryInner>,
}

impl QueryText {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, s: &str) {
        if let Ok(mut inner) = self.inner.write() {
            inner.runes = s.chars().collect();
        }
    }

    pub fn reset(&self) {
        if let Ok(mut inner) = self.inner.write() {
            inner.runes.clear();
        }
    }

    /// Snapshot the current runes for a later [`QueryText::restore`].
    pub fn save(&self) {
        if let Ok(mut inner) = self.inner.write() {
            inner.saved = inner.runes.clone();
        }
    }

    pub fn restore(&self) {
        if let Ok(mut inner) = self.inner.write() {
            inner.runes = inner.saved.clone();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.runes.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rune at `pos`, or the zero rune when out of range.
    pub fn rune_at(&self, pos: usize) -> char {
        self.inner
            .read()
            .ok()
            .and_then(|i| i.runes.get(pos).copied())
            .unwrap_or('\0')
    }

    pub fn as_string(&self) -> String {
        self.inner
            .read()
            .map(|i| i.runes.iter().collect())
            .unwrap_or_default()
    }

    pub fn runes(&self) -> Vec<char> {
        self.inner.read().map(|i| i.runes.clone()).unwrap_or_default()
    }

    /// Insert `ch` before `pos`; appending when `pos` is at or past the end.
    pub fn insert_at(&self, ch: char, pos: usize) {
        if let Ok(mut inner) = self.inner.write() {
            let pos = pos.min(inner.runes.len());
            inner.runes.insert(pos, ch);
        }
    }

    /// Delete runes in `[start, end)`; out-of-range portions are clamped
    /// away and an inverted range is a no-op.
    pub fn delete_range(&self, start: usize, end: usize) {
        if let Ok(mut inner) = self.inner.write() {
            let len = inner.runes.len();
            let start = start.min(len);
            let end = end.min(len);
            if start < end {
                inner.runes.drain(start..end);
            }
        }
    }
}

/// Caret position inside the query, clamped to `[0, len]` by callers via
/// [`Caret::set`] / [`Caret::move_by`].
#[derive(Debug, Default)]
pub struct Caret {
    pos: Mutex<usize>,
}

impl Caret {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pos(&self) -> usize {
        self.pos.lock().map(|p| *p).unwrap_or(0)
    }

    pub fn set(&self, pos: usize) {
        if let Ok(mut p) = self.pos.lock() {
            *p = pos;
        }
    }

    /// Move by `delta`, saturating at zero and clamping to `max`.
    pub fn move_by(&self, delta: isize, max: usize) {
        if let Ok(mut p) = self.pos.lock() {
            let next = if delta < 0 {
                p.saturating_sub(delta.unsigned_abs())
            } else {
                p.saturating_add(delta as usize)
            };
            *p = next.min(max);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn insert_at_end_appends() {
        let q = QueryText::new();
        q.set("ab");
        q.insert_at('c', q.len());
        assert_eq!(q.as_string(), "abc");
    }

    #[test]
    fn insert_past_end_is_clamped() {
        let q = QueryText::new();
        q.set("ab");
        q.insert_at('z', 99);
        assert_eq!(q.as_string(), "abz");
    }

    #[test]
    fn delete_full_range_empties() {
        let q = QueryText::new();
        q.set("hello");
        q.delete_range(0, q.len());
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn delete_inverted_or_out_of_range_is_noop() {
        let q = QueryText::new();
        q.set("abc");
        q.delete_range(2, 1);
        q.delete_range(10, 20);
        assert_eq!(q.as_string(), "abc");
    }

    #[test]
    fn rune_at_out_of_range_returns_zero_rune() {
        let q = QueryText::new();
        q.set("xy");
        assert_eq!(q.rune_at(0), 'x');
        assert_eq!(q.rune_at(5), '\0');
    }

    #[test]
    fn save_restore_round_trips() {
        let q = QueryText::new();
        q.set("keep me");
        q.save();
        q.set("scratch");
        q.restore();
        assert_eq!(q.as_string(), "keep me");
    }

    #[test]
    fn multibyte_runes_count_as_one() {
        let q = QueryText::new();
        q.set("日本語");
        assert_eq!(q.len(), 3);
        q.delete_range(1, 2);
        assert_eq!(q.as_string(), "日語");
    }

    #[test]
    fn caret_moves_clamp_to_bounds() {
        let c = Caret::new();
        c.move_by(-5, 10);
        assert_eq!(c.pos(), 0);
        c.move_by(3, 10);
        assert_eq!(c.pos(), 3);
        c.move_by(100, 10);
        assert_eq!(c.pos(), 10);
        c.set(4);
        assert_eq!(c.pos(), 4);
    }
}
