//! The ordered set of user-marked lines.

use std::collections::BTreeMap;
use std::sync::{Mutex, RwLock};

use core_model::Matched;

/// Lines keyed by their stable ID; iteration ascends strictly by ID.
/// `add` is idempotent, so marking an already-marked line is harmless.
#[derive(Debug, Default)]
pub struct SelectionSet {
    entries: RwLock<BTreeMap<u64, Matched>>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, item: Matched) {
        if let Ok(mut entries) = self.entries.write() {
            entries.entry(item.id()).or_insert(item);
        }
    }

    pub fn remove(&self, id: u64) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(&id);
        }
    }

    pub fn has(&self, id: u64) -> bool {
        self.entries
            .read()
            .map(|e| e.contains_key(&id))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    /// Visit entries in ascending ID order until `visit` returns `false`.
    pub fn ascend<F>(&self, mut visit: F)
    where
        F: FnMut(&Matched) -> bool,
    {
        if let Ok(entries) = self.entries.read() {
            for item in entries.values() {
                if !visit(item) {
                    break;
                }
            }
        }
    }

    /// Copy every entry into `dst` (IDs already present are kept as-is).
    pub fn copy_into(&self, dst: &SelectionSet) {
        self.ascend(|item| {
            dst.add(item.clone());
            true
        });
    }

    /// Snapshot in ascending ID order.
    pub fn to_vec(&self) -> Vec<Matched> {
        self.entries
            .read()
            .map(|e| e.values().cloned().collect())
            .unwrap_or_default()
    }
}

/// Where the user began range-selection, when a range is active.
#[derive(Debug, Default)]
pub struct RangeStart {
    line: Mutex<Option<usize>>,
}

impl RangeStart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, line: usize) {
        if let Ok(mut l) = self.line.lock() {
            *l = Some(line);
        }
    }

    pub fn get(&self) -> Option<usize> {
        self.line.lock().map(|l| *l).unwrap_or(None)
    }

    pub fn is_valid(&self) -> bool {
        self.get().is_some()
    }

    pub fn reset(&self) {
        if let Ok(mut l) = self.line.lock() {
            *l = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_model::{IdGen, Line};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn item(id: u64, text: &str) -> Matched {
        Matched::passthrough(Arc::new(Line::new(id, text, false, false)))
    }

    fn ids(set: &SelectionSet) -> Vec<u64> {
        let mut out = Vec::new();
        set.ascend(|m| {
            out.push(m.id());
            true
        });
        out
    }

    #[test]
    fn ascend_yields_strictly_ascending_ids() {
        let set = SelectionSet::new();
        for id in [42, 7, 99, 3, 15] {
            set.add(item(id, "x"));
        }
        assert_eq!(ids(&set), vec![3, 7, 15, 42, 99]);
    }

    #[test]
    fn add_is_idempotent() {
        let set = SelectionSet::new();
        let gen = IdGen::fixed(0);
        let id = gen.next();
        set.add(item(id, "once"));
        set.add(item(id, "twice"));
        assert_eq!(set.len(), 1);
        assert!(set.has(id));
    }

    #[test]
    fn len_tracks_adds_minus_removes() {
        let set = SelectionSet::new();
        for id in 1..=5 {
            set.add(item(id, "x"));
        }
        set.remove(3);
        set.remove(3);
        set.remove(99);
        assert_eq!(set.len(), 4);
        assert!(!set.has(3));
    }

    #[test]
    fn ascend_early_exit_stops_iteration() {
        let set = SelectionSet::new();
        for id in 1..=10 {
            set.add(item(id, "x"));
        }
        let mut seen = 0;
        set.ascend(|_| {
            seen += 1;
            seen < 3
        });
        assert_eq!(seen, 3);
    }

    #[test]
    fn copy_into_preserves_order() {
        let src = SelectionSet::new();
        for id in [9, 1, 5] {
            src.add(item(id, "x"));
        }
        let dst = SelectionSet::new();
        src.copy_into(&dst);
        assert_eq!(ids(&dst), ids(&src));
    }

    #[test]
    fn range_start_flag_round_trips() {
        let marker = RangeStart::new();
        assert!(!marker.is_valid());
        marker.set(12);
        assert_eq!(marker.get(), Some(12));
        marker.reset();
        assert!(!marker.is_valid());
    }
}
