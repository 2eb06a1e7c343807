//! Ternary search trie over key sequences.
//!
//! Nodes are labeled by key; siblings form a BST in key order with a
//! first-child pointer per node. After all bindings are added the sibling
//! BSTs are rebuilt balanced, and Aho–Corasick failure links are computed
//! for longest-match scanning. Action dispatch does not use the failure
//! machinery: it is a plain current-node walk (see [`SeqTrie::feed`]).

use std::cmp::Ordering;
use std::collections::VecDeque;

use tracing::trace;

use crate::key::{Key, KeySeq};

#[derive(Debug)]
struct Node<V> {
    key: Key,
    value: Option<V>,
    left: Option<usize>,
    right: Option<usize>,
    child: Option<usize>,
    /// Aho–Corasick failure state; `None` is the root.
    fail: Option<usize>,
    depth: usize,
}

#[derive(Debug)]
pub struct SeqTrie<V> {
    nodes: Vec<Node<V>>,
    root: Option<usize>,
}

/// Dispatch state: the current node of an in-flight key sequence.
#[derive(Debug, Default, Clone, Copy)]
pub struct SeqState {
    current: Option<usize>,
}

impl SeqState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_sequence(&self) -> bool {
        self.current.is_some()
    }

    /// Abort the in-flight sequence, resetting to the root.
    pub fn cancel_chain(&mut self) {
        self.current = None;
    }
}

/// Outcome of feeding one key to the dispatcher.
#[derive(Debug, PartialEq, Eq)]
pub enum Feed<'a, V> {
    /// No binding starts or continues with this key; state reset to root.
    NoMatch,
    /// The key extends a multi-key binding; more keys needed.
    Pending,
    /// A binding completed; state reset to root.
    Action(&'a V),
}

impl<V> SeqTrie<V> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Bind `seq` to `value`. A later binding for the same sequence
    /// overrides the earlier one.
    pub fn add(&mut self, seq: &KeySeq, value: V) {
        let mut parent: Option<usize> = None;
        let mut node: Option<usize> = None;
        for (d, &key) in seq.keys().iter().enumerate() {
            let head = match parent {
                None => self.root,
                Some(p) => self.nodes[p].child,
            };
            let (idx, head) = self.bst_insert(head, key, d + 1);
            match parent {
                None => self.root = Some(head),
                Some(p) => self.nodes[p].child = Some(head),
            }
            parent = Some(idx);
            node = Some(idx);
        }
        if let Some(idx) = node {
            if self.nodes[idx].value.is_some() {
                trace!(target: "keymap.trie", seq = %seq, "binding override");
            }
            self.nodes[idx].value = Some(value);
        }
    }

    /// Exact lookup of a full sequence.
    pub fn get(&self, seq: &KeySeq) -> Option<&V> {
        let mut level = self.root;
        let mut node = None;
        for &key in seq.keys() {
            let idx = self.bst_find(level, key)?;
            level = self.nodes[idx].child;
            node = Some(idx);
        }
        node.and_then(|idx| self.nodes[idx].value.as_ref())
    }

    /// Feed one key through the dispatch walk.
    pub fn feed<'a>(&'a self, state: &mut SeqState, key: Key) -> Feed<'a, V> {
        let head = match state.current {
            None => self.root,
            Some(s) => self.nodes[s].child,
        };
        match self.bst_find(head, key) {
            None => {
                state.cancel_chain();
                Feed::NoMatch
            }
            Some(idx) if self.nodes[idx].child.is_some() => {
                state.current = Some(idx);
                Feed::Pending
            }
            Some(idx) => {
                state.cancel_chain();
                match self.nodes[idx].value.as_ref() {
                    Some(value) => Feed::Action(value),
                    None => Feed::NoMatch,
                }
            }
        }
    }

    /// Rebuild every sibling BST from its sorted collection into a
    /// balanced tree. Call once after all bindings are added.
    pub fn balance(&mut self) {
        self.root = self.rebuild_level(self.root);
    }

    /// Compute Aho–Corasick failure links (breadth-first by depth).
    pub fn build_failure_links(&mut self) {
        let mut queue = VecDeque::new();
        for idx in self.level_nodes(self.root) {
            self.nodes[idx].fail = None;
            queue.push_back(idx);
        }
        while let Some(u) = queue.pop_front() {
            for c in self.level_nodes(self.nodes[u].child) {
                let key = self.nodes[c].key;
                let mut probe = self.nodes[u].fail;
                self.nodes[c].fail = loop {
                    let head = match probe {
                        None => self.root,
                        Some(p) => self.nodes[p].child,
                    };
                    match self.bst_find(head, key) {
                        Some(t) if t != c => break Some(t),
                        _ => match probe {
                            None => break None,
                            Some(p) => probe = self.nodes[p].fail,
                        },
                    }
                };
                queue.push_back(c);
            }
        }
    }

    /// Scan `keys`, reporting the longest binding ending at each position
    /// as `(start, end, value)` half-open index pairs. Informational; the
    /// runtime dispatch path is [`SeqTrie::feed`].
    pub fn scan<'a>(&'a self, keys: &[Key]) -> Vec<(usize, usize, &'a V)> {
        let mut out = Vec::new();
        let mut state: Option<usize> = None;
        for (i, &key) in keys.iter().enumerate() {
            loop {
                let head = match state {
                    None => self.root,
                    Some(s) => self.nodes[s].child,
                };
                if let Some(t) = self.bst_find(head, key) {
                    state = Some(t);
                    break;
                }
                match state {
                    None => break,
                    Some(s) => state = self.nodes[s].fail,
                }
            }
            let mut probe = state;
            while let Some(p) = probe {
                if let Some(value) = self.nodes[p].value.as_ref() {
                    out.push((i + 1 - self.nodes[p].depth, i + 1, value));
                    break;
                }
                probe = self.nodes[p].fail;
            }
        }
        out
    }

    fn push_node(&mut self, key: Key, depth: usize) -> usize {
        self.nodes.push(Node {
            key,
            value: None,
            left: None,
            right: None,
            child: None,
            fail: None,
            depth,
        });
        self.nodes.len() - 1
    }

    fn bst_insert(&mut self, head: Option<usize>, key: Key, depth: usize) -> (usize, usize) {
        let Some(head) = head else {
            let idx = self.push_node(key, depth);
            return (idx, idx);
        };
        let mut cur = head;
        loop {
            match key.cmp(&self.nodes[cur].key) {
                Ordering::Equal => return (cur, head),
                Ordering::Less => match self.nodes[cur].left {
                    Some(next) => cur = next,
                    None => {
                        let idx = self.push_node(key, depth);
                        self.nodes[cur].left = Some(idx);
                        return (idx, head);
                    }
                },
                Ordering::Greater => match self.nodes[cur].right {
                    Some(next) => cur = next,
                    None => {
                        let idx = self.push_node(key, depth);
                        self.nodes[cur].right = Some(idx);
                        return (idx, head);
                    }
                },
            }
        }
    }

    fn bst_find(&self, head: Option<usize>, key: Key) -> Option<usize> {
        let mut cur = head?;
        loop {
            match key.cmp(&self.nodes[cur].key) {
                Ordering::Equal => return Some(cur),
                Ordering::Less => cur = self.nodes[cur].left?,
                Ordering::Greater => cur = self.nodes[cur].right?,
            }
        }
    }

    fn level_nodes(&self, head: Option<usize>) -> Vec<usize> {
        let mut out = Vec::new();
        self.collect_inorder(head, &mut out);
        out
    }

    fn collect_inorder(&self, head: Option<usize>, out: &mut Vec<usize>) {
        if let Some(idx) = head {
            self.collect_inorder(self.nodes[idx].left, out);
            out.push(idx);
            self.collect_inorder(self.nodes[idx].right, out);
        }
    }

    fn rebuild_level(&mut self, head: Option<usize>) -> Option<usize> {
        let order = self.level_nodes(head);
        for &idx in &order {
            let rebuilt = self.rebuild_level(self.nodes[idx].child);
            self.nodes[idx].child = rebuilt;
        }
        self.build_balanced(&order)
    }

    fn build_balanced(&mut self, sorted: &[usize]) -> Option<usize> {
        if sorted.is_empty() {
            return None;
        }
        let mid = sorted.len() / 2;
        let idx = sorted[mid];
        let left = self.build_balanced(&sorted[..mid]);
        let right = self.build_balanced(&sorted[mid + 1..]);
        self.nodes[idx].left = left;
        self.nodes[idx].right = right;
        Some(idx)
    }

    #[cfg(test)]
    fn level_height(&self, head: Option<usize>) -> usize {
        match head {
            None => 0,
            Some(idx) => {
                1 + self
                    .level_height(self.nodes[idx].left)
                    .max(self.level_height(self.nodes[idx].right))
            }
        }
    }

    #[cfg(test)]
    fn root_height(&self) -> usize {
        self.level_height(self.root)
    }
}

impl<V> Default for SeqTrie<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::to_key_seq;
    use pretty_assertions::assert_eq;

    #[derive(Debug, PartialEq, Eq, Clone, Copy)]
    enum Cmd {
        Finish,
        Next,
        Delete,
    }

    fn trie(bindings: &[(&str, Cmd)]) -> SeqTrie<Cmd> {
        let mut t = SeqTrie::new();
        for (seq, cmd) in bindings {
            t.add(&to_key_seq(seq).unwrap(), *cmd);
        }
        t.balance();
        t.build_failure_links();
        t
    }

    #[test]
    fn multi_key_dispatch_walk() {
        let t = trie(&[("C-x,C-c", Cmd::Finish), ("C-x,C-n", Cmd::Next)]);
        let mut state = SeqState::new();

        assert_eq!(t.feed(&mut state, Key::ctrl('x')), Feed::Pending);
        assert!(state.in_sequence());
        assert_eq!(t.feed(&mut state, Key::ctrl('c')), Feed::Action(&Cmd::Finish));
        assert!(!state.in_sequence(), "dispatch must reset to root");

        assert_eq!(t.feed(&mut state, Key::ctrl('x')), Feed::Pending);
        assert_eq!(t.feed(&mut state, Key::ctrl('n')), Feed::Action(&Cmd::Next));
    }

    #[test]
    fn unknown_key_resets_to_root() {
        let t = trie(&[("C-x,C-c", Cmd::Finish)]);
        let mut state = SeqState::new();
        assert_eq!(t.feed(&mut state, Key::ctrl('x')), Feed::Pending);
        assert_eq!(t.feed(&mut state, Key::char('z')), Feed::NoMatch);
        assert!(!state.in_sequence());
        // The aborted prefix must not leak into the next sequence.
        assert_eq!(t.feed(&mut state, Key::ctrl('x')), Feed::Pending);
        assert_eq!(t.feed(&mut state, Key::ctrl('c')), Feed::Action(&Cmd::Finish));
    }

    #[test]
    fn cancel_chain_resets_current_node() {
        let t = trie(&[("C-x,C-c", Cmd::Finish)]);
        let mut state = SeqState::new();
        assert_eq!(t.feed(&mut state, Key::ctrl('x')), Feed::Pending);
        state.cancel_chain();
        assert_eq!(t.feed(&mut state, Key::ctrl('c')), Feed::NoMatch);
    }

    #[test]
    fn later_binding_overrides_earlier() {
        let mut t = SeqTrie::new();
        t.add(&to_key_seq("q").unwrap(), Cmd::Finish);
        t.add(&to_key_seq("q").unwrap(), Cmd::Next);
        assert_eq!(t.get(&to_key_seq("q").unwrap()), Some(&Cmd::Next));
    }

    #[test]
    fn balance_flattens_degenerate_sibling_chains() {
        let mut t = SeqTrie::new();
        // Ascending inserts degrade the sibling BST into a list.
        for c in 'a'..='z' {
            t.add(&to_key_seq(&c.to_string()).unwrap(), Cmd::Next);
        }
        assert_eq!(t.root_height(), 26);
        t.balance();
        assert!(t.root_height() <= 5, "26 siblings balance to height ≤ 5");
        // Resolution is unchanged.
        let mut state = SeqState::new();
        assert_eq!(t.feed(&mut state, Key::char('m')), Feed::Action(&Cmd::Next));
        assert_eq!(t.feed(&mut state, Key::char('a')), Feed::Action(&Cmd::Next));
    }

    #[test]
    fn failure_links_find_suffix_matches() {
        let t = trie(&[("a,b", Cmd::Finish), ("b,c", Cmd::Next), ("c", Cmd::Delete)]);
        let keys = [Key::char('a'), Key::char('b'), Key::char('c')];
        let matches = t.scan(&keys);
        assert_eq!(
            matches,
            vec![(0, 2, &Cmd::Finish), (1, 3, &Cmd::Next)],
            "scan must follow failure links across overlapping patterns"
        );
    }

    #[test]
    fn scan_reports_longest_match_per_position() {
        let t = trie(&[("b", Cmd::Delete), ("a,b", Cmd::Finish)]);
        let keys = [Key::char('a'), Key::char('b')];
        let matches = t.scan(&keys);
        assert_eq!(matches, vec![(0, 2, &Cmd::Finish)]);
    }

    #[test]
    fn empty_trie_never_matches() {
        let t: SeqTrie<Cmd> = SeqTrie::new();
        let mut state = SeqState::new();
        assert_eq!(t.feed(&mut state, Key::char('a')), Feed::NoMatch);
    }
}
