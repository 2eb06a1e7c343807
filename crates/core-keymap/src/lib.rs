//! core-keymap: multi-keystroke binding storage and dispatch.
//!
//! [`key`] models logical keys and the `C-x,C-c` binding lexicon;
//! [`trie`] stores sequences in a ternary search trie with balanced
//! sibling BSTs, Aho–Corasick failure links for informational scanning,
//! and the simple current-node dispatch walk the runtime uses.

pub mod key;
pub mod trie;

pub use key::{to_key_seq, Key, KeyCode, KeyParseError, KeySeq, ModMask};
pub use trie::{Feed, SeqState, SeqTrie};
