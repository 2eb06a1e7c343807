//! Named actions, the default keymap, and config keymap application.
//!
//! Config files reference actions by the `peco.`-prefixed names
//! (`"peco.Finish"`); the prefix is optional when resolving.

use anyhow::{anyhow, Result};
use core_config::Config;
use core_keymap::{to_key_seq, SeqTrie};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Finish,
    Cancel,
    SelectUp,
    SelectDown,
    ScrollPageUp,
    ScrollPageDown,
    ScrollLeft,
    ScrollRight,
    ScrollFirstItem,
    ScrollLastItem,
    ToggleSelection,
    ToggleSelectionAndSelectNext,
    ToggleRangeMode,
    CancelRangeMode,
    SelectAll,
    SelectNone,
    InvertSelection,
    RotateFilter,
    ToggleQuery,
    ToggleSingleKeyJump,
    BeginningOfLine,
    EndOfLine,
    ForwardChar,
    BackwardChar,
    DeleteForwardChar,
    DeleteBackwardChar,
    KillBeginningOfLine,
    KillEndOfLine,
    DeleteAll,
    RefreshScreen,
}

impl Action {
    /// Resolve a config action name, with or without the `peco.` prefix.
    pub fn from_name(name: &str) -> Option<Action> {
        let name = name.strip_prefix("peco.").unwrap_or(name);
        Some(match name {
            "Finish" => Action::Finish,
            "Cancel" => Action::Cancel,
            "SelectUp" | "SelectPrevious" => Action::SelectUp,
            "SelectDown" | "SelectNext" => Action::SelectDown,
            "ScrollPageUp" | "SelectPreviousPage" => Action::ScrollPageUp,
            "ScrollPageDown" | "SelectNextPage" => Action::ScrollPageDown,
            "ScrollLeft" => Action::ScrollLeft,
            "ScrollRight" => Action::ScrollRight,
            "ScrollFirstItem" => Action::ScrollFirstItem,
            "ScrollLastItem" => Action::ScrollLastItem,
            "ToggleSelection" => Action::ToggleSelection,
            "ToggleSelectionAndSelectNext" => Action::ToggleSelectionAndSelectNext,
            "ToggleRangeMode" => Action::ToggleRangeMode,
            "CancelRangeMode" => Action::CancelRangeMode,
            "SelectAll" => Action::SelectAll,
            "SelectNone" => Action::SelectNone,
            "InvertSelection" => Action::InvertSelection,
            "RotateFilter" => Action::RotateFilter,
            "ToggleQuery" => Action::ToggleQuery,
            "ToggleSingleKeyJump" => Action::ToggleSingleKeyJump,
            "BeginningOfLine" => Action::BeginningOfLine,
            "EndOfLine" => Action::EndOfLine,
            "ForwardChar" => Action::ForwardChar,
            "BackwardChar" => Action::BackwardChar,
            "DeleteForwardChar" => Action::DeleteForwardChar,
            "DeleteBackwardChar" => Action::DeleteBackwardChar,
            "KillBeginningOfLine" => Action::KillBeginningOfLine,
            "KillEndOfLine" => Action::KillEndOfLine,
            "DeleteAll" => Action::DeleteAll,
            "RefreshScreen" => Action::RefreshScreen,
            _ => return None,
        })
    }
}

const DEFAULT_BINDINGS: &[(&str, Action)] = &[
    ("Enter", Action::Finish),
    ("C-c", Action::Cancel),
    ("Esc", Action::Cancel),
    ("ArrowUp", Action::SelectUp),
    ("C-p", Action::SelectUp),
    ("ArrowDown", Action::SelectDown),
    ("C-n", Action::SelectDown),
    ("PgUp", Action::ScrollPageUp),
    ("M-v", Action::ScrollPageUp),
    ("PgDn", Action::ScrollPageDown),
    ("C-v", Action::ScrollPageDown),
    ("ArrowLeft", Action::BackwardChar),
    ("ArrowRight", Action::ForwardChar),
    ("C-a", Action::BeginningOfLine),
    ("C-e", Action::EndOfLine),
    ("C-f", Action::ForwardChar),
    ("C-b", Action::BackwardChar),
    ("C-d", Action::DeleteForwardChar),
    ("Backspace", Action::DeleteBackwardChar),
    ("C-h", Action::DeleteBackwardChar),
    ("C-u", Action::KillBeginningOfLine),
    ("C-k", Action::KillEndOfLine),
    ("C-r", Action::RotateFilter),
    ("C-t", Action::ToggleQuery),
    ("C-Space", Action::ToggleSelectionAndSelectNext),
    ("C-l", Action::RefreshScreen),
];

/// Build the dispatch trie: defaults first, then the config's `Keymap` and
/// `Action` tables (later additions override). Unknown action names or
/// malformed key sequences are startup errors.
pub fn build_keymap(config: &Config) -> Result<SeqTrie<Action>> {
    let mut trie = SeqTrie::new();
    for (spelling, action) in DEFAULT_BINDINGS {
        trie.add(&to_key_seq(spelling)?, *action);
    }
    for (spelling, action_name) in &config.keymap {
        let seq = to_key_seq(spelling)
            .map_err(|e| anyhow!("Keymap entry {spelling:?}: {e}"))?;
        let action = Action::from_name(action_name)
            .ok_or_else(|| anyhow!("Keymap entry {spelling:?}: unknown action {action_name:?}"))?;
        debug!(target: "keymap", %spelling, ?action, "config binding");
        trie.add(&seq, action);
    }
    for (action_name, spellings) in &config.action {
        let action = Action::from_name(action_name)
            .ok_or_else(|| anyhow!("Action table: unknown action {action_name:?}"))?;
        for spelling in spellings {
            let seq = to_key_seq(spelling)
                .map_err(|e| anyhow!("Action entry {spelling:?}: {e}"))?;
            trie.add(&seq, action);
        }
    }
    trie.balance();
    trie.build_failure_links();
    Ok(trie)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_keymap::{Feed, Key, SeqState};

    #[test]
    fn default_bindings_dispatch() {
        let trie = build_keymap(&Config::default()).unwrap();
        let mut state = SeqState::new();
        assert_eq!(
            trie.feed(&mut state, Key::named(core_keymap::KeyCode::Enter)),
            Feed::Action(&Action::Finish)
        );
        assert_eq!(trie.feed(&mut state, Key::ctrl('n')), Feed::Action(&Action::SelectDown));
    }

    #[test]
    fn config_keymap_overrides_defaults() {
        let mut config = Config::default();
        config
            .keymap
            .insert("C-n".to_string(), "peco.ScrollPageDown".to_string());
        let trie = build_keymap(&config).unwrap();
        let mut state = SeqState::new();
        assert_eq!(
            trie.feed(&mut state, Key::ctrl('n')),
            Feed::Action(&Action::ScrollPageDown)
        );
    }

    #[test]
    fn multi_key_config_binding() {
        let mut config = Config::default();
        config
            .keymap
            .insert("C-x,C-c".to_string(), "peco.Finish".to_string());
        let trie = build_keymap(&config).unwrap();
        let mut state = SeqState::new();
        assert_eq!(trie.feed(&mut state, Key::ctrl('x')), Feed::Pending);
        assert_eq!(
            trie.feed(&mut state, Key::ctrl('c')),
            Feed::Action(&Action::Finish)
        );
    }

    #[test]
    fn action_table_attaches_bindings() {
        let mut config = Config::default();
        config
            .action
            .insert("peco.SelectAll".to_string(), vec!["M-a".to_string()]);
        let trie = build_keymap(&config).unwrap();
        let mut state = SeqState::new();
        assert_eq!(trie.feed(&mut state, Key::alt('a')), Feed::Action(&Action::SelectAll));
    }

    #[test]
    fn unknown_action_name_is_a_startup_error() {
        let mut config = Config::default();
        config
            .keymap
            .insert("C-q".to_string(), "peco.Levitate".to_string());
        assert!(build_keymap(&config).is_err());
    }

    #[test]
    fn prefixless_action_names_resolve() {
        assert_eq!(Action::from_name("Finish"), Some(Action::Finish));
        assert_eq!(Action::from_name("peco.Finish"), Some(Action::Finish));
        assert_eq!(Action::from_name("peco.Nope"), None);
    }
}
