//! Logical keys and the `C-x,C-c` binding lexicon.
//!
//! A key is (modifier mask, key constant, rune); two keys compare
//! lexicographically in that field order, which is the ordering the
//! sequence trie's sibling BSTs are built on. Parsing and rendering are
//! inverses for every canonical spelling: `to_key_seq("C-x,C-c")` renders
//! back to `"C-x,C-c"`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use smallvec::SmallVec;
use thiserror::Error;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModMask: u8 {
        const CTRL = 1;
        const ALT = 2;
        const SHIFT = 4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    /// Printable rune; the rune itself lives in [`Key::ch`].
    Char,
    Enter,
    Esc,
    Backspace,
    Tab,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    F(u8),
}

impl KeyCode {
    fn rank(&self) -> u16 {
        match self {
            KeyCode::Char => 0,
            KeyCode::Enter => 1,
            KeyCode::Esc => 2,
            KeyCode::Backspace => 3,
            KeyCode::Tab => 4,
            KeyCode::Up => 5,
            KeyCode::Down => 6,
            KeyCode::Left => 7,
            KeyCode::Right => 8,
            KeyCode::Home => 9,
            KeyCode::End => 10,
            KeyCode::PageUp => 11,
            KeyCode::PageDown => 12,
            KeyCode::Insert => 13,
            KeyCode::Delete => 14,
            KeyCode::F(n) => 100 + u16::from(*n),
        }
    }

    fn name(&self) -> Option<&'static str> {
        Some(match self {
            KeyCode::Char => return None,
            KeyCode::Enter => "Enter",
            KeyCode::Esc => "Esc",
            KeyCode::Backspace => "Backspace",
            KeyCode::Tab => "Tab",
            KeyCode::Up => "ArrowUp",
            KeyCode::Down => "ArrowDown",
            KeyCode::Left => "ArrowLeft",
            KeyCode::Right => "ArrowRight",
            KeyCode::Home => "Home",
            KeyCode::End => "End",
            KeyCode::PageUp => "PgUp",
            KeyCode::PageDown => "PgDn",
            KeyCode::Insert => "Insert",
            KeyCode::Delete => "Delete",
            KeyCode::F(_) => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key {
    pub mods: ModMask,
    pub code: KeyCode,
    pub ch: char,
}

impl Key {
    pub fn char(ch: char) -> Self {
        Self {
            mods: ModMask::empty(),
            code: KeyCode::Char,
            ch,
        }
    }

    pub fn named(code: KeyCode) -> Self {
        Self {
            mods: ModMask::empty(),
            code,
            ch: '\0',
        }
    }

    pub fn ctrl(ch: char) -> Self {
        Self {
            mods: ModMask::CTRL,
            code: KeyCode::Char,
            ch,
        }
    }

    pub fn alt(ch: char) -> Self {
        Self {
            mods: ModMask::ALT,
            code: KeyCode::Char,
            ch,
        }
    }

    pub fn with_mods(mut self, mods: ModMask) -> Self {
        self.mods = mods;
        self
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.mods
            .bits()
            .cmp(&other.mods.bits())
            .then(self.code.rank().cmp(&other.code.rank()))
            .then(self.ch.cmp(&other.ch))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mods.contains(ModMask::CTRL) {
            write!(f, "C-")?;
        }
        if self.mods.contains(ModMask::ALT) {
            write!(f, "M-")?;
        }
        if self.mods.contains(ModMask::SHIFT) {
            write!(f, "S-")?;
        }
        if let Some(name) = self.code.name() {
            write!(f, "{name}")
        } else if let KeyCode::F(n) = self.code {
            write!(f, "F{n}")
        } else if self.ch == ' ' {
            write!(f, "Space")
        } else {
            write!(f, "{}", self.ch)
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyParseError {
    #[error("unknown key name {0:?}")]
    UnknownKey(String),
    #[error("empty key sequence")]
    Empty,
}

impl FromStr for Key {
    type Err = KeyParseError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let mut mods = ModMask::empty();
        let mut rest = token;
        loop {
            if let Some(r) = rest.strip_prefix("C-") {
                mods |= ModMask::CTRL;
                rest = r;
            } else if let Some(r) = rest.strip_prefix("M-") {
                mods |= ModMask::ALT;
                rest = r;
            } else if let Some(r) = rest.strip_prefix("S-") {
                mods |= ModMask::SHIFT;
                rest = r;
            } else {
                break;
            }
        }
        if rest.is_empty() {
            return Err(KeyParseError::UnknownKey(token.to_string()));
        }
        let mut chars = rest.chars();
        let first = chars.next().unwrap_or('\0');
        if chars.next().is_none() {
            return Ok(Key::char(first).with_mods(mods));
        }
        let code = match rest {
            "Enter" | "Return" => KeyCode::Enter,
            "Esc" | "Escape" => KeyCode::Esc,
            "Backspace" | "BS" => KeyCode::Backspace,
            "Tab" => KeyCode::Tab,
            "Space" => return Ok(Key::char(' ').with_mods(mods)),
            "ArrowUp" | "Up" => KeyCode::Up,
            "ArrowDown" | "Down" => KeyCode::Down,
            "ArrowLeft" | "Left" => KeyCode::Left,
            "ArrowRight" | "Right" => KeyCode::Right,
            "Home" => KeyCode::Home,
            "End" => KeyCode::End,
            "PgUp" | "PageUp" => KeyCode::PageUp,
            "PgDn" | "PageDown" => KeyCode::PageDown,
            "Insert" => KeyCode::Insert,
            "Delete" | "Del" => KeyCode::Delete,
            _ => {
                if let Some(n) = rest.strip_prefix('F').and_then(|n| n.parse::<u8>().ok()) {
                    KeyCode::F(n)
                } else {
                    return Err(KeyParseError::UnknownKey(token.to_string()));
                }
            }
        };
        Ok(Key::named(code).with_mods(mods))
    }
}

/// A comma-separated multi-keystroke binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct KeySeq(pub SmallVec<[Key; 2]>);

impl KeySeq {
    pub fn keys(&self) -> &[Key] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for KeySeq {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut keys = SmallVec::new();
        for token in s.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            keys.push(token.parse::<Key>()?);
        }
        if keys.is_empty() {
            return Err(KeyParseError::Empty);
        }
        Ok(KeySeq(keys))
    }
}

impl fmt::Display for KeySeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{key}")?;
        }
        Ok(())
    }
}

/// Parse a binding string such as `"C-x,C-c"`.
pub fn to_key_seq(s: &str) -> Result<KeySeq, KeyParseError> {
    s.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ordering_is_lexicographic_by_mods_code_rune() {
        let plain_a = Key::char('a');
        let plain_b = Key::char('b');
        let ctrl_a = Key::ctrl('a');
        let enter = Key::named(KeyCode::Enter);
        assert!(plain_a < plain_b);
        assert!(plain_a < enter, "key constant outranks rune");
        assert!(plain_b < ctrl_a, "modifiers dominate the ordering");
        let mut keys = vec![ctrl_a, enter, plain_b, plain_a];
        keys.sort();
        assert_eq!(keys, vec![plain_a, plain_b, enter, ctrl_a]);
    }

    #[test]
    fn parse_render_round_trips() {
        for spelling in [
            "a",
            "C-x",
            "M-v",
            "C-M-d",
            "Enter",
            "Esc",
            "Space",
            "C-Space",
            "ArrowUp",
            "PgDn",
            "F5",
            "C-x,C-c",
            "M-Enter,b",
        ] {
            let seq = to_key_seq(spelling).unwrap();
            assert_eq!(seq.to_string(), spelling);
        }
    }

    #[test]
    fn aliases_normalize_to_canonical_names() {
        assert_eq!(to_key_seq("Return").unwrap().to_string(), "Enter");
        assert_eq!(to_key_seq("BS").unwrap().to_string(), "Backspace");
        assert_eq!(to_key_seq("PageDown").unwrap().to_string(), "PgDn");
        assert_eq!(to_key_seq("Up").unwrap().to_string(), "ArrowUp");
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert!(matches!(
            to_key_seq("NoSuchKey"),
            Err(KeyParseError::UnknownKey(_))
        ));
        assert_eq!(to_key_seq(" , "), Err(KeyParseError::Empty));
    }

    #[test]
    fn multi_key_sequences_parse_in_order() {
        let seq = to_key_seq("C-x,C-c").unwrap();
        assert_eq!(seq.keys(), &[Key::ctrl('x'), Key::ctrl('c')]);
    }
}
