//! Style roles and their token lists.
//!
//! Each role is configured as a list of tokens: color names or palette
//! indices for the foreground, `on_`-prefixed equivalents for the
//! background, and the attribute words `bold`, `underline` and `reverse`.
//! Unrecognized tokens fail configuration loading.

use core_model::{Color, TextAttrs};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "Vec<String>")]
pub struct StyleSpec {
    pub fg: Color,
    pub bg: Color,
    pub attrs: TextAttrs,
}

impl StyleSpec {
    pub const fn new(fg: Color, bg: Color, attrs: TextAttrs) -> Self {
        Self { fg, bg, attrs }
    }
}

impl TryFrom<Vec<String>> for StyleSpec {
    type Error = String;

    fn try_from(tokens: Vec<String>) -> Result<Self, Self::Error> {
        let mut spec = StyleSpec::default();
        for token in &tokens {
            match token.as_str() {
                "bold" => spec.attrs |= TextAttrs::BOLD,
                "underline" => spec.attrs |= TextAttrs::UNDERLINE,
                "reverse" => spec.attrs |= TextAttrs::REVERSE,
                other => {
                    if let Some(bg) = other.strip_prefix("on_") {
                        spec.bg = parse_color(bg)
                            .ok_or_else(|| format!("unknown background color {other:?}"))?;
                    } else {
                        spec.fg = parse_color(other)
                            .ok_or_else(|| format!("unknown style token {other:?}"))?;
                    }
                }
            }
        }
        Ok(spec)
    }
}

fn parse_color(name: &str) -> Option<Color> {
    let color = match name {
        "default" => Color::Default,
        "black" => Color::Indexed(0),
        "red" => Color::Indexed(1),
        "green" => Color::Indexed(2),
        "yellow" => Color::Indexed(3),
        "blue" => Color::Indexed(4),
        "magenta" => Color::Indexed(5),
        "cyan" => Color::Indexed(6),
        "white" => Color::Indexed(7),
        other => Color::Indexed(other.parse::<u8>().ok()?),
    };
    Some(color)
}

/// Styles per rendering role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct StyleSet {
    pub basic: StyleSpec,
    pub selected: StyleSpec,
    pub query: StyleSpec,
    pub query_cursor: StyleSpec,
    pub matched: StyleSpec,
    pub prompt: StyleSpec,
    pub context: StyleSpec,
    pub saved_selection: StyleSpec,
}

impl Default for StyleSet {
    fn default() -> Self {
        Self {
            basic: StyleSpec::default(),
            selected: StyleSpec::new(Color::Default, Color::Default, TextAttrs::UNDERLINE),
            query: StyleSpec::default(),
            query_cursor: StyleSpec::new(Color::Default, Color::Default, TextAttrs::REVERSE),
            matched: StyleSpec::new(Color::Indexed(6), Color::Default, TextAttrs::empty()),
            prompt: StyleSpec::default(),
            context: StyleSpec::new(Color::Indexed(4), Color::Default, TextAttrs::empty()),
            saved_selection: StyleSpec::new(Color::Indexed(0), Color::Indexed(6), TextAttrs::BOLD),
        }
    }
}
