//! core-config: the configuration file model.
//!
//! Files are JSON or YAML, chosen by extension, with the documented keys
//! (`Action`, `Keymap`, `InitialFilter`, `Style`, …). Enum-valued fields
//! reject unrecognized spellings at load time; unknown keys are tolerated
//! so configs can carry forward-compatible extras. Path discovery and the
//! environment it reads are injectable for tests (see [`locate`]).

pub mod locate;
pub mod style;

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

pub use locate::ConfigLocator;
pub use style::{StyleSet, StyleSpec};

/// Default interactive prompt.
pub const DEFAULT_PROMPT: &str = "QUERY>";
/// Default stdin scan-buffer ceiling (bytes).
pub const DEFAULT_MAX_SCAN_BUFFER_SIZE: usize = 256 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config {path}: {message}")]
    Parse { path: String, message: String },
    #[error("unsupported config extension: {0}")]
    UnsupportedExtension(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
pub enum Layout {
    #[serde(rename = "top-down")]
    #[default]
    TopDown,
    #[serde(rename = "bottom-up")]
    BottomUp,
    #[serde(rename = "top-down-query-bottom")]
    TopDownQueryBottom,
}

/// Exit-code policy for a user cancel (Ctrl-C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OnCancel {
    Success,
    #[default]
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Auto,
    None,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(default, rename_all = "PascalCase")]
pub struct SingleKeyJumpConfig {
    pub show_prefix: bool,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(default, rename_all = "PascalCase")]
pub struct CustomFilterConfig {
    pub cmd: String,
    pub args: Vec<String>,
    pub buffer_threshold: usize,
}

/// Viewport height: absolute rows (`"20"`) or a percentage (`"50%"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Height {
    Rows(u16),
    Percent(u16),
}

impl TryFrom<String> for Height {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        if let Some(pct) = trimmed.strip_suffix('%') {
            let n: u16 = pct
                .parse()
                .map_err(|_| format!("invalid height percentage {value:?}"))?;
            if n == 0 || n > 100 {
                return Err(format!("height percentage out of range: {value:?}"));
            }
            Ok(Height::Percent(n))
        } else {
            let n: u16 = trimmed
                .parse()
                .map_err(|_| format!("invalid height {value:?}"))?;
            if n == 0 {
                return Err(format!("height must be positive: {value:?}"));
            }
            Ok(Height::Rows(n))
        }
    }
}

impl Height {
    /// Rows to occupy on a terminal of `term_rows`.
    pub fn resolve(&self, term_rows: u16) -> u16 {
        match self {
            Height::Rows(n) => (*n).min(term_rows),
            Height::Percent(p) => {
                let rows = (u32::from(term_rows) * u32::from(*p) / 100) as u16;
                rows.clamp(1, term_rows)
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "PascalCase")]
pub struct Config {
    /// action-name → key-binding strings to attach.
    pub action: HashMap<String, Vec<String>>,
    /// key-sequence string (`C-a` / `M-v` / `C-x,C-c`) → action-name.
    pub keymap: HashMap<String, String>,
    pub initial_filter: Option<String>,
    pub style: StyleSet,
    pub prompt: String,
    pub layout: Layout,
    pub on_cancel: OnCancel,
    pub custom_filter: HashMap<String, CustomFilterConfig>,
    /// Milliseconds to debounce query execution.
    pub query_execution_delay: u64,
    pub sticky_selection: bool,
    pub max_scan_buffer_size: usize,
    pub filter_buf_size: usize,
    pub fuzzy_longest_sort: bool,
    pub suppress_status_msg: bool,
    pub color: ColorMode,
    pub single_key_jump: SingleKeyJumpConfig,
    pub selection_prefix: String,
    pub height: Option<Height>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            action: HashMap::new(),
            keymap: HashMap::new(),
            initial_filter: None,
            style: StyleSet::default(),
            prompt: DEFAULT_PROMPT.to_string(),
            layout: Layout::default(),
            on_cancel: OnCancel::default(),
            custom_filter: HashMap::new(),
            query_execution_delay: 0,
            sticky_selection: false,
            max_scan_buffer_size: DEFAULT_MAX_SCAN_BUFFER_SIZE,
            filter_buf_size: 0,
            fuzzy_longest_sort: false,
            suppress_status_msg: false,
            color: ColorMode::default(),
            single_key_jump: SingleKeyJumpConfig::default(),
            selection_prefix: String::new(),
            height: None,
        }
    }
}

impl Config {
    /// Parse one file, picking the reader by extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        let parsed = match ext.as_str() {
            "json" => serde_json::from_str::<Config>(&content).map_err(|e| e.to_string()),
            "yaml" | "yml" => serde_yaml::from_str::<Config>(&content).map_err(|e| e.to_string()),
            other => return Err(ConfigError::UnsupportedExtension(other.to_string())),
        };
        parsed.map_err(|message| ConfigError::Parse {
            path: path.display().to_string(),
            message,
        })
    }

    /// Discover and parse the first config file the locator finds; absent
    /// files yield the defaults, malformed files are fatal.
    pub fn load_or_default(locator: &ConfigLocator) -> Result<Self, ConfigError> {
        match locator.locate() {
            Some(path) => {
                info!(target: "config", path = %path.display(), "loading config");
                Self::load(&path)
            }
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn write_config(dir: &tempfile::TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.prompt, "QUERY>");
        assert_eq!(cfg.layout, Layout::TopDown);
        assert_eq!(cfg.on_cancel, OnCancel::Error);
        assert_eq!(cfg.max_scan_buffer_size, 256 * 1024);
        assert!(!cfg.sticky_selection);
    }

    #[test]
    fn parses_json_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "config.json",
            r#"{
                "Prompt": "PICK>",
                "Layout": "bottom-up",
                "OnCancel": "success",
                "QueryExecutionDelay": 150,
                "StickySelection": true,
                "Keymap": {"C-x,C-c": "peco.Finish"},
                "CustomFilter": {
                    "grep": {"Cmd": "grep", "Args": ["$QUERY"], "BufferThreshold": 50}
                }
            }"#,
        );
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.prompt, "PICK>");
        assert_eq!(cfg.layout, Layout::BottomUp);
        assert_eq!(cfg.on_cancel, OnCancel::Success);
        assert_eq!(cfg.query_execution_delay, 150);
        assert!(cfg.sticky_selection);
        assert_eq!(cfg.keymap["C-x,C-c"], "peco.Finish");
        assert_eq!(cfg.custom_filter["grep"].buffer_threshold, 50);
    }

    #[test]
    fn parses_yaml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "config.yml",
            "Prompt: \"YAML>\"\nLayout: top-down-query-bottom\nFuzzyLongestSort: true\nHeight: \"50%\"\n",
        );
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.prompt, "YAML>");
        assert_eq!(cfg.layout, Layout::TopDownQueryBottom);
        assert!(cfg.fuzzy_longest_sort);
        assert_eq!(cfg.height, Some(Height::Percent(50)));
    }

    #[test]
    fn invalid_layout_fails_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "config.json", r#"{"Layout": "sideways"}"#);
        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn invalid_on_cancel_fails_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "config.yaml", "OnCancel: maybe\n");
        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "config.toml", "Prompt = 'x'\n");
        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::UnsupportedExtension(ext)) if ext == "toml"
        ));
    }

    #[test]
    fn height_spec_parses_rows_and_percent() {
        assert_eq!(Height::try_from("20".to_string()), Ok(Height::Rows(20)));
        assert_eq!(Height::try_from("50%".to_string()), Ok(Height::Percent(50)));
        assert!(Height::try_from("0".to_string()).is_err());
        assert!(Height::try_from("120%".to_string()).is_err());
        assert!(Height::try_from("abc".to_string()).is_err());
    }

    #[test]
    fn height_resolution_clamps_to_terminal() {
        assert_eq!(Height::Rows(50).resolve(24), 24);
        assert_eq!(Height::Percent(50).resolve(40), 20);
        assert_eq!(Height::Percent(1).resolve(40), 1);
    }
}
