//! Config file discovery.
//!
//! Lookup order: `$XDG_CONFIG_HOME/peco/config.{json,yaml,yml}`, then the
//! same triple under each `$XDG_CONFIG_DIRS` entry, then
//! `$HOME/.peco/config.{json,yaml,yml}`. The environment is captured into
//! the locator up front so tests can substitute a synthetic one.

use std::path::{Path, PathBuf};

const APP_DIR: &str = "peco";
const BASENAMES: [&str; 3] = ["config.json", "config.yaml", "config.yml"];

#[derive(Debug, Clone, Default)]
pub struct ConfigLocator {
    home: Option<PathBuf>,
    xdg_config_home: Option<PathBuf>,
    xdg_config_dirs: Vec<PathBuf>,
}

impl ConfigLocator {
    /// Capture `HOME`, `XDG_CONFIG_HOME` and `XDG_CONFIG_DIRS` from the
    /// process environment.
    pub fn from_env() -> Self {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .or_else(dirs::home_dir);
        let xdg_config_home = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .filter(|p| !p.as_os_str().is_empty())
            .or_else(|| home.as_ref().map(|h| h.join(".config")));
        let xdg_config_dirs = std::env::var("XDG_CONFIG_DIRS")
            .map(|dirs| dirs.split(':').filter(|d| !d.is_empty()).map(PathBuf::from).collect())
            .unwrap_or_default();
        Self {
            home,
            xdg_config_home,
            xdg_config_dirs,
        }
    }

    /// Synthetic locator for tests.
    pub fn with_paths(
        home: Option<PathBuf>,
        xdg_config_home: Option<PathBuf>,
        xdg_config_dirs: Vec<PathBuf>,
    ) -> Self {
        Self {
            home,
            xdg_config_home,
            xdg_config_dirs,
        }
    }

    /// Every candidate path, in lookup order.
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut out = Vec::new();
        if let Some(xdg) = &self.xdg_config_home {
            push_basenames(&mut out, &xdg.join(APP_DIR));
        }
        for dir in &self.xdg_config_dirs {
            push_basenames(&mut out, &dir.join(APP_DIR));
        }
        if let Some(home) = &self.home {
            push_basenames(&mut out, &home.join(format!(".{APP_DIR}")));
        }
        out
    }

    /// First candidate that exists on disk.
    pub fn locate(&self) -> Option<PathBuf> {
        self.candidates().into_iter().find(|p| p.is_file())
    }
}

fn push_basenames(out: &mut Vec<PathBuf>, dir: &Path) {
    for name in BASENAMES {
        out.push(dir.join(name));
    }
}
