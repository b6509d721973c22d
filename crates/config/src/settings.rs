// Cell sync settings
// Loaded from ~/.config/cellsync/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Errors from loading or saving settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot serialize settings: {0}")]
    Serialize(serde_json::Error),
}

/// How a scroll-into-view animates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollBehavior {
    #[default]
    Smooth,
    Instant,
}

/// Where the target ends up in the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollBlock {
    Start,
    #[default]
    Center,
    End,
    Nearest,
}

/// Options for a single scroll-into-view request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollOptions {
    pub behavior: ScrollBehavior,
    pub block: ScrollBlock,
    /// Skip scrolling when the target is already visible.
    pub if_needed: bool,
}

/// Names of the host element attributes that carry cell identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeNames {
    #[serde(rename = "cellId")]
    pub cell_id: String,
    #[serde(rename = "type")]
    pub cell_type: String,
    #[serde(rename = "sessionPath")]
    pub session_path: String,
}

impl Default for AttributeNames {
    fn default() -> Self {
        Self {
            cell_id: "cell-id".to_string(),
            cell_type: "type".to_string(),
            session_path: "session-path".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Scrolling
    #[serde(rename = "scroll.behavior")]
    pub scroll_behavior: ScrollBehavior,

    /// Alignment when a focused or moved cell is brought into view.
    #[serde(rename = "scroll.cellBlock")]
    pub cell_block: ScrollBlock,

    /// Alignment of the editor caret after entering insert mode.
    #[serde(rename = "scroll.activeElementBlock")]
    pub active_element_block: ScrollBlock,

    #[serde(rename = "scroll.ifNeeded")]
    pub scroll_if_needed: bool,

    // Editor
    /// Keep the editor focused when it blurs while the cell is in insert mode.
    #[serde(rename = "editor.refocusOnBlur")]
    pub refocus_on_blur: bool,

    // Host element
    #[serde(rename = "attributes")]
    pub attributes: AttributeNames,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            // Scrolling
            scroll_behavior: ScrollBehavior::Smooth,
            cell_block: ScrollBlock::Nearest,
            active_element_block: ScrollBlock::Center,
            scroll_if_needed: true,
            // Editor
            refocus_on_blur: true,
            // Host element
            attributes: AttributeNames::default(),
        }
    }
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cellsync")
            .join("settings.json")
    }

    /// Load settings from the default location, falling back to defaults
    /// when no file exists.
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from(&Self::config_path())
    }

    /// Load settings from an explicit path. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            log::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&contents).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse settings JSON. Lines starting with `//` are comments.
    pub fn parse(contents: &str) -> Result<Self, serde_json::Error> {
        let cleaned: String = contents
            .lines()
            .filter(|line| !line.trim().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");

        serde_json::from_str(&cleaned)
    }

    /// Save current settings to the default location
    pub fn save(&self) -> Result<(), SettingsError> {
        self.save_to(&Self::config_path())
    }

    /// Save settings as pretty JSON, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| SettingsError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let json = serde_json::to_string_pretty(self).map_err(SettingsError::Serialize)?;

        fs::write(path, json).map_err(|source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Scroll used when a cell itself is brought into view.
    pub fn cell_scroll(&self) -> ScrollOptions {
        ScrollOptions {
            behavior: self.scroll_behavior,
            block: self.cell_block,
            if_needed: self.scroll_if_needed,
        }
    }

    /// Scroll used for the focused element after entering insert mode.
    pub fn active_element_scroll(&self) -> ScrollOptions {
        ScrollOptions {
            behavior: self.scroll_behavior,
            block: self.active_element_block,
            if_needed: self.scroll_if_needed,
        }
    }
}
