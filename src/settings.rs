use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, RwLock};

use crate::commentary::DEFAULT_SYSTEM_PROMPT;
use crate::pdf::{DEFAULT_MIN_SELECTION, SelectionThresholds, Viewport};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "marginalia";

const DEFAULT_VIEWPORT_WIDTH: u32 = 600;
const DEFAULT_VIEWPORT_HEIGHT: u32 = 700;
const DEFAULT_SCROLL_STEP: u32 = 50;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,

    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,

    #[serde(default = "default_min_selection")]
    pub min_selection_width: u32,

    #[serde(default = "default_min_selection")]
    pub min_selection_height: u32,

    /// Pixels scrolled per wheel notch
    #[serde(default = "default_scroll_step")]
    pub scroll_step: u32,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_viewport_width() -> u32 {
    DEFAULT_VIEWPORT_WIDTH
}

fn default_viewport_height() -> u32 {
    DEFAULT_VIEWPORT_HEIGHT
}

fn default_min_selection() -> u32 {
    DEFAULT_MIN_SELECTION
}

fn default_scroll_step() -> u32 {
    DEFAULT_SCROLL_STEP
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            min_selection_width: default_min_selection(),
            min_selection_height: default_min_selection(),
            scroll_step: default_scroll_step(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl Settings {
    /// Configured viewport, falling back to the default on zero dimensions
    #[must_use]
    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.viewport_width, self.viewport_height).unwrap_or_else(|| {
            warn!(
                "Invalid viewport {}x{}, using default",
                self.viewport_width, self.viewport_height
            );
            Viewport {
                width: DEFAULT_VIEWPORT_WIDTH,
                height: DEFAULT_VIEWPORT_HEIGHT,
            }
        })
    }

    #[must_use]
    pub fn selection_thresholds(&self) -> SelectionThresholds {
        SelectionThresholds {
            min_width: self.min_selection_width,
            min_height: self.min_selection_height,
        }
    }
}

static SETTINGS: LazyLock<RwLock<Settings>> = LazyLock::new(|| RwLock::new(Settings::default()));

fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

pub fn load_settings() {
    let Some(path) = preferred_config_path() else {
        warn!("Could not determine config directory, using default settings");
        return;
    };

    if path.exists() {
        load_settings_from_path(&path);
    } else {
        info!("Settings file not found, creating with defaults at {path:?}");
        if let Ok(settings) = SETTINGS.read() {
            if let Err(e) = save_settings_to_file(&settings, &path) {
                error!("{e}");
            }
        }
    }
}

/// Load settings from an explicit path into the global settings.
///
/// Errors are logged and leave the current settings untouched.
pub fn load_settings_from_path(path: &Path) {
    match read_settings(path) {
        Ok(mut settings) => {
            debug!("Loaded settings from {path:?}");

            if settings.version < CURRENT_VERSION {
                migrate_settings(&mut settings);
                if let Err(e) = save_settings_to_file(&settings, path) {
                    error!("{e}");
                }
            }

            if let Ok(mut global) = SETTINGS.write() {
                *global = settings;
            }
        }
        Err(e) => {
            error!("{e}");
        }
    }
}

pub fn read_settings(path: &Path) -> Result<Settings, SettingsError> {
    let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str::<Settings>(&content).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );

    settings.version = CURRENT_VERSION;
}

pub fn save_settings_to_file(settings: &Settings, path: &Path) -> Result<(), SettingsError> {
    let write_err = |source: std::io::Error| SettingsError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
    }

    fs::write(path, generate_settings_yaml(settings)).map_err(write_err)?;
    debug!("Saved settings to {path:?}");
    Ok(())
}

fn generate_settings_yaml(settings: &Settings) -> String {
    let mut content = String::new();

    content.push_str(&format!("version: {}\n", settings.version));
    content.push_str("\n# Page surface size in pixels\n");
    content.push_str(&format!("viewport_width: {}\n", settings.viewport_width));
    content.push_str(&format!("viewport_height: {}\n", settings.viewport_height));
    content.push_str("\n# Drags smaller than this are cancelled\n");
    content.push_str(&format!(
        "min_selection_width: {}\n",
        settings.min_selection_width
    ));
    content.push_str(&format!(
        "min_selection_height: {}\n",
        settings.min_selection_height
    ));
    content.push_str(&format!("scroll_step: {}\n", settings.scroll_step));
    content.push_str("\n# Prepended to every question sent with a selection\n");
    // JSON string literals are valid single-line YAML double-quoted scalars
    content.push_str(&format!(
        "system_prompt: {}\n",
        serde_json::to_string(&settings.system_prompt).unwrap_or_else(|_| "\"\"".to_string())
    ));

    content
}

// Public API for accessing settings

pub fn get_settings() -> Settings {
    SETTINGS.read().map(|s| s.clone()).unwrap_or_default()
}

pub fn get_viewport() -> Viewport {
    get_settings().viewport()
}

pub fn get_selection_thresholds() -> SelectionThresholds {
    SETTINGS
        .read()
        .map(|s| s.selection_thresholds())
        .unwrap_or_default()
}

pub fn get_scroll_step() -> u32 {
    SETTINGS
        .read()
        .map(|s| s.scroll_step)
        .unwrap_or(DEFAULT_SCROLL_STEP)
}

pub fn get_system_prompt() -> String {
    SETTINGS
        .read()
        .map(|s| s.system_prompt.clone())
        .unwrap_or_else(|_| default_system_prompt())
}
