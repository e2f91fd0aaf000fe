//! Application configuration for chatsplit.
//!
//! User config lives at `~/.chatsplit/chatsplit.toml`.
//! CLI flags override config file values, which override defaults.
//!
//! Keyword and replacement tables are stored as newline-separated strings so
//! they stay easy to edit by hand; they are validated when the file is loaded
//! and exposed as typed tables via [`AppConfig::keywords`] and
//! [`AppConfig::replacements`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ChatsplitError, Result};
use crate::types::{Keyword, Replacement};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "chatsplit.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".chatsplit";

// ---------------------------------------------------------------------------
// Config structs (matching chatsplit.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// General settings.
    #[serde(default)]
    pub settings: SettingsConfig,

    /// Keyword phrases used for tagging.
    #[serde(default)]
    pub keywords: KeywordsConfig,

    /// Literal substitutions applied during normalization.
    #[serde(default)]
    pub hard_replacements: HardReplacementsConfig,
}

/// `[settings]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// Directory pages are written to when `--out` is not given.
    #[serde(default = "default_save_path")]
    pub default_save_path: String,

    /// Directory offered for input archives.
    #[serde(default = "default_load_path")]
    pub default_load_path: String,

    /// Tags per line in the tag block (0 disables wrapping).
    #[serde(default = "default_tag_string_len")]
    pub tag_string_len: usize,

    /// Page name prefix, e.g. `page` -> `page 001.md`.
    #[serde(default = "default_name_template")]
    pub name_template: String,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            default_save_path: default_save_path(),
            default_load_path: default_load_path(),
            tag_string_len: default_tag_string_len(),
            name_template: default_name_template(),
        }
    }
}

fn default_save_path() -> String {
    "~/chatsplit-notes".into()
}
fn default_load_path() -> String {
    "~/Downloads".into()
}
fn default_tag_string_len() -> usize {
    5
}
fn default_name_template() -> String {
    "page".into()
}

/// `[keywords]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeywordsConfig {
    /// Newline-separated raw keyword phrases.
    #[serde(default)]
    pub words: String,
}

/// `[hard_replacements]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HardReplacementsConfig {
    /// Newline-separated `find:replace` pairs; the first colon delimits.
    #[serde(default)]
    pub replacements: String,
}

impl AppConfig {
    /// The keyword table in configured order. Blank lines are skipped and
    /// later duplicates of a tag label are ignored.
    pub fn keywords(&self) -> Vec<Keyword> {
        let mut keywords: Vec<Keyword> = Vec::new();
        for kw in self.keywords.words.lines().filter_map(Keyword::from_raw) {
            if keywords.iter().any(|k| k.tag_label == kw.tag_label) {
                continue;
            }
            keywords.push(kw);
        }
        keywords
    }

    /// The replacement table in configured order.
    pub fn replacements(&self) -> Result<Vec<Replacement>> {
        parse_replacements(&self.hard_replacements.replacements)
    }

    /// Check every field that serde cannot check on its own.
    pub fn validate(&self) -> Result<()> {
        validate_name_template(&self.settings.name_template)?;
        self.replacements()?;
        Ok(())
    }
}

/// Parse newline-separated `find:replace` pairs.
///
/// Only the first colon splits, so the replacement may itself contain colons.
/// Blank lines are ignored. Surrounding whitespace is significant on the
/// replacement side but a trailing `\r` is dropped.
pub fn parse_replacements(raw: &str) -> Result<Vec<Replacement>> {
    let mut out = Vec::new();

    for (n, line) in raw.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let Some((find, replace)) = line.split_once(':') else {
            return Err(ChatsplitError::config(format!(
                "hard_replacements line {}: expected `find:replace`, got {line:?}",
                n + 1
            )));
        };

        if find.is_empty() {
            return Err(ChatsplitError::config(format!(
                "hard_replacements line {}: empty search text",
                n + 1
            )));
        }

        out.push(Replacement {
            find: find.to_string(),
            replace: replace.to_string(),
        });
    }

    Ok(out)
}

fn validate_name_template(template: &str) -> Result<()> {
    if template.trim().is_empty() {
        return Err(ChatsplitError::config("settings.name_template must not be empty"));
    }
    if template.contains(['/', '\\']) {
        return Err(ChatsplitError::config(format!(
            "settings.name_template {template:?} must not contain path separators"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.chatsplit/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ChatsplitError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.chatsplit/chatsplit.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load and validate the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ChatsplitError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        ChatsplitError::config(format!("failed to parse {}: {e}", path.display()))
    })?;

    config.validate()?;
    tracing::debug!(
        ?path,
        keywords = config.keywords().len(),
        "config loaded"
    );

    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ChatsplitError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ChatsplitError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ChatsplitError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
