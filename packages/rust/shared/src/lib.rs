//! Shared types, error model, and configuration for chatsplit.
//!
//! This crate is the foundation depended on by all other chatsplit crates.
//! It provides:
//! - [`ChatsplitError`]: the unified error type
//! - Domain types ([`Turn`], [`RangeGroup`], [`Keyword`], [`Page`], [`HeaderIndex`])
//! - Configuration ([`AppConfig`], config loading and validation)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, HardReplacementsConfig, KeywordsConfig, SettingsConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, parse_replacements,
};
pub use error::{ChatsplitError, Result};
pub use types::{
    HeaderEntry, HeaderIndex, Keyword, NavLinks, Page, RangeGroup, Replacement, TURN_MARKER,
    Turn, Warning, WarningKind,
};
