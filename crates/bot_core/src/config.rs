use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "fjnote.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub blinko_base_url: String,
    pub blinko_token: String,
    /// Debounce window for flash sessions, in seconds.
    pub flash_session_timeout: u64,
    pub enable_rich_display: bool,
    pub server_bind: String,
    /// Bearer token required by the webhook host; empty disables the check.
    pub webhook_token: String,
    pub render_output_dir: PathBuf,
    /// Cards kept in `render_output_dir`; older ones are deleted.
    pub render_card_retention: usize,
    pub flash_filters: FlashFilters,
    pub default_categories: DefaultCategories,
    pub advanced: AdvancedSettings,
    pub ui: UiPreferences,
    pub responses: ResponseTemplates,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            blinko_base_url: "http://localhost:1111".into(),
            blinko_token: String::new(),
            flash_session_timeout: 30,
            enable_rich_display: true,
            server_bind: "127.0.0.1:8787".into(),
            webhook_token: String::new(),
            render_output_dir: PathBuf::from("./rendered"),
            render_card_retention: 50,
            flash_filters: FlashFilters::default(),
            default_categories: DefaultCategories::default(),
            advanced: AdvancedSettings::default(),
            ui: UiPreferences::default(),
            responses: ResponseTemplates::default(),
        }
    }
}

impl Settings {
    pub fn flash_timeout(&self) -> Duration {
        Duration::from_secs(self.flash_session_timeout.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FlashFilters {
    /// Minimum trimmed length, in characters, of a flash message.
    pub min_content_length: usize,
    /// Comma separated prefixes whose messages are never recorded.
    pub ignore_prefixes: String,
}

impl Default for FlashFilters {
    fn default() -> Self {
        Self {
            min_content_length: 5,
            ignore_prefixes: "/t".into(),
        }
    }
}

impl FlashFilters {
    pub fn prefixes(&self) -> Vec<String> {
        self.ignore_prefixes
            .split(',')
            .map(str::trim)
            .filter(|prefix| !prefix.is_empty())
            .map(str::to_lowercase)
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DefaultCategories {
    pub flash_category: String,
    pub todo_category: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AdvancedSettings {
    /// Truncate persisted content to this many characters; 0 disables.
    pub max_content_length: usize,
    pub debug: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UiPreferences {
    pub show_timestamps: bool,
    pub compact_mode: bool,
    pub font_size: u32,
}

impl Default for UiPreferences {
    fn default() -> Self {
        Self {
            show_timestamps: true,
            compact_mode: false,
            font_size: 20,
        }
    }
}

/// Reply templates. `{name}` placeholders are substituted; an empty
/// template disables that reply.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResponseTemplates {
    pub flash_start: String,
    pub flash_add: String,
    pub flash_saved: String,
    pub todo_created: String,
    pub todo_completed: String,
    pub todo_edited: String,
    pub item_deleted: String,
    pub error_general: String,
    pub error_not_found: String,
}

impl Default for ResponseTemplates {
    fn default() -> Self {
        Self {
            flash_start: "⚡ Flash note started. Messages within {timeout}s are merged into one note."
                .into(),
            flash_add: "➕ Added to the current flash note.".into(),
            flash_saved: "✅ Flash note saved{tags}".into(),
            todo_created: "✅ Todo added: {content}".into(),
            todo_completed: "☑ Completed [{id}] {content}".into(),
            todo_edited: "✏️ Updated [{id}] {content}".into(),
            item_deleted: "🗑 Deleted {type} [{id}]".into(),
            error_general: "❌ {error}".into(),
            error_not_found: "❌ No {type} numbered {id}".into(),
        }
    }
}

/// Loads settings: defaults, then the TOML file (if present), then
/// environment overrides. `FJNOTE_CONFIG` replaces the default path.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let path = path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("FJNOTE_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut settings = match fs::read_to_string(&path) {
        Ok(raw) => parse_settings(&raw)
            .with_context(|| format!("failed to parse config file '{}'", path.display()))?,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Settings::default(),
        Err(error) => {
            return Err(error)
                .with_context(|| format!("failed to read config file '{}'", path.display()))
        }
    };

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

pub fn parse_settings(raw: &str) -> anyhow::Result<Settings> {
    Ok(toml::from_str(raw)?)
}

/// `APP__<KEY>` wins over the bare `<KEY>`.
pub fn apply_env_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    let value = |key: &str| lookup(&format!("APP__{key}")).or_else(|| lookup(key));

    if let Some(v) = value("BLINKO_BASE_URL") {
        settings.blinko_base_url = v;
    }
    if let Some(v) = value("BLINKO_TOKEN") {
        settings.blinko_token = v;
    }
    if let Some(v) = value("FLASH_SESSION_TIMEOUT") {
        if let Ok(parsed) = v.trim().parse::<u64>() {
            settings.flash_session_timeout = parsed;
        }
    }
    if let Some(v) = value("ENABLE_RICH_DISPLAY") {
        if let Some(parsed) = parse_bool(&v) {
            settings.enable_rich_display = parsed;
        }
    }
    if let Some(v) = value("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = value("WEBHOOK_TOKEN") {
        settings.webhook_token = v;
    }
    if let Some(v) = value("RENDER_OUTPUT_DIR") {
        settings.render_output_dir = PathBuf::from(v);
    }
    if let Some(v) = value("RENDER_CARD_RETENTION") {
        if let Ok(parsed) = v.trim().parse::<usize>() {
            settings.render_card_retention = parsed;
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
