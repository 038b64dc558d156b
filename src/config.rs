use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::theme::ThemeChoice;

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeminiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub min_width: u32,
    pub min_height: u32,
}

/// Initial look of the window. The in-session theme switch is not written back.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct UiConfig {
    #[serde(default)]
    pub theme: ThemeChoice,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        GeminiConfig {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            width: 1100,
            height: 760,
            min_width: 640,
            min_height: 420,
        }
    }
}

impl GeminiConfig {
    /// `generateContent` URL without the key query parameter.
    pub fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    /// The environment wins over the config file. An absent key resolves to an
    /// empty string; the upstream then rejects the request.
    pub fn resolve_api_key(&self) -> String {
        resolve_api_key(std::env::var(API_KEY_ENV).ok(), self.api_key.clone())
    }
}

fn resolve_api_key(from_env: Option<String>, from_file: Option<String>) -> String {
    match from_env
        .filter(|k| !k.trim().is_empty())
        .or(from_file.filter(|k| !k.trim().is_empty()))
    {
        Some(key) => key.trim().to_string(),
        None => {
            tracing::warn!(
                "no API key configured; set {} or gemini.api_key in config.toml",
                API_KEY_ENV
            );
            String::new()
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let config_path = Self::get_config_path();

        if config_path.exists() {
            match fs::read_to_string(&config_path) {
                Ok(contents) => match Self::parse(&contents) {
                    Ok(config) => return config,
                    Err(e) => tracing::warn!(
                        "Error parsing {}: {}. Using defaults.",
                        config_path.display(),
                        e
                    ),
                },
                Err(e) => tracing::warn!(
                    "Error reading {}: {}. Using defaults.",
                    config_path.display(),
                    e
                ),
            }
        } else if let Some(parent) = config_path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                tracing::warn!("could not create {}: {}", parent.display(), e);
            }
        }

        Config::default()
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn get_config_path() -> PathBuf {
        if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join(".config/flux-ai/config.toml")
        } else {
            PathBuf::from("config.toml")
        }
    }

    pub fn get_config_dir() -> PathBuf {
        if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join(".config/flux-ai")
        } else {
            PathBuf::from(".")
        }
    }
}
