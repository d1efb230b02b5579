//! Configuration management

#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    // Channel store connection
    #[serde(default)]
    pub store_url: String,
    #[serde(default)]
    pub store_api_key: String,
    #[serde(default = "default_feed_poll")]
    pub feed_poll_secs: u64,
    // Saved state
    #[serde(default)]
    pub save_state: bool,
    #[serde(default)]
    pub saved_username: String,
    #[serde(default)]
    pub saved_password: String,
    #[serde(default)]
    pub auto_login: bool,
    // Appearance
    #[serde(default = "default_true")]
    pub dark_mode: bool,
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    // Playback
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default)]
    pub muted: bool,
    #[serde(default = "default_true")]
    pub use_internal_player: bool,
}

fn default_feed_poll() -> u64 { 5 }
fn default_font_size() -> u32 { 12 }
fn default_volume() -> f32 { 1.0 }
fn default_true() -> bool { true }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_url: String::new(),
            store_api_key: String::new(),
            feed_poll_secs: 5,
            save_state: false,
            saved_username: String::new(),
            saved_password: String::new(),
            auto_login: false,
            dark_mode: true,
            font_size: 12,
            volume: 1.0,
            muted: false,
            use_internal_player: true,
        }
    }
}

impl AppConfig {
    fn config_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("xtv_dashboard");
        fs::create_dir_all(&path).ok();
        path.push("config.json");
        path
    }

    pub fn load() -> Self {
        let path = Self::config_path();

        if path.exists() {
            if let Ok(content) = fs::read_to_string(&path) {
                if let Ok(config) = serde_json::from_str(&content) {
                    return config;
                }
            }
        }

        Self::default()
    }

    pub fn save(&self) {
        let path = Self::config_path();
        if let Ok(content) = serde_json::to_string_pretty(self) {
            let _ = fs::write(path, content);
        }
    }
}
