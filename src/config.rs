// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// This module handles loading and parsing configuration from config.toml.
// Provides sensible defaults if config file is missing or has errors.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::gfx::queue_family::CoveragePolicy;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub renderer: RendererConfig,
    pub device: DeviceConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Hearth".to_string(),
            width: 1280,
            height: 720,
            fullscreen: false,
        }
    }
}

/// Backend selection
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub api: String,
    /// `[major, minor, patch]`, capped by what the loader supports.
    pub api_version: [u32; 3],
    pub application_name: String,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            api: "vulkan".to_string(),
            api_version: [1, 2, 0],
            application_name: "Hearth Application".to_string(),
        }
    }
}

/// Logical device settings
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct DeviceConfig {
    pub queue_coverage: CoveragePolicy,
    /// Absent: fence waits never time out.
    pub fence_timeout_ms: Option<u64>,
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Only honoured in debug builds.
    pub validation_layers: bool,
    pub log_level: String,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_level: "info".to_string(),
            show_fps: false,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Get log level as a filter, defaulting to Info for unknown names
    pub fn log_level(&self) -> log::LevelFilter {
        self.debug.log_level.parse().unwrap_or_else(|_| {
            eprintln!(
                "Unknown log level '{}', defaulting to info",
                self.debug.log_level
            );
            log::LevelFilter::Info
        })
    }
}
