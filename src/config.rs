//! Engine configuration
//!
//! Persisted in LocalStorage on web; read from the file named by
//! `ARCADE_ENGINE_CONFIG` on native.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Frame timing and host integration knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on one tick's elapsed time (ms). `None` passes wall time
    /// through untouched, which is what keeps firing counts exact.
    pub max_elapsed_ms: Option<f64>,
    /// Per-animation catch-up cap within a single tick. Unpaid time carries
    /// over to the next tick.
    pub max_fires_per_tick: Option<u32>,
    /// Stop pauses every sound, start resumes them, reset rewinds them
    pub pause_sounds_on_stop: bool,
    /// `log` level filter used by the binaries
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_elapsed_ms: None,
            max_fires_per_tick: None,
            pause_sounds_on_stop: true,
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Native config file env var
    pub const CONFIG_ENV: &'static str = "ARCADE_ENGINE_CONFIG";

    /// LocalStorage key (used only in wasm32)
    #[allow(dead_code)]
    const STORAGE_KEY: &'static str = "arcade_engine_config";

    /// Parse and validate a JSON config. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(max) = self.max_elapsed_ms {
            if !max.is_finite() || max <= 0.0 {
                return Err(EngineError::Config(format!(
                    "max_elapsed_ms must be a positive number, got {max}"
                )));
            }
        }
        if self.max_fires_per_tick == Some(0) {
            return Err(EngineError::Config(
                "max_fires_per_tick must be at least 1".to_string(),
            ));
        }
        if self.level_filter().is_none() {
            return Err(EngineError::Config(format!(
                "unknown log_level {:?}",
                self.log_level
            )));
        }
        Ok(())
    }

    /// Apply the elapsed-time clamp
    pub fn clamp_elapsed(&self, elapsed: f64) -> f64 {
        let elapsed = elapsed.max(0.0);
        match self.max_elapsed_ms {
            Some(max) => elapsed.min(max),
            None => elapsed,
        }
    }

    pub fn level_filter(&self) -> Option<log::LevelFilter> {
        self.log_level.parse().ok()
    }

    /// Load config from LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn load() -> Self {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            if let Ok(Some(json)) = storage.get_item(Self::STORAGE_KEY) {
                match Self::from_json(&json) {
                    Ok(config) => {
                        log::info!("Loaded engine config from LocalStorage");
                        return config;
                    }
                    Err(err) => log::warn!("Ignoring stored config: {err}"),
                }
            }
        }

        log::info!("Using default engine config");
        Self::default()
    }

    /// Save config to LocalStorage (WASM only)
    #[cfg(target_arch = "wasm32")]
    pub fn save(&self) {
        let storage = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten();

        if let Some(storage) = storage {
            if let Ok(json) = serde_json::to_string(self) {
                let _ = storage.set_item(Self::STORAGE_KEY, &json);
                log::info!("Engine config saved");
            }
        }
    }

    /// Load config from the file named by `ARCADE_ENGINE_CONFIG`
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load() -> Self {
        let Ok(path) = std::env::var(Self::CONFIG_ENV) else {
            log::info!("Using default engine config");
            return Self::default();
        };
        match std::fs::read_to_string(&path) {
            Ok(json) => match Self::from_json(&json) {
                Ok(config) => {
                    log::info!("Loaded engine config from {path}");
                    config
                }
                Err(err) => {
                    log::warn!("Ignoring config {path}: {err}");
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!("Cannot read config {path}: {err}");
                Self::default()
            }
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn save(&self) {
        // Native config is read-only
    }
}
