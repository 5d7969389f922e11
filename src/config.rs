use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

fn default_unit_ms() -> u64 {
    200
}

fn default_tone_hz() -> f32 {
    600.0
}

fn default_tone_fade_ms() -> u64 {
    20
}

fn default_tone_volume() -> f32 {
    0.15
}

fn default_loop_pause_ms() -> u64 {
    2000
}

fn default_empty_retry_ms() -> u64 {
    2000
}

fn default_system_phrases() -> Vec<String> {
    vec!["CQ CQ".to_string(), "DE MORSECAST".to_string()]
}

/// Audio channel tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Base timing unit in milliseconds.
    #[serde(default = "default_unit_ms")]
    pub unit_ms: u64,
    #[serde(default = "default_tone_hz")]
    pub tone_hz: f32,
    /// Linear fade in and out applied to every tone.
    #[serde(default = "default_tone_fade_ms")]
    pub tone_fade_ms: u64,
    /// Per-tone level before the master bus (0.0–1.0).
    #[serde(default = "default_tone_volume")]
    pub tone_volume: f32,
    /// Pause between the end of one broadcast and the next.
    #[serde(default = "default_loop_pause_ms")]
    pub loop_pause_ms: u64,
    /// Wait before looking again when there is nothing to play.
    #[serde(default = "default_empty_retry_ms")]
    pub empty_retry_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        AudioConfig {
            unit_ms: default_unit_ms(),
            tone_hz: default_tone_hz(),
            tone_fade_ms: default_tone_fade_ms(),
            tone_volume: default_tone_volume(),
            loop_pause_ms: default_loop_pause_ms(),
            empty_retry_ms: default_empty_retry_ms(),
        }
    }
}

impl AudioConfig {
    pub fn unit(&self) -> Duration {
        Duration::from_millis(self.unit_ms.max(1))
    }

    pub fn tone_fade(&self) -> Duration {
        Duration::from_millis(self.tone_fade_ms)
    }

    pub fn loop_pause(&self) -> Duration {
        Duration::from_millis(self.loop_pause_ms.max(1))
    }

    pub fn empty_retry(&self) -> Duration {
        Duration::from_millis(self.empty_retry_ms.max(1))
    }
}

fn default_line_ms() -> u64 {
    2000
}

fn default_line_jitter_ms() -> u64 {
    15
}

fn default_position_jitter_px() -> f32 {
    0.5
}

fn default_line_height_px() -> f32 {
    24.0
}

fn default_viewport_height_px() -> f32 {
    240.0
}

fn default_columns() -> usize {
    48
}

/// Scroll channel tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrollConfig {
    /// Time per visual line.
    #[serde(default = "default_line_ms")]
    pub line_ms: u64,
    /// Cadence jitter, ± milliseconds.
    #[serde(default = "default_line_jitter_ms")]
    pub line_jitter_ms: u64,
    /// Position jitter, ± pixels.
    #[serde(default = "default_position_jitter_px")]
    pub position_jitter_px: f32,
    #[serde(default = "default_line_height_px")]
    pub line_height_px: f32,
    #[serde(default = "default_viewport_height_px")]
    pub viewport_height_px: f32,
    /// Characters per rendered line.
    #[serde(default = "default_columns")]
    pub columns: usize,
    #[serde(default = "default_empty_retry_ms")]
    pub empty_retry_ms: u64,
    /// Fixed jitter seed for reproducible traces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        ScrollConfig {
            line_ms: default_line_ms(),
            line_jitter_ms: default_line_jitter_ms(),
            position_jitter_px: default_position_jitter_px(),
            line_height_px: default_line_height_px(),
            viewport_height_px: default_viewport_height_px(),
            columns: default_columns(),
            empty_retry_ms: default_empty_retry_ms(),
            seed: None,
        }
    }
}

impl ScrollConfig {
    pub fn line_interval(&self) -> Duration {
        Duration::from_millis(self.line_ms.max(1))
    }

    pub fn empty_retry(&self) -> Duration {
        Duration::from_millis(self.empty_retry_ms.max(1))
    }
}

/// Everything tunable about a broadcast. Missing fields take their defaults,
/// so older config files keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Permanent phrases played ahead of the submitted ones.
    #[serde(default = "default_system_phrases")]
    pub system_phrases: Vec<String>,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub scroll: ScrollConfig,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        BroadcastConfig {
            system_phrases: default_system_phrases(),
            audio: AudioConfig::default(),
            scroll: ScrollConfig::default(),
        }
    }
}

impl BroadcastConfig {
    /// Load from JSON, or fall back to defaults when missing or unreadable.
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(data) => match serde_json::from_str(&data) {
                    Ok(config) => return config,
                    Err(e) => warn!(path = %path.display(), "corrupt config, using defaults: {}", e),
                },
                Err(e) => warn!(path = %path.display(), "could not read config: {}", e),
            }
        }
        BroadcastConfig::default()
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        let json =
            serde_json::to_string_pretty(self).map_err(|e| format!("Serialize error: {}", e))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| format!("Write error: {}", e))?;
        }
        fs::write(path, json).map_err(|e| format!("Write error: {}", e))?;
        Ok(())
    }
}
