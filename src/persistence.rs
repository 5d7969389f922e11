//! Persistence capability for phrases and volume.
//!
//! Best-effort by contract: callers log failures and carry on with the
//! in-memory state, which stays authoritative for the running process.

use crate::error::{BroadcastError, Result};
use crate::phrase::Phrase;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

const STATE_FILE: &str = "morsecast_state.json";

/// Master volume, 0–100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct Volume(u8);

impl Volume {
    pub const MAX: Volume = Volume(100);
    pub const MUTED: Volume = Volume(0);

    /// Clamp into 0–100.
    pub fn new(value: u8) -> Self {
        Volume(value.min(100))
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// Linear gain for the master bus.
    pub fn gain(&self) -> f32 {
        self.0 as f32 / 100.0
    }
}

impl From<u8> for Volume {
    fn from(value: u8) -> Self {
        Volume::new(value)
    }
}

impl From<Volume> for u8 {
    fn from(volume: Volume) -> Self {
        volume.0
    }
}

impl Default for Volume {
    fn default() -> Self {
        Volume(50)
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Load/save contract for the phrase list and volume.
pub trait Persistence {
    fn load_phrases(&self) -> Result<Vec<Phrase>>;
    fn save_phrases(&mut self, phrases: &[Phrase]) -> Result<()>;
    /// `None` when no volume was ever saved.
    fn load_volume(&self) -> Result<Option<Volume>>;
    fn save_volume(&mut self, volume: Volume) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredState {
    #[serde(default)]
    phrases: Vec<Phrase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    volume: Option<Volume>,
}

/// Single JSON state file in a data directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Store inside `dir`, using the default file name.
    pub fn in_dir(dir: &Path) -> Self {
        JsonFileStore {
            path: dir.join(STATE_FILE),
        }
    }

    /// Platform data directory for morsecast, falling back to the working directory.
    pub fn default_dir() -> PathBuf {
        match dirs::data_dir() {
            Some(dir) => dir.join("morsecast"),
            None => PathBuf::from("."),
        }
    }

    pub fn default_location() -> Self {
        Self::in_dir(&Self::default_dir())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file reads as empty; a corrupt file is logged and reads as empty.
    fn read_state(&self) -> Result<StoredState> {
        if !self.path.exists() {
            return Ok(StoredState::default());
        }
        let data = fs::read_to_string(&self.path).map_err(|e| {
            BroadcastError::Persistence(format!("Cannot read '{}': {}", self.path.display(), e))
        })?;
        match serde_json::from_str(&data) {
            Ok(state) => Ok(state),
            Err(e) => {
                warn!(path = %self.path.display(), "corrupt state file, starting fresh: {}", e);
                Ok(StoredState::default())
            }
        }
    }

    fn write_state(&self, state: &StoredState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                BroadcastError::Persistence(format!("Cannot create '{}': {}", parent.display(), e))
            })?;
        }
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| BroadcastError::Persistence(format!("Serialize error: {}", e)))?;
        fs::write(&self.path, json).map_err(|e| {
            BroadcastError::Persistence(format!("Cannot write '{}': {}", self.path.display(), e))
        })
    }
}

impl Persistence for JsonFileStore {
    fn load_phrases(&self) -> Result<Vec<Phrase>> {
        Ok(self.read_state()?.phrases)
    }

    fn save_phrases(&mut self, phrases: &[Phrase]) -> Result<()> {
        let mut state = self.read_state()?;
        state.phrases = phrases.to_vec();
        self.write_state(&state)
    }

    fn load_volume(&self) -> Result<Option<Volume>> {
        Ok(self.read_state()?.volume)
    }

    fn save_volume(&mut self, volume: Volume) -> Result<()> {
        let mut state = self.read_state()?;
        state.volume = Some(volume);
        self.write_state(&state)
    }
}

/// In-memory persistence for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    pub phrases: Vec<Phrase>,
    pub volume: Option<Volume>,
    /// When set, every save fails with this message.
    pub fail_saves: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for MemoryStore {
    fn load_phrases(&self) -> Result<Vec<Phrase>> {
        Ok(self.phrases.clone())
    }

    fn save_phrases(&mut self, phrases: &[Phrase]) -> Result<()> {
        if let Some(msg) = &self.fail_saves {
            return Err(BroadcastError::Persistence(msg.clone()));
        }
        self.phrases = phrases.to_vec();
        Ok(())
    }

    fn load_volume(&self) -> Result<Option<Volume>> {
        Ok(self.volume)
    }

    fn save_volume(&mut self, volume: Volume) -> Result<()> {
        if let Some(msg) = &self.fail_saves {
            return Err(BroadcastError::Persistence(msg.clone()));
        }
        self.volume = Some(volume);
        Ok(())
    }
}
