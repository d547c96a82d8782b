use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logview::Verbosity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    Survival,
    Creative,
}

impl GameMode {
    /// Wire code in the world save: 0 survival, 1 creative.
    pub fn code(self) -> i32 {
        match self {
            GameMode::Survival => 0,
            GameMode::Creative => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelType {
    Default,
    Flat,
}

impl LevelType {
    /// Wire code in the world save: 1 default, 2 flat.
    pub fn code(self) -> i32 {
        match self {
            LevelType::Default => 1,
            LevelType::Flat => 2,
        }
    }
}

/// One saved run configuration. Read-only to the launch pipeline; the
/// host that persists it owns mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    pub executable: PathBuf,
    pub verbosity: Verbosity,
    pub extra_pack_dirs: Vec<PathBuf>,
    pub world_folder: String,
    pub seed: i64,
    pub user_name: String,
    pub game_mode: GameMode,
    pub level_type: LevelType,
    pub cheats_enabled: bool,
    pub keep_inventory: bool,
    pub daylight_cycle: bool,
    pub weather_cycle: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            executable: PathBuf::new(),
            verbosity: Verbosity::Normal,
            extra_pack_dirs: Vec::new(),
            world_folder: Uuid::new_v4().to_string(),
            seed: random_seed(),
            user_name: "DevOps".to_string(),
            game_mode: GameMode::Creative,
            level_type: LevelType::Default,
            cheats_enabled: true,
            keep_inventory: false,
            daylight_cycle: true,
            weather_cycle: true,
        }
    }
}

/// Fresh worlds get a random seed; a v4 uuid is already a source of
/// random bytes, so no extra dependency is needed for one i64.
fn random_seed() -> i64 {
    let bytes = *Uuid::new_v4().as_bytes();
    i64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}
