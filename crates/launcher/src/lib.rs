use std::env;
use std::path::PathBuf;

use thiserror::Error;

mod atomic_io;
pub mod level;
pub mod logview;
pub mod options;
pub mod packs;
pub mod run;
pub mod tag;

pub use level::{
    create_default_world_state, load_world_state, parse_world_state, patch_fields,
    read_world_state, store_world_state, write_world_state, LevelDataError, WorldPatch,
    WorldStateDocument, DEFAULT_FORMAT_VERSION, LEVEL_DAT_FILE_NAME,
};
pub use logview::{
    classify, Channel, ChannelMap, LogColor, LogRouter, LogSink, StyledLine, Verbosity,
};
pub use options::{GameMode, LevelType, RunOptions};
pub use packs::{
    install, parse_manifest, resolve_packs, sweep_symlinks, BatchScriptElevator, DeployDirs,
    ElevationError, Elevator, InstallReport, LinkRequest, ManifestError, NoElevation,
    PackCapability, PackDescriptor, PackSet, PackVersion, MANIFEST_FILE_NAME,
};
pub use run::{
    prepare_launch, LaunchAssets, LaunchCommand, LaunchError, PackManifestEntry,
    BEHAVIOR_MANIFEST_FILE_NAME, DEBUG_OPTIONS_ENV_VAR, LAUNCH_CONFIG_FILE_NAME,
    RESOURCE_MANIFEST_FILE_NAME, TEST_PACK_DIR_NAME, WATCH_DIRS_ENV_VAR,
};

pub const GAME_ROOT_ENV_VAR: &str = "DEVLAUNCH_GAME_ROOT";

/// The three game directories every launch touches: two pack
/// deployment directories and the world saves.
#[derive(Debug, Clone)]
pub struct GameDirs {
    pub behavior_packs: PathBuf,
    pub resource_packs: PathBuf,
    pub worlds: PathBuf,
}

impl GameDirs {
    /// Standard layout under the game's data root.
    pub fn under_root(root: &std::path::Path) -> Self {
        let packs_root = root.join("games").join("com.netease");
        GameDirs {
            behavior_packs: packs_root.join("behavior_packs"),
            resource_packs: packs_root.join("resource_packs"),
            worlds: root.join("minecraftWorlds"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error(
        "Could not locate the game data root.\n\
Set {env_var} to the directory that contains games/ and minecraftWorlds/, for example:\n\
PowerShell: $env:{env_var}=\"C:\\Users\\you\\AppData\\Roaming\\MinecraftPE_Netease\"\n\
Bash/zsh: export {env_var}=\"/path/to/MinecraftPE_Netease\""
    )]
    GameRootNotFound { env_var: &'static str },
}

/// Resolves the game data root: the env override first, then the
/// per-user application data directory on Windows.
pub fn resolve_game_dirs() -> Result<GameDirs, StartupError> {
    match env::var(GAME_ROOT_ENV_VAR) {
        Ok(value) => Ok(GameDirs::under_root(&PathBuf::from(value))),
        Err(env::VarError::NotPresent) => default_game_root()
            .map(|root| GameDirs::under_root(&root))
            .ok_or(StartupError::GameRootNotFound {
                env_var: GAME_ROOT_ENV_VAR,
            }),
        Err(source) => Err(StartupError::EnvVar {
            var: GAME_ROOT_ENV_VAR,
            source,
        }),
    }
}

#[cfg(windows)]
fn default_game_root() -> Option<PathBuf> {
    env::var_os("APPDATA").map(|appdata| PathBuf::from(appdata).join("MinecraftPE_Netease"))
}

#[cfg(not(windows))]
fn default_game_root() -> Option<PathBuf> {
    None
}
