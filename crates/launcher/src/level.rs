use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::tag::{self, TagCompound, TagError, TagValue};

pub const LEVEL_DAT_FILE_NAME: &str = "level.dat";

/// Storage version written for saves created from the bundled template.
/// Existing saves keep whatever version their header carried.
pub const DEFAULT_FORMAT_VERSION: u32 = 10;

const HEADER_LEN: usize = 8;

/// A parsed world-state file: the 8-byte header plus the root tag.
/// `root_name` is kept so a read-patch-write cycle reproduces the
/// original framing exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldStateDocument {
    pub format_version: u32,
    pub root_name: String,
    pub root: TagCompound,
}

#[derive(Debug, Error)]
pub enum LevelDataError {
    #[error("world save header is truncated ({got} of {HEADER_LEN} bytes)")]
    TruncatedHeader { got: usize },
    #[error("world save root is not a compound tag")]
    MalformedRoot,
    #[error("world save root compound is empty")]
    EmptyRoot,
    #[error("world save payload is malformed: {0}")]
    Tag(#[from] TagError),
    #[error("i/o failure on world save stream: {0}")]
    Stream(#[source] io::Error),
    #[error("failed to read world save {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write world save {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("default world save template missing at {path}")]
    ResourceMissing { path: PathBuf },
    #[error("failed to copy world save template {template} to {target}: {source}")]
    CopyTemplate {
        template: PathBuf,
        target: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Decodes a world-state file. The header's payload-size field is
/// ignored on read; the payload is whatever follows the header.
pub fn parse_world_state(bytes: &[u8]) -> Result<WorldStateDocument, LevelDataError> {
    if bytes.len() < HEADER_LEN {
        return Err(LevelDataError::TruncatedHeader { got: bytes.len() });
    }
    let format_version = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let (root_name, value) = tag::decode_named(&bytes[HEADER_LEN..])?;
    let TagValue::Compound(root) = value else {
        return Err(LevelDataError::MalformedRoot);
    };
    if root.is_empty() {
        return Err(LevelDataError::EmptyRoot);
    }
    Ok(WorldStateDocument {
        format_version,
        root_name,
        root,
    })
}

pub fn read_world_state<R: Read>(reader: &mut R) -> Result<WorldStateDocument, LevelDataError> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(LevelDataError::Stream)?;
    parse_world_state(&bytes)
}

/// Encodes the payload into a buffer first to learn its length, then
/// writes header, payload, and flushes. The size field must precede the
/// payload but is only known after encoding.
pub fn write_world_state<W: Write>(
    writer: &mut W,
    doc: &WorldStateDocument,
) -> Result<(), LevelDataError> {
    let mut payload = Vec::new();
    tag::encode_named_compound(&doc.root_name, &doc.root, &mut payload)?;

    writer
        .write_all(&doc.format_version.to_le_bytes())
        .map_err(LevelDataError::Stream)?;
    writer
        .write_all(&(payload.len() as u32).to_le_bytes())
        .map_err(LevelDataError::Stream)?;
    writer.write_all(&payload).map_err(LevelDataError::Stream)?;
    writer.flush().map_err(LevelDataError::Stream)
}

pub fn load_world_state(path: &Path) -> Result<WorldStateDocument, LevelDataError> {
    let bytes = fs::read(path).map_err(|source| LevelDataError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    parse_world_state(&bytes)
}

pub fn store_world_state(path: &Path, doc: &WorldStateDocument) -> Result<(), LevelDataError> {
    let mut bytes = Vec::new();
    write_world_state(&mut bytes, doc)?;
    fs::write(path, bytes).map_err(|source| LevelDataError::WriteFile {
        path: path.to_path_buf(),
        source,
    })
}

/// The fixed field set overwritten on every launch. Everything else in
/// the root compound passes through untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldPatch {
    pub last_played: i64,
    pub level_name: String,
    pub seed: i64,
    pub game_type: i32,
    pub generator: i32,
    pub cheats_enabled: bool,
    pub keep_inventory: bool,
    pub daylight_cycle: bool,
    pub weather_cycle: bool,
}

pub fn patch_fields(root: &TagCompound, patch: &WorldPatch) -> TagCompound {
    let mut patched = root.clone();
    patched.put("LastPlayed", TagValue::Long(patch.last_played));
    patched.put("LevelName", TagValue::String(patch.level_name.clone()));
    patched.put("RandomSeed", TagValue::Long(patch.seed));
    patched.put("GameType", TagValue::Int(patch.game_type));
    patched.put("Generator", TagValue::Int(patch.generator));
    patched.put_bool("cheatsEnabled", patch.cheats_enabled);
    patched.put_bool("keepInventory", patch.keep_inventory);
    patched.put_bool("dodaylightcycle", patch.daylight_cycle);
    patched.put_bool("doweathercycle", patch.weather_cycle);
    patched
}

/// Copies the bundled template save verbatim into the world folder.
pub fn create_default_world_state(
    template: &Path,
    world_dir: &Path,
) -> Result<PathBuf, LevelDataError> {
    if !template.is_file() {
        return Err(LevelDataError::ResourceMissing {
            path: template.to_path_buf(),
        });
    }
    let target = world_dir.join(LEVEL_DAT_FILE_NAME);
    fs::copy(template, &target).map_err(|source| LevelDataError::CopyTemplate {
        template: template.to_path_buf(),
        target: target.clone(),
        source,
    })?;
    debug!(target = %target.display(), "created default world save from template");
    Ok(target)
}
