use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::types::{PackCapability, PackDescriptor, PackSet, PackVersion};

pub const MANIFEST_FILE_NAME: &str = "manifest.json";

const DATA_MODULE_TYPE: &str = "data";
const RESOURCES_MODULE_TYPE: &str = "resources";

/// Directories deeper than this below a candidate root are not scanned.
const MAX_SCAN_DEPTH: u32 = 2;

#[derive(Debug, Deserialize)]
struct ManifestDoc {
    header: ManifestHeader,
    #[serde(default)]
    modules: Vec<ManifestModule>,
}

#[derive(Debug, Deserialize)]
struct ManifestHeader {
    uuid: Uuid,
    version: [u32; 3],
}

#[derive(Debug, Deserialize)]
struct ManifestModule {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("manifest {path} is not valid: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Scans `root` and its children (depth <= 2) for directories holding a
/// `manifest.json`, merging the descriptors into `set`. Malformed
/// manifests are skipped; a broken pack must never block the others.
pub fn resolve_packs(root: &Path, set: &mut PackSet) {
    scan_dir(root, 0, set);
}

fn scan_dir(dir: &Path, depth: u32, set: &mut PackSet) {
    if !dir.is_dir() {
        return;
    }

    let manifest = dir.join(MANIFEST_FILE_NAME);
    if manifest.is_file() {
        match parse_manifest(&manifest) {
            Ok(descriptors) => {
                for descriptor in descriptors {
                    debug!(
                        capability = %descriptor.capability,
                        id = %descriptor.id,
                        path = %descriptor.source_dir.display(),
                        "resolved pack"
                    );
                    set.push(descriptor);
                }
            }
            Err(error) => {
                debug!(error = %error, "skipping unparseable manifest");
            }
        }
    }

    if depth >= MAX_SCAN_DEPTH {
        return;
    }
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(error) => {
            debug!(path = %dir.display(), error = %error, "cannot list candidate root");
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            scan_dir(&path, depth + 1, set);
        }
    }
}

/// Parses one manifest into zero, one, or two descriptors. A "data"
/// module yields Behavior, a "resources" module yields Resource;
/// repeated same-type entries are not deduplicated here.
pub fn parse_manifest(path: &Path) -> Result<Vec<PackDescriptor>, ManifestError> {
    let raw = fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let doc: ManifestDoc =
        serde_json::from_str(&raw).map_err(|error| ManifestError::Parse {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?;

    let source_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let mut descriptors = Vec::new();
    for module in &doc.modules {
        let capability = match module.kind.as_str() {
            DATA_MODULE_TYPE => PackCapability::Behavior,
            RESOURCES_MODULE_TYPE => PackCapability::Resource,
            _ => continue,
        };
        descriptors.push(PackDescriptor {
            capability,
            id: doc.header.uuid,
            version: PackVersion(doc.header.version),
            source_dir: source_dir.clone(),
        });
    }
    Ok(descriptors)
}
