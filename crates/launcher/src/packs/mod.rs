mod installer;
mod resolver;
mod types;

pub use installer::{
    install, sweep_symlinks, BatchScriptElevator, DeployDirs, ElevationError, Elevator,
    InstallReport, LinkRequest, NoElevation,
};
pub use resolver::{parse_manifest, resolve_packs, ManifestError, MANIFEST_FILE_NAME};
pub use types::{PackCapability, PackDescriptor, PackSet, PackVersion};
