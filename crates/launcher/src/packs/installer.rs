use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::types::{PackCapability, PackSet};

/// Deployment directories the engine scans for installed packs, one per
/// capability.
#[derive(Debug, Clone)]
pub struct DeployDirs {
    pub behavior: PathBuf,
    pub resource: PathBuf,
}

impl DeployDirs {
    pub fn for_capability(&self, capability: PackCapability) -> &Path {
        match capability {
            PackCapability::Behavior => &self.behavior,
            PackCapability::Resource => &self.resource,
        }
    }
}

/// One symbolic link the elevation helper is asked to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRequest {
    pub target: PathBuf,
    pub link: PathBuf,
}

#[derive(Debug, Error)]
pub enum ElevationError {
    #[error("elevation is not supported on this platform")]
    Unsupported,
    #[error("failed to stage the elevation script: {0}")]
    Stage(#[source] io::Error),
    #[error("failed to run the elevation prompt: {0}")]
    Spawn(#[source] io::Error),
    #[error("elevated link creation exited with status {status}: {stderr}")]
    Failed { status: i32, stderr: String },
}

/// Privileged link creation, injected so launches can run without it
/// and tests can observe the batching contract. Called at most once per
/// launch, with every pending link in one batch.
pub trait Elevator {
    fn create_links(&self, requests: &[LinkRequest]) -> Result<(), ElevationError>;
}

/// Elevator that refuses; pending links are simply dropped. Used where
/// no platform prompt exists.
#[derive(Debug, Default)]
pub struct NoElevation;

impl Elevator for NoElevation {
    fn create_links(&self, _requests: &[LinkRequest]) -> Result<(), ElevationError> {
        Err(ElevationError::Unsupported)
    }
}

/// Writes the pending links into a one-shot batch script and runs it
/// through the Windows consent prompt. `mklink` needs a shell, and one
/// script keeps it to a single prompt for the whole launch.
#[derive(Debug, Default)]
pub struct BatchScriptElevator;

impl Elevator for BatchScriptElevator {
    #[cfg(windows)]
    fn create_links(&self, requests: &[LinkRequest]) -> Result<(), ElevationError> {
        use std::process::Command;

        let mut script = String::from("@echo off\r\n");
        for request in requests {
            script.push_str(&format!(
                "mklink /D \"{}\" \"{}\"\r\n",
                request.link.display(),
                request.target.display()
            ));
        }
        let script_path = std::env::temp_dir().join(format!(
            "devlaunch-links-{}.bat",
            std::process::id()
        ));
        fs::write(&script_path, script).map_err(ElevationError::Stage)?;

        let command = format!(
            "exit (Start-Process -FilePath '{}' -Verb RunAs -Wait -PassThru).ExitCode",
            script_path.display()
        );
        let output = Command::new("powershell")
            .args(["-NoProfile", "-Command", &command])
            .output()
            .map_err(ElevationError::Spawn)?;
        let _ = fs::remove_file(&script_path);

        if output.status.success() {
            Ok(())
        } else {
            Err(ElevationError::Failed {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }

    #[cfg(not(windows))]
    fn create_links(&self, _requests: &[LinkRequest]) -> Result<(), ElevationError> {
        Err(ElevationError::Unsupported)
    }
}

#[derive(Debug, Default)]
pub struct InstallReport {
    pub installed: usize,
    pub skipped: usize,
    pub pending_elevated: Vec<LinkRequest>,
    pub elevation_error: Option<ElevationError>,
}

/// Removes every symlink child of `dir`, leaving non-links alone. A
/// missing directory is a no-op; not every player has both deployment
/// directories pre-created.
pub fn sweep_symlinks(dir: &Path) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(ref e) if e.kind() == io::ErrorKind::NotFound => return,
        Err(error) => {
            warn!(path = %dir.display(), error = %error, "cannot sweep deployment directory");
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(meta) = fs::symlink_metadata(&path) else {
            continue;
        };
        if meta.file_type().is_symlink() {
            remove_symlink(&path);
        }
    }
}

/// Reconciles the resolved descriptor set against the deployment
/// directories: sweep first, then recreate the desired links, then one
/// batched elevation call for everything that hit a permission wall.
pub fn install(packs: &PackSet, dirs: &DeployDirs, elevator: &dyn Elevator) -> InstallReport {
    install_with_linker(packs, dirs, elevator, &platform_symlink)
}

pub(crate) fn install_with_linker(
    packs: &PackSet,
    dirs: &DeployDirs,
    elevator: &dyn Elevator,
    linker: &dyn Fn(&Path, &Path) -> io::Result<()>,
) -> InstallReport {
    sweep_symlinks(&dirs.behavior);
    sweep_symlinks(&dirs.resource);

    let mut report = InstallReport::default();
    for descriptor in packs.iter() {
        let deploy_dir = dirs.for_capability(descriptor.capability);
        if !deploy_dir.is_dir() {
            debug!(
                capability = %descriptor.capability,
                path = %deploy_dir.display(),
                "deployment directory absent; pack not installed"
            );
            report.skipped += 1;
            continue;
        }
        let link = deploy_dir.join(descriptor.id.to_string());
        match place_link(&descriptor.source_dir, &link, linker) {
            LinkOutcome::Linked | LinkOutcome::AlreadyLinked => report.installed += 1,
            LinkOutcome::NeedsElevation => report.pending_elevated.push(LinkRequest {
                target: descriptor.source_dir.clone(),
                link,
            }),
            LinkOutcome::Skipped => report.skipped += 1,
        }
    }

    if !report.pending_elevated.is_empty() {
        info!(
            count = report.pending_elevated.len(),
            "requesting one elevation batch for pending links"
        );
        match elevator.create_links(&report.pending_elevated) {
            Ok(()) => report.installed += report.pending_elevated.len(),
            Err(elevation_error) => {
                // Non-fatal: the launch proceeds with whatever got linked.
                error!(error = %elevation_error, "batched elevation failed");
                report.elevation_error = Some(elevation_error);
            }
        }
    }
    report
}

enum LinkOutcome {
    Linked,
    AlreadyLinked,
    NeedsElevation,
    Skipped,
}

fn place_link(
    target: &Path,
    link: &Path,
    linker: &dyn Fn(&Path, &Path) -> io::Result<()>,
) -> LinkOutcome {
    // The same id can surface from several resolve calls; a link that
    // already points at the right target counts as installed.
    if let Ok(existing) = fs::read_link(link) {
        if paths_match(&existing, target) {
            return LinkOutcome::AlreadyLinked;
        }
        remove_symlink(link);
    } else if link.exists() {
        warn!(
            link = %link.display(),
            target = %target.display(),
            "deployment entry exists and is not a symlink; pack skipped"
        );
        return LinkOutcome::Skipped;
    }

    match linker(target, link) {
        Ok(()) => LinkOutcome::Linked,
        Err(error) if is_permission_error(&error) => LinkOutcome::NeedsElevation,
        Err(error) => {
            warn!(
                link = %link.display(),
                target = %target.display(),
                error = %error,
                "failed to create pack link; pack skipped"
            );
            LinkOutcome::Skipped
        }
    }
}

fn paths_match(existing: &Path, target: &Path) -> bool {
    if existing == target {
        return true;
    }
    match (fs::canonicalize(existing), fs::canonicalize(target)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn is_permission_error(error: &io::Error) -> bool {
    // 1314 is ERROR_PRIVILEGE_NOT_HELD, what Windows returns for
    // unprivileged mklink.
    error.kind() == io::ErrorKind::PermissionDenied || error.raw_os_error() == Some(1314)
}

fn remove_symlink(path: &Path) {
    // Directory symlinks on Windows are deleted as directories.
    if fs::remove_file(path).is_err() {
        let _ = fs::remove_dir(path);
    }
}

#[cfg(unix)]
fn platform_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn platform_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}
