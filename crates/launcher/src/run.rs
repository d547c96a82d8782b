use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::atomic_io::write_text_atomic;
use crate::level::{self, LevelDataError, WorldPatch};
use crate::options::RunOptions;
use crate::packs::{self, DeployDirs, Elevator, InstallReport, PackCapability, PackSet, PackVersion};
use crate::GameDirs;

/// Fixed directory id under which the bundled test pack is deployed.
/// The engine treats it like any other behavior pack.
pub const TEST_PACK_DIR_NAME: &str = "183b0dc7-ae4a-48fb-800d-9d68f7162e7e";

pub const BEHAVIOR_MANIFEST_FILE_NAME: &str = "world_behavior_packs.json";
pub const RESOURCE_MANIFEST_FILE_NAME: &str = "world_resource_packs.json";
pub const LAUNCH_CONFIG_FILE_NAME: &str = "launch_config.cppconfig";

/// JSON object with the debug key bindings, read by the test pack.
pub const DEBUG_OPTIONS_ENV_VAR: &str = "DEVLAUNCH_DEBUG_OPTIONS";
/// JSON array of directories the hot-reload watcher follows.
pub const WATCH_DIRS_ENV_VAR: &str = "DEVLAUNCH_WATCH_DIRS";

/// One entry of the world pack-manifest files the engine consumes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackManifestEntry {
    pub pack_id: Uuid,
    pub version: PackVersion,
}

/// Everything needed to spawn the game. The launcher never spawns it
/// itself; the host decides how and when.
#[derive(Debug, Clone)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub world_dir: PathBuf,
}

/// Bundled files shipped next to the launcher binary.
#[derive(Debug, Clone)]
pub struct LaunchAssets {
    pub level_template: PathBuf,
    pub test_pack_dir: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("game executable path is not a runnable file: {path}")]
    BadExecutable { path: PathBuf },
    #[error("project path is not a directory: {path}")]
    BadProjectDir { path: PathBuf },
    #[error("failed to create world folder {path}: {source}")]
    CreateWorldDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Level(#[from] LevelDataError),
    #[error("failed to write {path}: {source}")]
    WriteOutput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode {what}: {source}")]
    EncodeJson {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to copy bundled test pack into {target}: {source}")]
    CopyTestPack {
        target: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Runs the whole launch preparation: validation, pack install, world
/// save patch, manifest and config outputs. Fatal failures abort with
/// nothing rolled back; the next launch's sweep cleans up.
pub fn prepare_launch(
    project_dir: &Path,
    options: &RunOptions,
    dirs: &GameDirs,
    assets: &LaunchAssets,
    elevator: &dyn Elevator,
) -> Result<LaunchCommand, LaunchError> {
    validate_executable(&options.executable)?;
    let project_dir = normalize_project_dir(project_dir)?;

    let mut pack_set = PackSet::default();
    packs::resolve_packs(&project_dir, &mut pack_set);
    for extra in &options.extra_pack_dirs {
        packs::resolve_packs(extra, &mut pack_set);
    }

    let deploy_dirs = DeployDirs {
        behavior: dirs.behavior_packs.clone(),
        resource: dirs.resource_packs.clone(),
    };
    let report = packs::install(&pack_set, &deploy_dirs, elevator);
    log_install_report(&report);

    if let Some(test_pack) = deployed_test_pack(assets, &deploy_dirs)? {
        packs::resolve_packs(&test_pack, &mut pack_set);
    }

    let world_dir = dirs.worlds.join(&options.world_folder);
    fs::create_dir_all(&world_dir).map_err(|source| LaunchError::CreateWorldDir {
        path: world_dir.clone(),
        source,
    })?;
    patch_world_save(&project_dir, options, assets, &world_dir)?;
    write_pack_manifests(&pack_set, &world_dir)?;
    let launch_config_path = write_launch_config(options, &world_dir)?;

    Ok(LaunchCommand {
        program: options.executable.clone(),
        args: vec![format!("config={}", launch_config_path.display())],
        env: build_env(&project_dir)?,
        world_dir,
    })
}

fn validate_executable(path: &Path) -> Result<(), LaunchError> {
    let mut ok = path.is_file();
    #[cfg(windows)]
    {
        ok = ok && path.extension().map_or(false, |ext| ext == "exe");
    }
    if ok {
        Ok(())
    } else {
        Err(LaunchError::BadExecutable {
            path: path.to_path_buf(),
        })
    }
}

fn normalize_project_dir(project_dir: &Path) -> Result<PathBuf, LaunchError> {
    if !project_dir.is_dir() {
        return Err(LaunchError::BadProjectDir {
            path: project_dir.to_path_buf(),
        });
    }
    Ok(fs::canonicalize(project_dir).unwrap_or_else(|_| project_dir.to_path_buf()))
}

fn log_install_report(report: &InstallReport) {
    info!(
        installed = report.installed,
        skipped = report.skipped,
        elevated = report.pending_elevated.len(),
        "pack installation finished"
    );
}

/// Copies the bundled test pack into the behavior deployment directory
/// (overwriting a previous copy) and returns its path. Missing bundle
/// or deployment directory means no test pack this launch.
fn deployed_test_pack(
    assets: &LaunchAssets,
    deploy_dirs: &DeployDirs,
) -> Result<Option<PathBuf>, LaunchError> {
    let Some(source) = assets.test_pack_dir.as_deref() else {
        return Ok(None);
    };
    if !source.is_dir() || !deploy_dirs.behavior.is_dir() {
        debug!("bundled test pack not deployed");
        return Ok(None);
    }
    let target = deploy_dirs.behavior.join(TEST_PACK_DIR_NAME);
    copy_dir_recursive(source, &target).map_err(|source| LaunchError::CopyTestPack {
        target: target.clone(),
        source,
    })?;
    Ok(Some(target))
}

fn copy_dir_recursive(source: &Path, target: &Path) -> io::Result<()> {
    fs::create_dir_all(target)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let from = entry.path();
        let to = target.join(entry.file_name());
        if from.is_dir() {
            copy_dir_recursive(&from, &to)?;
        } else {
            fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

/// Creates the save from the template when absent, then rewrites the
/// fixed field set from the run options. Everything else in the save
/// passes through untouched.
fn patch_world_save(
    project_dir: &Path,
    options: &RunOptions,
    assets: &LaunchAssets,
    world_dir: &Path,
) -> Result<(), LaunchError> {
    let level_path = world_dir.join(level::LEVEL_DAT_FILE_NAME);
    if !level_path.is_file() {
        level::create_default_world_state(&assets.level_template, world_dir)?;
    }

    let mut doc = level::load_world_state(&level_path)?;
    let patch = WorldPatch {
        last_played: Utc::now().timestamp(),
        level_name: project_display_name(project_dir),
        seed: options.seed,
        game_type: options.game_mode.code(),
        generator: options.level_type.code(),
        cheats_enabled: options.cheats_enabled,
        keep_inventory: options.keep_inventory,
        daylight_cycle: options.daylight_cycle,
        weather_cycle: options.weather_cycle,
    };
    doc.root = level::patch_fields(&doc.root, &patch);
    level::store_world_state(&level_path, &doc)?;
    Ok(())
}

fn project_display_name(project_dir: &Path) -> String {
    project_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dev_world".to_string())
}

fn write_pack_manifests(pack_set: &PackSet, world_dir: &Path) -> Result<(), LaunchError> {
    for (capability, file_name) in [
        (PackCapability::Behavior, BEHAVIOR_MANIFEST_FILE_NAME),
        (PackCapability::Resource, RESOURCE_MANIFEST_FILE_NAME),
    ] {
        let entries: Vec<PackManifestEntry> = pack_set
            .of(capability)
            .iter()
            .map(|descriptor| PackManifestEntry {
                pack_id: descriptor.id,
                version: descriptor.version,
            })
            .collect();
        let text = serde_json::to_string(&entries).map_err(|source| LaunchError::EncodeJson {
            what: "world pack manifest",
            source,
        })?;
        let path = world_dir.join(file_name);
        write_text_atomic(&path, &text).map_err(|source| LaunchError::WriteOutput {
            path,
            source,
        })?;
    }
    Ok(())
}

fn write_launch_config(options: &RunOptions, world_dir: &Path) -> Result<PathBuf, LaunchError> {
    let skin_path = options
        .executable
        .parent()
        .map(|dir| dir.join("data").join("skin_packs").join("vanilla").join("steve.png"))
        .unwrap_or_default();
    let config = json!({
        "world_info": {
            "level_id": world_dir.file_name().map(|n| n.to_string_lossy().into_owned()),
        },
        "room_info": {},
        "player_info": {
            "urs": "",
            "user_id": 0,
            "user_name": options.user_name,
        },
        "skin_info": {
            "slim": false,
            "skin": skin_path.to_string_lossy(),
        },
    });
    let text = serde_json::to_string(&config).map_err(|source| LaunchError::EncodeJson {
        what: "launch config",
        source,
    })?;
    let path = world_dir.join(LAUNCH_CONFIG_FILE_NAME);
    write_text_atomic(&path, &text).map_err(|source| LaunchError::WriteOutput {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

fn build_env(project_dir: &Path) -> Result<Vec<(String, String)>, LaunchError> {
    // Key codes follow the engine's keyboard enumeration: R reloads
    // scripts, numpad 0 reloads the world.
    let debug_options = json!({
        "reload_key": 82,
        "reload_world_key": 96,
        "reload_addon_key": "",
        "reload_shaders_key": "",
        "reload_key_global": false,
    });
    let watch_dirs = json!([forward_slashes(project_dir)]);
    let encode = |what, value: &serde_json::Value| {
        serde_json::to_string(value).map_err(|source| LaunchError::EncodeJson { what, source })
    };
    Ok(vec![
        (
            DEBUG_OPTIONS_ENV_VAR.to_string(),
            encode("debug options", &debug_options)?,
        ),
        (
            WATCH_DIRS_ENV_VAR.to_string(),
            encode("watch directories", &watch_dirs)?,
        ),
    ])
}

/// The hot-reload watcher expects forward slashes regardless of host.
fn forward_slashes(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(all(test, unix))]
mod tests {
    use tempfile::TempDir;

    use crate::level::{DEFAULT_FORMAT_VERSION, WorldStateDocument};
    use crate::packs::{NoElevation, MANIFEST_FILE_NAME};
    use crate::tag::{TagCompound, TagValue};

    use super::*;

    const PROJECT_PACK_UUID: &str = "aaaaaaaa-1111-4111-8111-aaaaaaaaaaaa";
    const TEST_PACK_UUID: &str = "bbbbbbbb-2222-4222-8222-bbbbbbbbbbbb";

    struct Fixture {
        _temp: TempDir,
        project_dir: PathBuf,
        options: RunOptions,
        dirs: GameDirs,
        assets: LaunchAssets,
    }

    fn manifest_body(uuid: &str, modules: &str) -> String {
        format!(
            r#"{{"header": {{"uuid": "{uuid}", "version": [1, 0, 0]}}, "modules": {modules}}}"#
        )
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().expect("tempdir");
        let root = temp.path();

        let project_dir = root.join("my_addon");
        fs::create_dir_all(&project_dir).expect("project dir");
        fs::write(
            project_dir.join(MANIFEST_FILE_NAME),
            manifest_body(
                PROJECT_PACK_UUID,
                r#"[{"type": "data"}, {"type": "resources"}]"#,
            ),
        )
        .expect("project manifest");

        let dirs = GameDirs {
            behavior_packs: root.join("behavior_packs"),
            resource_packs: root.join("resource_packs"),
            worlds: root.join("worlds"),
        };
        fs::create_dir_all(&dirs.behavior_packs).expect("behavior dir");
        fs::create_dir_all(&dirs.resource_packs).expect("resource dir");
        fs::create_dir_all(&dirs.worlds).expect("worlds dir");

        let executable = root.join("game").join("engine_client");
        fs::create_dir_all(executable.parent().expect("parent")).expect("game dir");
        fs::write(&executable, "").expect("executable");

        // Template save with one field the patch never touches.
        let mut template_root = TagCompound::new();
        template_root.put("LevelName", TagValue::String("template".to_string()));
        template_root.put("SpawnX", TagValue::Int(64));
        let template_doc = WorldStateDocument {
            format_version: DEFAULT_FORMAT_VERSION,
            root_name: String::new(),
            root: template_root,
        };
        let level_template = root.join("assets").join("level.dat");
        fs::create_dir_all(level_template.parent().expect("parent")).expect("assets dir");
        let mut bytes = Vec::new();
        crate::level::write_world_state(&mut bytes, &template_doc).expect("template bytes");
        fs::write(&level_template, bytes).expect("template file");

        let test_pack_dir = root.join("assets").join("test_pack");
        fs::create_dir_all(test_pack_dir.join("scripts")).expect("test pack dirs");
        fs::write(
            test_pack_dir.join(MANIFEST_FILE_NAME),
            manifest_body(TEST_PACK_UUID, r#"[{"type": "data"}]"#),
        )
        .expect("test pack manifest");
        fs::write(test_pack_dir.join("scripts").join("main.py"), "# hook").expect("script");

        let options = RunOptions {
            executable,
            world_folder: "dev_world_1".to_string(),
            seed: 99,
            user_name: "Tester".to_string(),
            game_mode: crate::options::GameMode::Survival,
            level_type: crate::options::LevelType::Flat,
            cheats_enabled: false,
            ..RunOptions::default()
        };

        Fixture {
            _temp: temp,
            project_dir,
            options,
            dirs,
            assets: LaunchAssets {
                level_template,
                test_pack_dir: Some(test_pack_dir),
            },
        }
    }

    fn manifest_ids(path: &Path) -> Vec<String> {
        let raw = fs::read_to_string(path).expect("manifest output");
        let entries: Vec<serde_json::Value> = serde_json::from_str(&raw).expect("json array");
        entries
            .iter()
            .map(|entry| entry["pack_id"].as_str().expect("pack_id").to_string())
            .collect()
    }

    #[test]
    fn prepare_launch_builds_the_full_environment() {
        let f = fixture();
        let command =
            prepare_launch(&f.project_dir, &f.options, &f.dirs, &f.assets, &NoElevation)
                .expect("prepare");

        assert_eq!(command.program, f.options.executable);
        assert_eq!(command.args.len(), 1);
        assert!(command.args[0].starts_with("config="));
        assert!(command.args[0].ends_with(LAUNCH_CONFIG_FILE_NAME));

        // Both deployment links exist and point at the project.
        let behavior_link = f.dirs.behavior_packs.join(PROJECT_PACK_UUID);
        let resource_link = f.dirs.resource_packs.join(PROJECT_PACK_UUID);
        assert_eq!(
            fs::canonicalize(fs::read_link(&behavior_link).expect("behavior link")).expect("target"),
            fs::canonicalize(&f.project_dir).expect("project")
        );
        assert!(resource_link.is_symlink());

        // The test pack is a real copy, not a link.
        let deployed = f.dirs.behavior_packs.join(TEST_PACK_DIR_NAME);
        assert!(deployed.join("scripts").join("main.py").is_file());
        assert!(!deployed.is_symlink());

        // World manifests list project packs plus the test pack.
        let behavior_ids = manifest_ids(&command.world_dir.join(BEHAVIOR_MANIFEST_FILE_NAME));
        assert_eq!(behavior_ids, vec![PROJECT_PACK_UUID, TEST_PACK_UUID]);
        let resource_ids = manifest_ids(&command.world_dir.join(RESOURCE_MANIFEST_FILE_NAME));
        assert_eq!(resource_ids, vec![PROJECT_PACK_UUID]);

        // The save was created from the template and patched.
        let doc = crate::level::load_world_state(
            &command.world_dir.join(crate::level::LEVEL_DAT_FILE_NAME),
        )
        .expect("patched save");
        assert_eq!(
            doc.root.get("LevelName"),
            Some(&TagValue::String("my_addon".to_string()))
        );
        assert_eq!(doc.root.get("RandomSeed"), Some(&TagValue::Long(99)));
        assert_eq!(doc.root.get("GameType"), Some(&TagValue::Int(0)));
        assert_eq!(doc.root.get("Generator"), Some(&TagValue::Int(2)));
        assert_eq!(doc.root.get("cheatsEnabled"), Some(&TagValue::Byte(0)));
        assert_eq!(doc.root.get("SpawnX"), Some(&TagValue::Int(64)));

        // Environment carries the key bindings and the watched project.
        assert_eq!(command.env.len(), 2);
        assert_eq!(command.env[0].0, DEBUG_OPTIONS_ENV_VAR);
        let watch: Vec<String> =
            serde_json::from_str(&command.env[1].1).expect("watch dirs json");
        assert_eq!(watch.len(), 1);
        assert!(watch[0].ends_with("my_addon"));
    }

    #[test]
    fn bad_executable_is_fatal_before_any_spawn() {
        let f = fixture();
        let mut options = f.options.clone();
        options.executable = f.project_dir.join("missing_binary");
        let result = prepare_launch(&f.project_dir, &options, &f.dirs, &f.assets, &NoElevation);
        assert!(matches!(result, Err(LaunchError::BadExecutable { .. })));
    }

    #[test]
    fn missing_project_dir_is_fatal() {
        let f = fixture();
        let result = prepare_launch(
            &f.project_dir.join("nope"),
            &f.options,
            &f.dirs,
            &f.assets,
            &NoElevation,
        );
        assert!(matches!(result, Err(LaunchError::BadProjectDir { .. })));
    }

    #[test]
    fn missing_template_is_fatal_when_no_save_exists() {
        let f = fixture();
        let assets = LaunchAssets {
            level_template: f.assets.level_template.with_file_name("gone.dat"),
            test_pack_dir: None,
        };
        let result = prepare_launch(&f.project_dir, &f.options, &f.dirs, &assets, &NoElevation);
        assert!(matches!(
            result,
            Err(LaunchError::Level(LevelDataError::ResourceMissing { .. }))
        ));
    }

    #[test]
    fn existing_save_is_patched_not_replaced() {
        let f = fixture();
        // Seed the world folder with a save carrying a custom field.
        let world_dir = f.dirs.worlds.join(&f.options.world_folder);
        fs::create_dir_all(&world_dir).expect("world dir");
        let mut root = TagCompound::new();
        root.put("LevelName", TagValue::String("old".to_string()));
        root.put("customField", TagValue::Long(1234));
        let doc = WorldStateDocument {
            format_version: 9,
            root_name: String::new(),
            root,
        };
        crate::level::store_world_state(
            &world_dir.join(crate::level::LEVEL_DAT_FILE_NAME),
            &doc,
        )
        .expect("seed save");

        prepare_launch(&f.project_dir, &f.options, &f.dirs, &f.assets, &NoElevation)
            .expect("prepare");

        let patched = crate::level::load_world_state(
            &world_dir.join(crate::level::LEVEL_DAT_FILE_NAME),
        )
        .expect("load");
        assert_eq!(patched.format_version, 9);
        assert_eq!(patched.root.get("customField"), Some(&TagValue::Long(1234)));
        assert_eq!(
            patched.root.get("LevelName"),
            Some(&TagValue::String("my_addon".to_string()))
        );
    }

    #[test]
    fn second_launch_leaves_only_current_links() {
        let f = fixture();
        prepare_launch(&f.project_dir, &f.options, &f.dirs, &f.assets, &NoElevation)
            .expect("first");
        // A stale link from some other project must disappear.
        let stale = f.dirs.behavior_packs.join("cccccccc-3333-4333-8333-cccccccccccc");
        std::os::unix::fs::symlink(&f.project_dir, &stale).expect("stale link");

        prepare_launch(&f.project_dir, &f.options, &f.dirs, &f.assets, &NoElevation)
            .expect("second");
        assert!(!stale.exists());
        assert!(f.dirs.behavior_packs.join(PROJECT_PACK_UUID).is_symlink());
    }
}
