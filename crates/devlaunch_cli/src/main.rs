use std::env;
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, ExitCode, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;

use clap::Parser;
use colored::Colorize;
use launcher::{
    prepare_launch, resolve_game_dirs, BatchScriptElevator, Channel, LaunchAssets, LaunchCommand,
    LogColor, LogRouter, LogSink, RunOptions, Verbosity,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Launches a development game instance with the project's packs
/// installed and streams its log output, filtered and colored.
#[derive(Debug, Parser)]
#[command(name = "devlaunch", version)]
struct Cli {
    /// Project directory containing the pack sources.
    project: PathBuf,

    /// JSON file with run options; missing fields take defaults.
    #[arg(long, value_name = "FILE")]
    options: Option<PathBuf>,

    /// Game executable, overriding the options file.
    #[arg(long, value_name = "PATH")]
    executable: Option<PathBuf>,

    /// Show every log line instead of the filtered view.
    #[arg(long, short)]
    verbose: bool,

    /// Additional directories to scan for packs. Repeatable.
    #[arg(long = "include", value_name = "DIR")]
    include_dirs: Vec<PathBuf>,

    /// World save template, overriding the bundled one.
    #[arg(long, value_name = "FILE")]
    level_template: Option<PathBuf>,

    /// Test pack directory, overriding the bundled one.
    #[arg(long, value_name = "DIR")]
    test_pack: Option<PathBuf>,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run_cli(cli) {
        Ok(code) => code,
        Err(message) => {
            error!("{message}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn run_cli(cli: Cli) -> Result<ExitCode, String> {
    let options = load_options(&cli)?;
    let assets = resolve_assets(&cli)?;
    let dirs = resolve_game_dirs().map_err(|err| err.to_string())?;

    let command = prepare_launch(
        &cli.project,
        &options,
        &dirs,
        &assets,
        &BatchScriptElevator,
    )
    .map_err(|err| format!("launch preparation failed: {err}"))?;

    let mut sink = TerminalSink;
    print_banner(&mut sink, &cli, &options, &command);

    run_game(command, LogRouter::new(options.verbosity), sink)
}

fn load_options(cli: &Cli) -> Result<RunOptions, String> {
    let mut options = match &cli.options {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .map_err(|err| format!("failed to read options file {}: {err}", path.display()))?;
            let mut de = serde_json::Deserializer::from_str(&raw);
            serde_path_to_error::deserialize(&mut de)
                .map_err(|err| format!("invalid options file {}: {err}", path.display()))?
        }
        None => RunOptions::default(),
    };
    if let Some(executable) = &cli.executable {
        options.executable = executable.clone();
    }
    if cli.verbose {
        options.verbosity = Verbosity::Verbose;
    }
    options.extra_pack_dirs.extend(cli.include_dirs.iter().cloned());
    Ok(options)
}

/// Bundled assets live next to the launcher binary under assets/.
fn resolve_assets(cli: &Cli) -> Result<LaunchAssets, String> {
    let exe = env::current_exe()
        .map_err(|err| format!("failed to resolve current executable path: {err}"))?;
    let assets_dir = exe
        .parent()
        .map(|dir| dir.join("assets"))
        .ok_or_else(|| format!("executable path has no parent directory: {}", exe.display()))?;
    Ok(LaunchAssets {
        level_template: cli
            .level_template
            .clone()
            .unwrap_or_else(|| assets_dir.join("level.dat")),
        test_pack_dir: Some(
            cli.test_pack
                .clone()
                .unwrap_or_else(|| assets_dir.join("test_pack")),
        ),
    })
}

fn print_banner(
    sink: &mut dyn LogSink,
    cli: &Cli,
    options: &RunOptions,
    command: &LaunchCommand,
) {
    let mode = match options.verbosity {
        Verbosity::Normal => "filtered",
        Verbosity::Verbose => "verbose",
    };
    let mut say = |text: String| sink.write_line(Channel::System, LogColor::Cyan, &text);
    say(format!("starting game: {}", command.program.display()));
    say(format!("log mode: {mode}"));
    say(format!("project: {}", cli.project.display()));
    say(format!("world: {}", command.world_dir.display()));
    for dir in &options.extra_pack_dirs {
        say(format!("extra pack dir: {}", dir.display()));
    }
}

fn run_game(
    command: LaunchCommand,
    router: LogRouter,
    sink: TerminalSink,
) -> Result<ExitCode, String> {
    let mut child = Command::new(&command.program)
        .args(&command.args)
        .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| format!("failed to start {}: {err}", command.program.display()))?;

    let stdout = child.stdout.take().ok_or("game stdout not captured")?;
    let stderr = child.stderr.take().ok_or("game stderr not captured")?;
    let router = Arc::new(Mutex::new((router, sink)));

    let pumps = [
        spawn_pump("game-stdout", Channel::Stdout, stdout, Arc::clone(&router)),
        spawn_pump("game-stderr", Channel::Stderr, stderr, Arc::clone(&router)),
    ];
    let status = child
        .wait()
        .map_err(|err| format!("failed to wait for the game: {err}"))?;
    for pump in pumps {
        let _ = pump.join();
    }

    let mut guard = router.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let (router, sink) = &mut *guard;
    router.flush(sink);
    let code = status.code().unwrap_or(-1);
    if status.success() {
        info!(code, "game exited");
        Ok(ExitCode::SUCCESS)
    } else {
        sink.write_line(
            Channel::System,
            LogColor::Red,
            &format!("game exited with code {code}"),
        );
        Ok(ExitCode::from(1))
    }
}

fn spawn_pump(
    name: &str,
    channel: Channel,
    mut reader: impl Read + Send + 'static,
    router: Arc<Mutex<(LogRouter, TerminalSink)>>,
) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let mut decoder = Utf8ChunkDecoder::default();
            let mut buf = [0u8; 8192];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        let text = decoder.push(&buf[..n]);
                        if !text.is_empty() {
                            let mut guard =
                                router.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                            let (router, sink) = &mut *guard;
                            router.feed(channel, &text, sink);
                        }
                    }
                    Err(_) => break,
                }
            }
        })
        .expect("spawn log pump thread")
}

/// Reassembles UTF-8 sequences split across read chunks. Invalid bytes
/// become replacement characters rather than dropping output.
#[derive(Default)]
struct Utf8ChunkDecoder {
    carry: Vec<u8>,
}

impl Utf8ChunkDecoder {
    fn push(&mut self, chunk: &[u8]) -> String {
        self.carry.extend_from_slice(chunk);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.carry) {
                Ok(text) => {
                    out.push_str(text);
                    self.carry.clear();
                    return out;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(std::str::from_utf8(&self.carry[..valid]).unwrap_or(""));
                    match err.error_len() {
                        // An incomplete trailing sequence waits for the
                        // next chunk.
                        None => {
                            self.carry.drain(..valid);
                            return out;
                        }
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.carry.drain(..valid + bad);
                        }
                    }
                }
            }
        }
    }
}

struct TerminalSink;

impl LogSink for TerminalSink {
    fn write_line(&mut self, _channel: Channel, color: LogColor, text: &str) {
        let styled = match color {
            LogColor::Red => text.red(),
            LogColor::Yellow => text.yellow(),
            LogColor::Green => text.green(),
            LogColor::Gray => text.white(),
            LogColor::DarkGray => text.bright_black(),
            LogColor::Cyan => text.cyan(),
            LogColor::Default => text.normal(),
        };
        println!("{styled}");
    }
}
