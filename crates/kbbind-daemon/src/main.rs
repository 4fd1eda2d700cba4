//! kbbind daemon
//!
//! Reads key events from one input device and re-emits them through a
//! uinput virtual keyboard according to the configured combination rules.

mod device;
mod dump;
mod event;
mod held;
mod injector;
mod launcher;
mod pidfile;
mod remapper;
mod shutdown;
mod syslog;

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use kbbind_config::ConfigError;
use tracing_subscriber::EnvFilter;

use crate::device::{EventReader, InputDevice};
use crate::injector::{EventSink, VirtualKeyboard, DEFAULT_DEVICE_NAME, DEFAULT_UINPUT_PATH};
use crate::launcher::ActionLauncher;
use crate::pidfile::PidFile;
use crate::remapper::{Effect, Remapper};
use crate::shutdown::{listen_for_signals, Shutdown};
use crate::syslog::Syslog;

#[derive(Parser, Debug)]
#[command(name = "kbbind")]
#[command(version)]
#[command(about = "Keyboard combination remapping daemon")]
#[command(override_usage = "kbbind [OPTIONS] <CONFIG> <DEVICE>\n       kbbind --dump <DEVICE>")]
struct Args {
    /// Swallow keys that match no rule instead of passing them through
    #[arg(short, long)]
    sink: bool,

    /// Print key events from the device and do nothing else
    #[arg(short = 'e', long)]
    dump: bool,

    /// Detach from the console and run as a daemon, logging to syslog
    #[arg(short, long)]
    daemon: bool,

    /// Path to the uinput control node
    #[arg(short, long, default_value = DEFAULT_UINPUT_PATH)]
    uinput: String,

    /// Name of the virtual keyboard
    #[arg(short, long, default_value = DEFAULT_DEVICE_NAME)]
    name: String,

    /// Don't send a sync event after every emitted event
    #[arg(short = 'r', long)]
    no_sync: bool,

    /// Write the process id to this file
    #[arg(short, long, value_name = "PATH")]
    pid_file: Option<String>,

    /// Configuration file and input device, or just the device with --dump
    #[arg(value_name = "PATH")]
    paths: Vec<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Mode {
    Dump { device: PathBuf },
    Remap { config: PathBuf, device: PathBuf },
}

fn expand_path(path: &str) -> PathBuf {
    shellexpand::tilde(path).into_owned().into()
}

impl Args {
    fn mode(&self) -> Result<Mode> {
        match (self.dump, self.paths.as_slice()) {
            (true, [_, _]) => bail!("Config file not expected with --dump"),
            (true, _) if self.daemon => bail!("--daemon and --dump options conflict"),
            (true, [device]) => Ok(Mode::Dump {
                device: expand_path(device),
            }),
            (false, [config, device]) => Ok(Mode::Remap {
                config: expand_path(config),
                device: expand_path(device),
            }),
            _ => bail!("Incorrect argument(s)"),
        }
    }
}

fn init_logging(daemon: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if daemon {
        tracing_subscriber::fmt()
            .with_writer(Syslog::open())
            .with_ansi(false)
            .without_time()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mode = args.mode()?;

    init_logging(args.daemon);

    match mode {
        Mode::Dump { device } => {
            let device = open_device(&device, args.sink)?;
            let pid_file = detach(&args)?;

            runtime()?.block_on(run_dump(device))?;

            drop(pid_file);
            Ok(())
        }
        Mode::Remap { config, device } => {
            tracing::info!("Loading configuration from {}", config.display());

            let compiled = kbbind_config::load_rules(&config).map_err(report_config_error)?;
            let rules = compiled.tables;

            tracing::info!(
                "Loaded {} remap rule(s) and {} exec rule(s)",
                rules.remap_count(),
                rules.exec_count()
            );

            let device = open_device(&device, args.sink || rules.has_remaps())?;

            let sink = if rules.has_remaps() {
                let keyboard = VirtualKeyboard::create(&expand_path(&args.uinput), &args.name)?;
                Some(EventSink::new(keyboard, !args.no_sync))
            } else {
                tracing::info!("No remap rules, no virtual keyboard needed");
                None
            };

            let launcher = ActionLauncher::from_env();
            if rules.exec_count() > 0 {
                tracing::debug!("Commands will run via {}", launcher.shell().display());
            }

            let pid_file = detach(&args)?;
            let remapper = Remapper::new(rules, args.sink);

            runtime()?.block_on(run_remap(device, sink, remapper, launcher))?;

            drop(pid_file);
            Ok(())
        }
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Unable to start the event loop")
}

fn open_device(path: &Path, grab: bool) -> Result<InputDevice> {
    let mut device = InputDevice::open(path)?;

    match device.name() {
        Some(name) => tracing::info!("Reading from {} ({})", path.display(), name),
        None => tracing::info!("Reading from {}", path.display()),
    }

    if grab {
        device.grab()?;
    } else {
        tracing::info!("Leaving {} ungrabbed", path.display());
    }

    Ok(device)
}

/// Daemonize if requested, then write the PID file.
///
/// Must run before the runtime is built; only the child returns.
fn detach(args: &Args) -> Result<Option<PidFile>> {
    // Resolved up front since daemonizing changes directory to /
    let pid_path = match &args.pid_file {
        Some(path) => Some(
            std::path::absolute(expand_path(path))
                .with_context(|| format!("Unable to resolve PID file path {}", path))?,
        ),
        None => None,
    };

    if args.daemon {
        nix::unistd::daemon(false, false).context("Error forking daemon process")?;
        tracing::info!("Running as a daemon");
    }

    pid_path.map(|path| PidFile::create(&path)).transpose()
}

/// Print every key event read from the device until shutdown.
async fn run_dump(device: InputDevice) -> Result<()> {
    let mut reader = EventReader::from_device(device)?;

    let (shutdown, mut token) = Shutdown::new();
    listen_for_signals(shutdown)?;

    loop {
        let event = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            event = reader.next_event() => event?,
        };

        if let Some(line) = dump::describe(&event) {
            println!("{}", line);
        }
    }

    Ok(())
}

async fn run_remap(
    device: InputDevice,
    mut sink: Option<EventSink<VirtualKeyboard>>,
    mut remapper: Remapper,
    launcher: ActionLauncher,
) -> Result<()> {
    let mut reader = EventReader::from_device(device)?;

    let (shutdown, mut token) = Shutdown::new();
    listen_for_signals(shutdown)?;

    tracing::info!("kbbind running");

    loop {
        let event = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            event = reader.next_event() => event?,
        };

        for effect in remapper.process(event) {
            apply_effect(effect, sink.as_mut(), &launcher)?;
        }
    }

    tracing::info!("Shutting down");

    // Destroy the virtual keyboard before releasing the input device
    drop(sink);
    drop(reader);

    Ok(())
}

/// Carry out one effect. Write failures are fatal; launch failures are only logged.
fn apply_effect<W: Write>(
    effect: Effect,
    sink: Option<&mut EventSink<W>>,
    launcher: &ActionLauncher,
) -> Result<()> {
    match effect {
        Effect::Emit(event) => {
            if let Some(sink) = sink {
                sink.emit(&event).context("Error writing to uinput device")?;
            }
        }
        Effect::Launch(command) => {
            if let Err(e) = launcher.spawn(&command) {
                tracing::error!("Unable to launch '{}': {}", command, e);
            }
        }
    }
    Ok(())
}

/// Log every configuration diagnostic and turn the failure into a fatal error.
fn report_config_error(err: ConfigError) -> anyhow::Error {
    match err {
        ConfigError::Invalid { path, errors, .. } => {
            for error in &errors {
                tracing::error!("{}:{}: {}", path.display(), error.line, error.error);
            }
            anyhow!(
                "Refusing to start with {} error(s) in {}",
                errors.len(),
                path.display()
            )
        }
        err => err.into(),
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::event::{InputEvent, KeyState, EVENT_SIZE};

    fn args(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("kbbind").chain(argv.iter().copied())).unwrap()
    }

    struct Unplugged;

    impl Write for Unplugged {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from_raw_os_error(nix::libc::ENODEV))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    // ========================================================================
    // Argument handling
    // ========================================================================

    #[test]
    fn test_mode_remap() {
        let args = args(&["rules.conf", "/dev/input/event3"]);
        assert_eq!(
            args.mode().unwrap(),
            Mode::Remap {
                config: PathBuf::from("rules.conf"),
                device: PathBuf::from("/dev/input/event3"),
            }
        );
        assert!(!args.sink);
        assert!(!args.daemon);
        assert!(!args.no_sync);
        assert_eq!(args.uinput, "/dev/input/uinput");
        assert_eq!(args.name, "kbbind virtual keyboard");
    }

    #[test]
    fn test_mode_dump() {
        let args = args(&["--dump", "/dev/input/event3"]);
        assert_eq!(
            args.mode().unwrap(),
            Mode::Dump {
                device: PathBuf::from("/dev/input/event3"),
            }
        );
    }

    #[test]
    fn test_mode_dump_keeps_sink_flag() {
        let args = args(&["-s", "-e", "/dev/input/event3"]);
        assert!(matches!(args.mode().unwrap(), Mode::Dump { .. }));
        assert!(args.sink, "sink mode grabs the device while dumping");
    }

    #[test]
    fn test_mode_dump_rejects_config() {
        let err = args(&["-e", "rules.conf", "/dev/input/event3"]).mode().unwrap_err();
        assert_eq!(err.to_string(), "Config file not expected with --dump");
    }

    #[test]
    fn test_mode_daemon_conflicts_with_dump() {
        let err = args(&["-d", "-e", "/dev/input/event3"]).mode().unwrap_err();
        assert_eq!(err.to_string(), "--daemon and --dump options conflict");
    }

    #[test]
    fn test_mode_daemon_remap() {
        let args = args(&["--daemon", "-p", "kbbind.pid", "rules.conf", "/dev/input/event3"]);
        assert!(args.daemon);
        assert!(matches!(args.mode().unwrap(), Mode::Remap { .. }));
    }

    #[test]
    fn test_mode_wrong_argument_count() {
        for argv in [&[][..], &["rules.conf"][..], &["a", "b", "c"][..], &["-e"][..]] {
            let err = args(argv).mode().unwrap_err();
            assert_eq!(err.to_string(), "Incorrect argument(s)", "argv: {:?}", argv);
        }
    }

    #[test]
    fn test_short_options() {
        let args = args(&[
            "-s",
            "-r",
            "-u",
            "/dev/uinput",
            "-n",
            "my keyboard",
            "-p",
            "/run/kbbind.pid",
            "rules.conf",
            "/dev/input/event0",
        ]);
        assert!(args.sink);
        assert!(args.no_sync);
        assert_eq!(args.uinput, "/dev/uinput");
        assert_eq!(args.name, "my keyboard");
        assert_eq!(args.pid_file.as_deref(), Some("/run/kbbind.pid"));
    }

    #[test]
    fn test_paths_expand_tilde() {
        let Some(home) = std::env::var_os("HOME") else {
            return;
        };
        let args = args(&["~/kbbind.conf", "/dev/input/event0"]);
        match args.mode().unwrap() {
            Mode::Remap { config, .. } => {
                assert_eq!(config, PathBuf::from(home).join("kbbind.conf"));
            }
            other => panic!("unexpected mode {:?}", other),
        }
    }

    #[test]
    fn test_unknown_flag_rejected() {
        assert!(Args::try_parse_from(["kbbind", "--frobnicate"]).is_err());
    }

    // ========================================================================
    // Startup
    // ========================================================================

    #[test]
    fn test_detach_without_daemon_writes_absolute_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kbbind.pid");
        let args = args(&["-p", path.to_str().unwrap(), "rules.conf", "/dev/input/event0"]);

        let pid_file = detach(&args).unwrap().expect("PID file requested");
        assert!(pid_file.path().is_absolute());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap().trim(),
            std::process::id().to_string()
        );
    }

    #[test]
    fn test_detach_without_pid_file() {
        let args = args(&["rules.conf", "/dev/input/event0"]);
        assert!(detach(&args).unwrap().is_none());
    }

    #[test]
    fn test_report_config_error_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.conf");
        std::fs::write(&path, "map 1\nbogus\n").unwrap();

        let err = kbbind_config::load_rules(&path).unwrap_err();
        let fatal = report_config_error(err);
        assert!(fatal.to_string().starts_with("Refusing to start with 2 error(s)"));
    }

    #[test]
    fn test_report_config_error_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = kbbind_config::load_rules(&dir.path().join("missing.conf")).unwrap_err();

        let fatal = report_config_error(err);
        assert!(fatal.to_string().starts_with("Error opening config file"));
    }

    // ========================================================================
    // Effect routing
    // ========================================================================

    #[tokio::test]
    async fn test_apply_effect_emits_to_sink() {
        let launcher = ActionLauncher::new("/bin/sh");
        let mut sink = EventSink::new(Vec::new(), true);

        let event = InputEvent::key(30, KeyState::Press);
        apply_effect(Effect::Emit(event), Some(&mut sink), &launcher).unwrap();

        let out = sink.into_inner();
        assert_eq!(out.len(), 2 * EVENT_SIZE, "event plus sync marker");
        assert_eq!(InputEvent::decode(&out[..EVENT_SIZE]).unwrap(), event);
    }

    #[tokio::test]
    async fn test_apply_effect_without_sink_is_noop() {
        let launcher = ActionLauncher::new("/bin/sh");
        let event = InputEvent::key(30, KeyState::Press);

        apply_effect::<Vec<u8>>(Effect::Emit(event), None, &launcher).unwrap();
    }

    #[tokio::test]
    async fn test_apply_effect_write_failure_is_fatal() {
        let launcher = ActionLauncher::new("/bin/sh");
        let mut sink = EventSink::new(Unplugged, true);

        let err = apply_effect(
            Effect::Emit(InputEvent::key(30, KeyState::Release)),
            Some(&mut sink),
            &launcher,
        )
        .unwrap_err();
        assert!(err.to_string().starts_with("Error writing to uinput device"));
    }

    #[tokio::test]
    async fn test_apply_effect_launch_failure_is_not_fatal() {
        let launcher = ActionLauncher::new("/nonexistent/shell");
        let mut sink = EventSink::new(Vec::new(), true);

        apply_effect(Effect::Launch("true".to_string()), Some(&mut sink), &launcher).unwrap();
        assert!(sink.get_ref().is_empty(), "a launch writes nothing to the sink");
    }

    #[tokio::test]
    async fn test_apply_effect_launch_runs_command() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let launcher = ActionLauncher::new("/bin/sh");

        let command = format!("touch '{}'", marker.display());
        apply_effect::<Vec<u8>>(Effect::Launch(command), None, &launcher).unwrap();

        for _ in 0..200 {
            if marker.exists() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("command did not run");
    }
}
