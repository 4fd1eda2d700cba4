//! kbbind-ctl
//!
//! Helper tool for writing and checking kbbind configurations.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use kbbind_config::KEY_MAX;
use miette::IntoDiagnostic;

const INPUT_DIR: &str = "/dev/input";

#[derive(Parser, Debug)]
#[command(name = "kbbind-ctl")]
#[command(about = "Configuration helper for kbbind")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a configuration file
    Validate {
        /// Path to configuration file
        config: String,

        /// Also list every compiled rule
        #[arg(short, long)]
        verbose: bool,
    },

    /// List available input devices
    Devices,

    /// List key codes and their names
    Keys {
        /// Only show keys whose name contains this (case-insensitive)
        filter: Option<String>,
    },
}

fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config, verbose } => {
            let config_path = shellexpand::tilde(&config).into_owned();
            cmd_validate(Path::new(&config_path), verbose)
        }
        Commands::Devices => cmd_devices(),
        Commands::Keys { filter } => cmd_keys(filter.as_deref()),
    }
}

fn cmd_validate(config_path: &Path, verbose: bool) -> miette::Result<()> {
    println!("Validating configuration: {}", config_path.display());

    let compiled = kbbind_config::load_rules(config_path)?;
    let tables = &compiled.tables;

    println!("Configuration is valid!");
    println!("  Aliases: {}", compiled.aliases.len());
    println!("  Remap rules: {}", tables.remap_count());
    println!("  Exec rules: {}", tables.exec_count());

    if verbose {
        let mut remaps: Vec<_> = tables.remaps().collect();
        remaps.sort();
        for (trigger, output) in remaps {
            if output.is_empty() {
                println!("    drop {}", trigger);
            } else {
                println!("    map {} -> {}", trigger, output);
            }
        }

        let mut execs: Vec<_> = tables.execs().collect();
        execs.sort();
        for (trigger, command) in execs {
            println!("    exec {} -> {}", trigger, command);
        }
    }

    if !tables.has_remaps() {
        println!("\nNote: no map/drop rules, the device will not be grabbed.");
    }

    Ok(())
}

fn cmd_devices() -> miette::Result<()> {
    let nodes = event_nodes(Path::new(INPUT_DIR)).into_diagnostic()?;

    let summaries: Vec<DeviceSummary> = nodes
        .into_iter()
        .filter_map(|path| match evdev::Device::open(&path) {
            Ok(device) => Some(DeviceSummary::of(path, &device)),
            Err(e) => {
                tracing::debug!("Could not open {}: {}", path.display(), e);
                None
            }
        })
        .collect();

    if summaries.is_empty() {
        println!("No readable event devices in {}", INPUT_DIR);
        println!("kbbind needs read access to the device, usually via the 'input' group.");
        return Ok(());
    }

    for summary in &summaries {
        println!("{}", summary);
    }

    Ok(())
}

/// `event<N>` nodes in `dir`, ordered by N.
fn event_nodes(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut nodes = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if let Some(index) = path.file_name().and_then(|n| n.to_str()).and_then(event_index) {
            nodes.push((index, path));
        }
    }
    nodes.sort();
    Ok(nodes.into_iter().map(|(_, path)| path).collect())
}

fn event_index(file_name: &str) -> Option<u32> {
    let digits = file_name.strip_prefix("event")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// What `devices` prints about one node.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DeviceSummary {
    path: PathBuf,
    name: String,
    vendor: u16,
    product: u16,
    /// Number of key codes in 1..=KEY_MAX the device can report
    keys: usize,
    letters: bool,
}

impl DeviceSummary {
    fn of(path: PathBuf, device: &evdev::Device) -> Self {
        let id = device.input_id();
        let supported = device.supported_keys();

        Self {
            path,
            name: device.name().unwrap_or("Unknown").to_string(),
            vendor: id.vendor(),
            product: id.product(),
            keys: supported.map_or(0, |keys| {
                keys.iter().filter(|key| (1..=KEY_MAX).contains(&key.code())).count()
            }),
            letters: supported.is_some_and(|keys| keys.contains(evdev::Key::KEY_A)),
        }
    }

    fn kind(&self) -> &'static str {
        match (self.letters, self.keys) {
            (true, _) => "keyboard",
            (false, 0) => "no keys",
            (false, _) => "buttons",
        }
    }
}

impl std::fmt::Display for DeviceSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}: {}", self.path.display(), self.name)?;
        writeln!(
            f,
            "    {:04x}:{:04x}, {}, {} key(s)",
            self.vendor,
            self.product,
            self.kind(),
            self.keys
        )?;
        if self.keys > 0 {
            write!(f, "    kbbind <config> {}", self.path.display())?;
        }
        Ok(())
    }
}

fn cmd_keys(filter: Option<&str>) -> miette::Result<()> {
    for (code, name) in key_names(filter) {
        println!("{:>4}  {}", code, name);
    }
    Ok(())
}

/// Known key codes with their kernel names, optionally filtered by name.
fn key_names(filter: Option<&str>) -> Vec<(u16, String)> {
    let filter = filter.map(str::to_ascii_uppercase);

    (1..=KEY_MAX)
        .map(|code| (code, format!("{:?}", evdev::Key::new(code))))
        .filter(|(_, name)| name.starts_with("KEY_") || name.starts_with("BTN_"))
        .filter(|(_, name)| filter.as_ref().map_or(true, |f| name.contains(f.as_str())))
        .collect()
}
