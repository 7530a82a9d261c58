use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use framelink_core::{
    dump_frame, init_logging, AppDirs, Config, Frame, FrameSummary, PluginError, SystemClock,
    ValidationError,
};
use framelink_plugin::{DriverRegistry, Handle, PluginHost};
use serde_json::json;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Parser)]
#[command(name = "framelink", version, about = "Probe and read Framelink plugin streams")]
struct Cli {
    /// Keep config and logs under this directory instead of the platform defaults
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List registered drivers
    Drivers,
    /// Open a stream, report what it is, and close it
    Probe(StreamArgs),
    /// Read frames from a stream and print their metadata
    Read(ReadCommand),
    /// Show the resolved configuration
    Config,
}

#[derive(Debug, Args, Clone)]
struct StreamArgs {
    /// Plugin name, e.g. video_src
    plugin: Option<String>,
    /// Configuration passed to the plugin verbatim
    configuration: Option<String>,
    /// Use a `[streams.<name>]` preset from config.toml
    #[arg(long)]
    preset: Option<String>,
}

#[derive(Debug, Args, Clone)]
struct ReadCommand {
    #[command(flatten)]
    stream: StreamArgs,
    /// Frames to read
    #[arg(short = 'n', long, default_value_t = 1)]
    count: usize,
    /// Per-frame wait; defaults to host.default_timeout_ms
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StreamTarget {
    plugin: String,
    configuration: String,
}

#[derive(Debug, Error)]
enum TargetError {
    #[error("a plugin name or --preset is required")]
    Missing,
    #[error("--preset cannot be combined with a plugin name")]
    PresetConflict,
    #[error("{0}")]
    Preset(#[from] ValidationError),
}

impl StreamArgs {
    fn target(&self, config: &Config) -> Result<StreamTarget, TargetError> {
        match (&self.preset, &self.plugin) {
            (Some(_), Some(_)) => Err(TargetError::PresetConflict),
            (Some(name), None) => {
                let preset = config.preset(name)?;
                Ok(StreamTarget {
                    plugin: preset.plugin.clone(),
                    configuration: preset.configuration.clone(),
                })
            }
            (None, Some(plugin)) => Ok(StreamTarget {
                plugin: plugin.clone(),
                configuration: self.configuration.clone().unwrap_or_default(),
            }),
            (None, None) => Err(TargetError::Missing),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let dirs = match &cli.root {
        Some(root) => AppDirs::rooted_at(root),
        None => AppDirs::discover()?,
    };
    let config = Config::load_or_default(&dirs)?;
    let _logging = init_logging(&config.logging, &dirs)?;

    let host = PluginHost::with_settings(
        DriverRegistry::with_builtin(),
        config.host.clone(),
        Arc::new(SystemClock::new()),
    );
    let mut out = io::stdout().lock();

    match cli.command {
        Command::Drivers => print_drivers(&host, cli.json, &mut out)?,
        Command::Probe(args) => {
            let target = args.target(&config)?;
            probe(&host, &target, cli.json, &mut out)?;
        }
        Command::Read(read) => {
            let target = read.stream.target(&config)?;
            let timeout_ms = read.timeout_ms.unwrap_or(config.host.default_timeout_ms);
            let frames = read_frames(&host, &target, read.count, timeout_ms, cli.json, &mut out)?;
            tracing::info!(plugin = %target.plugin, frames, "read finished");
        }
        Command::Config => print_config(&config, &dirs, cli.json, &mut out)?,
    }

    Ok(())
}

fn print_drivers(host: &PluginHost, as_json: bool, out: &mut impl Write) -> Result<()> {
    let drivers = host.drivers();
    if as_json {
        let list: Vec<_> = drivers
            .iter()
            .map(|d| {
                json!({
                    "name": d.name,
                    "kind": d.kind,
                    "capabilities": d.capabilities.to_string(),
                    "summary": d.summary,
                })
            })
            .collect();
        writeln!(out, "{}", serde_json::to_string_pretty(&list)?)?;
        return Ok(());
    }

    for d in &drivers {
        writeln!(
            out,
            "{:<12} {:<10} {:<10} {}",
            d.name,
            format!("{:?}", d.kind).to_lowercase(),
            d.capabilities,
            d.summary
        )?;
    }
    Ok(())
}

/// Runs `body` on a freshly opened stream and closes it afterwards, whatever
/// `body` returned.
fn with_stream<T>(
    host: &PluginHost,
    target: &StreamTarget,
    body: impl FnOnce(Handle) -> Result<T>,
) -> Result<T> {
    let handle = host
        .open(&target.plugin, &target.configuration)
        .with_context(|| format!("opening {} '{}'", target.plugin, target.configuration))?;
    let result = body(handle);
    let closed = host.close(handle);
    let value = result?;
    closed?;
    Ok(value)
}

fn probe(host: &PluginHost, target: &StreamTarget, as_json: bool, out: &mut impl Write) -> Result<()> {
    with_stream(host, target, |handle| {
        let info = host.stream_info(handle)?;
        let depth = host.get_queue_depth(handle)?;
        if as_json {
            let value = json!({
                "handle": handle.get(),
                "plugin": info.plugin,
                "uuid": info.uuid,
                "configuration": info.configuration,
                "kind": info.kind,
                "capabilities": info.capabilities.to_string(),
                "queue_depth": depth,
            });
            writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
        } else {
            writeln!(out, "handle:        {handle}")?;
            writeln!(out, "plugin:        {}", info.plugin)?;
            writeln!(out, "uuid:          {}", info.uuid)?;
            writeln!(out, "configuration: {}", info.configuration)?;
            writeln!(out, "kind:          {:?}", info.kind)?;
            writeln!(out, "capabilities:  {}", info.capabilities)?;
            writeln!(out, "queue depth:   {depth}")?;
        }
        Ok(())
    })
}

/// Reads up to `count` frames. Stops early when the stream runs dry.
fn read_frames(
    host: &PluginHost,
    target: &StreamTarget,
    count: usize,
    timeout_ms: u64,
    as_json: bool,
    out: &mut impl Write,
) -> Result<usize> {
    let timeout_ns = timeout_ms.saturating_mul(1_000_000);
    with_stream(host, target, |handle| {
        let mut frame = Frame::default();
        let mut read = 0;
        while read < count {
            match host.read_timeout(handle, &mut frame, timeout_ns) {
                Ok(()) => {}
                Err(PluginError::FrameNotReady) => {
                    tracing::warn!(%handle, timeout_ms, "no frame within timeout");
                    break;
                }
                Err(err) => return Err(err.into()),
            }

            dump_frame("read", &frame);
            let summary = FrameSummary::of(&frame);
            if as_json {
                writeln!(out, "{}", serde_json::to_string(&summary)?)?;
            } else {
                writeln!(out, "{}", summary.describe())?;
            }
            host.free_frame(handle, &mut frame)?;
            read += 1;
        }
        Ok(read)
    })
}

fn print_config(config: &Config, dirs: &AppDirs, as_json: bool, out: &mut impl Write) -> Result<()> {
    let path = Config::config_path(dirs);
    if as_json {
        let value = json!({
            "path": path,
            "log_dir": dirs.log_dir(),
            "host": {
                "max_streams": config.host.max_streams,
                "max_free_buffers": config.host.max_free_buffers,
                "default_timeout_ms": config.host.default_timeout_ms,
            },
            "streams": config.streams.iter().map(|(name, preset)| {
                json!({
                    "name": name,
                    "plugin": preset.plugin,
                    "configuration": preset.configuration,
                })
            }).collect::<Vec<_>>(),
        });
        writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
        return Ok(());
    }

    let state = if path.exists() { "" } else { " (not present, using defaults)" };
    writeln!(out, "config:  {}{}", path.display(), state)?;
    writeln!(out, "logs:    {}", dirs.log_dir().display())?;
    writeln!(
        out,
        "host:    max_streams={} max_free_buffers={} default_timeout_ms={}",
        config.host.max_streams, config.host.max_free_buffers, config.host.default_timeout_ms
    )?;
    if config.streams.is_empty() {
        writeln!(out, "No stream presets. Add [streams.<name>] to config.toml.")?;
    }
    for (name, preset) in &config.streams {
        writeln!(out, "preset:  {name} -> {} '{}'", preset.plugin, preset.configuration)?;
    }
    Ok(())
}
