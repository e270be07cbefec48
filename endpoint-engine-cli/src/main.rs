//! endpoint-engine: streams audio endpoint changes as JSON and reads volume
//! commands from stdin, one per line.

mod command;
mod dto;
mod error;

use std::io::{self, BufRead, Write};
use std::sync::mpsc::Receiver;
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use command::Command;
use dto::{ChangeDto, DeviceListResponse};
use endpoint_manager_rs::audio::{
    create_event_channel, ChangeEvent, DeviceBackend, DeviceRole, Direction, EndpointManager,
    MemoryBackend, VolumeState,
};
use endpoint_manager_rs::config::volume::DEFAULT_STEP_PERCENT;
use endpoint_manager_rs::{AudioError, ManagerConfig};
use error::ErrorReport;

#[derive(Parser, Debug)]
#[command(
    name = "endpoint-engine",
    about = "Audio endpoint manager: JSON change events on stdout, commands on stdin",
    version
)]
struct Cli {
    /// Default-device role to track (console, multimedia, communications)
    #[arg(long, default_value = "multimedia", value_parser = parse_role)]
    role: DeviceRole,

    /// Initial increment/decrement step, in percent
    #[arg(long, default_value_t = DEFAULT_STEP_PERCENT)]
    step: f32,

    /// Track playback devices only
    #[arg(long, conflicts_with = "capture_only")]
    render_only: bool,

    /// Track recording devices only
    #[arg(long)]
    capture_only: bool,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,

    /// Use a simulated set of devices instead of the system's
    #[arg(long)]
    simulate: bool,
}

impl Cli {
    fn manager_config(&self) -> ManagerConfig {
        let directions = if self.render_only {
            vec![Direction::Render]
        } else if self.capture_only {
            vec![Direction::Capture]
        } else {
            Direction::ALL.to_vec()
        };
        ManagerConfig::default()
            .with_role(self.role)
            .with_directions(directions)
            .with_step_volume(self.step)
    }
}

fn parse_role(s: &str) -> Result<DeviceRole, String> {
    s.parse().map_err(|e: AudioError| e.to_string())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.manager_config();

    if cli.simulate {
        return run(simulated_backend(config.role), config, cli.pretty);
    }
    run_native(config, cli.pretty)
}

#[cfg(windows)]
fn run_native(config: ManagerConfig, pretty: bool) -> Result<()> {
    use endpoint_manager_rs::platform::{ComGuard, WasapiBackend};

    let _com = ComGuard::new().context("COM initialization failed")?;
    let backend = WasapiBackend::new().context("Core Audio is unavailable")?;
    run(backend, config, pretty)
}

#[cfg(not(windows))]
fn run_native(config: ManagerConfig, pretty: bool) -> Result<()> {
    warn!("Core Audio is only available on Windows, using simulated devices");
    run(simulated_backend(config.role), config, pretty)
}

/// A small fixed set of devices for `--simulate`.
fn simulated_backend(role: DeviceRole) -> MemoryBackend {
    let backend = MemoryBackend::new();
    backend.add_device("sim-speakers", "Speakers (Simulated)", Direction::Render);
    backend.add_device("sim-headphones", "Headphones (Simulated)", Direction::Render);
    backend.add_device("sim-microphone", "Microphone (Simulated)", Direction::Capture);
    backend.set_volume_silently("sim-headphones", VolumeState::new(30.0, true));
    backend.set_default_silently(Direction::Render, role, Some("sim-speakers"));
    backend.set_default_silently(Direction::Capture, role, Some("sim-microphone"));
    backend
}

fn run<B: DeviceBackend>(backend: B, config: ManagerConfig, pretty: bool) -> Result<()> {
    let (tx, rx) = create_event_channel();
    let printer = spawn_printer(rx, pretty)?;

    let manager = EndpointManager::new(backend, config, tx)?;
    manager
        .initialize_devices()
        .context("Initial device scan failed")?;
    info!(devices = manager.devices().len(), "Ready for commands");

    let result = read_commands(&manager, pretty);

    manager.shutdown();
    drop(manager);
    if printer.join().is_err() {
        warn!("Event printer thread panicked");
    }
    result
}

/// Process stdin until EOF or `quit`.
fn read_commands<B: DeviceBackend>(manager: &EndpointManager<B>, pretty: bool) -> Result<()> {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }

        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                report(&ErrorReport::from(&e));
                continue;
            }
        };
        debug!(?command, "Command received");

        match command {
            Command::Quit => break,
            Command::List => print_json(&DeviceListResponse::new(&manager.devices()), pretty),
            command => {
                if let Err(e) = command.apply(manager) {
                    report(&ErrorReport::from(&e));
                }
            }
        }
    }
    Ok(())
}

/// Writes every change event to stdout until the manager drops its sender.
fn spawn_printer(rx: Receiver<ChangeEvent>, pretty: bool) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("event-printer".into())
        .spawn(move || {
            for event in rx {
                print_json(&ChangeDto::from(&event), pretty);
            }
        })
        .context("Failed to spawn event printer thread")
}

fn print_json<T: Serialize>(value: &T, pretty: bool) {
    let mut out = io::stdout().lock();
    let written = if pretty {
        serde_json::to_writer_pretty(&mut out, value)
    } else {
        serde_json::to_writer(&mut out, value)
    };
    if let Err(e) = written {
        warn!(error = %e, "Failed to write JSON");
        return;
    }
    let _ = writeln!(out);
    let _ = out.flush();
}

fn report(err: &ErrorReport) {
    match serde_json::to_string(err) {
        Ok(json) => eprintln!("{json}"),
        Err(e) => warn!(error = %e, message = %err.error.message, "Failed to encode error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["endpoint-engine"]);
        let config = cli.manager_config();
        assert_eq!(config.role, DeviceRole::Multimedia);
        assert_eq!(config.directions, Direction::ALL.to_vec());
        assert_eq!(config.step_volume, DEFAULT_STEP_PERCENT);
        assert!(!cli.simulate);
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::parse_from([
            "endpoint-engine",
            "--role",
            "communications",
            "--step",
            "5",
            "--capture-only",
            "--simulate",
        ]);
        let config = cli.manager_config();
        assert_eq!(config.role, DeviceRole::Communications);
        assert_eq!(config.directions, vec![Direction::Capture]);
        assert_eq!(config.step_volume, 5.0);
    }

    #[test]
    fn test_cli_rejects_conflicting_directions() {
        let parsed = Cli::try_parse_from(["endpoint-engine", "--render-only", "--capture-only"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_simulated_backend_has_defaults() {
        let backend = simulated_backend(DeviceRole::Multimedia);
        let default = backend
            .get_default_device(Direction::Render, DeviceRole::Multimedia)
            .unwrap()
            .unwrap();
        assert_eq!(default.id(), "sim-speakers");
        assert_eq!(backend.enumerate_active_devices(Direction::Render).unwrap().len(), 2);
    }
}
