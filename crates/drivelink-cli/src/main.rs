//! `drivelink` – supervisory drive client.
//!
//! This binary wires the control loop to its collaborators and runs it until
//! Ctrl-C:
//!
//! 1. Loads `~/.drivelink/config.toml` (writing defaults on first run) and
//!    applies `DRIVELINK_*` environment overrides.
//! 2. Starts a synthetic sensor feed and a simulated vehicle.
//! 3. Connects to the predictor at `predictor_url`, or serves a simulated
//!    predictor in-process when override is enabled without one.
//! 4. Records every control snapshot when `recording_dir` is set.
//! 5. Intercepts **Ctrl-C** to cancel the loop and flush the recording.

mod config;
mod recorder;
mod sim_predictor;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use colored::Colorize;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use drivelink_hal::sim::synthetic_frame;
use drivelink_hal::{SensorCache, SimVehicle, WaveInput};
use drivelink_middleware::{EventBus, InProcessTransport, PredictionChannel, Topic, WsTransport};
use drivelink_runtime::{ControlLoop, init_tracing};
use drivelink_types::{BATTERY_KEY, DriveError, Telemetry, UpdateMode};

use crate::config::Config;
use crate::recorder::SessionRecorder;
use crate::sim_predictor::SimPredictor;

const FRAME_WIDTH: u32 = 64;
const FRAME_HEIGHT: u32 = 48;
const SENSOR_PERIOD: Duration = Duration::from_millis(33);
const SIM_PREDICTOR_LATENCY: Duration = Duration::from_millis(5);

fn main() -> ExitCode {
    let _tracing = init_tracing("drivelink");
    print_banner();

    let cfg = match load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(drive(cfg)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn load_config() -> Result<Config, DriveError> {
    let (cfg, found) = config::load()?;
    if found {
        println!(
            "  Config loaded from {}",
            config::config_path().display().to_string().bold()
        );
    } else {
        match config::save(&Config::default()) {
            Ok(()) => println!(
                "  Wrote default config to {}",
                config::config_path().display().to_string().bold()
            ),
            Err(e) => warn!(error = %e, "could not write default config"),
        }
    }
    Ok(cfg)
}

async fn drive(cfg: Config) -> Result<(), DriveError> {
    let loop_config = cfg.loop_config();
    loop_config.validate()?;

    let bus = EventBus::default();
    let sensors = SensorCache::new();
    let feed = spawn_sensor_feed(sensors.clone());

    let channel = if cfg.override_enabled {
        Some(open_channel(&cfg).await?)
    } else {
        None
    };

    let recording = match &cfg.recording_dir {
        Some(dir) => {
            let recorder = SessionRecorder::create(dir, chrono::Local::now().date_naive()).await?;
            println!(
                "  Recording to {}",
                recorder.path().display().to_string().bold()
            );
            Some(tokio::spawn(recorder.run(bus.subscribe_to(Topic::Telemetry))))
        }
        None => None,
    };

    let vehicle = SimVehicle::new("sim_car");
    let input = WaveInput::new(loop_config.tick_interval(), Duration::from_secs(6));
    let mut control = ControlLoop::new(
        loop_config,
        Box::new(input),
        Arc::new(vehicle.clone()),
        Arc::new(sensors),
        channel,
        bus.clone(),
    )?;

    let shutdown = control.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the control loop …".yellow().bold());
        shutdown.cancel();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the loop can only be stopped by killing the process");
    }

    println!(
        "  Override {}  ·  supervision {}\n",
        on_off(cfg.override_enabled),
        on_off(cfg.supervision_enabled)
    );

    let ticks = control.run().await;
    drop(control);
    drop(bus);
    feed.abort();

    if let Some(task) = recording {
        match task.await {
            Ok(Ok(lines)) => info!(lines, "recording closed"),
            Ok(Err(e)) => warn!(error = %e, "recording ended with an error"),
            Err(e) => warn!(error = %e, "recorder task failed"),
        }
    }

    println!("{}", format!("  ✓ {ticks} ticks driven").green());
    if let Some(last) = vehicle.last_command() {
        println!(
            "  ✓ Last command: gear {:?}, steering {:.2}, throttle {:.2}",
            last.gear, last.steering, last.throttle
        );
    }
    Ok(())
}

async fn open_channel(cfg: &Config) -> Result<PredictionChannel, DriveError> {
    let supervisor = cfg.supervision_enabled;
    match &cfg.predictor_url {
        Some(url) => {
            print!("\n  Connecting to predictor at {} … ", url.dimmed());
            match WsTransport::connect(url).await {
                Ok(transport) => {
                    println!("{}", "online".green());
                    Ok(PredictionChannel::new(Box::new(transport), supervisor))
                }
                Err(e) => {
                    println!("{}", "offline".red());
                    Err(e)
                }
            }
        }
        None => {
            println!(
                "\n  {}",
                "No predictor_url set; using the simulated predictor.".dimmed()
            );
            let (transport, endpoint) = InProcessTransport::pair(4);
            tokio::spawn(SimPredictor::new(UpdateMode::SteerDiff, SIM_PREDICTOR_LATENCY).serve(endpoint));
            Ok(PredictionChannel::new(Box::new(transport), supervisor))
        }
    }
}

/// Publish a synthetic frame and a slowly draining battery reading.
fn spawn_sensor_feed(cache: SensorCache) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SENSOR_PERIOD);
        let mut tick: u64 = 0;
        loop {
            interval.tick().await;
            let now = Instant::now();
            cache.publish_frame(synthetic_frame(FRAME_WIDTH, FRAME_HEIGHT, tick), now);
            let millivolts = 8400_i64.saturating_sub(i64::try_from(tick / 30).unwrap_or(i64::MAX));
            let mut map = serde_json::Map::new();
            map.insert(BATTERY_KEY.to_string(), json!(millivolts));
            cache.publish_telemetry(Telemetry::new(map), now);
            tick += 1;
        }
    })
}

fn on_off(flag: bool) -> colored::ColoredString {
    if flag { "on".green() } else { "off".dimmed() }
}

fn print_banner() {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║              drivelink               ║".bold().cyan());
    println!("{}", "  ║   supervised remote drive client     ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
}
