//! sleep-sentinel CLI
//!
//! Camera and microphone sleep/wake recorder.

use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use sleep_sentinel::{
    config::{AudioBackend, CameraBackend, Config},
    core::Calibrator,
    monitor::{format_hms, run_monitor, Monitor, RunOptions, RunSummary},
    record::{read_rows, MemoryRecorder, SessionRow, StatusFile},
    ShutdownToken, VERSION,
};

#[derive(Parser)]
#[command(name = "sleep-sentinel")]
#[command(version = VERSION)]
#[command(about = "Camera and microphone sleep/wake recorder", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor until interrupted, recording sleep sessions
    Start {
        /// Skip baseline calibration and use the configured thresholds
        #[arg(long)]
        no_calibrate: bool,

        /// Calibration period per modality, in seconds
        #[arg(long)]
        calibration_secs: Option<u64>,

        /// Replay a recorded MJPEG file instead of the camera
        #[arg(long)]
        camera_file: Option<PathBuf>,

        /// Run without the microphone
        #[arg(long)]
        no_audio: bool,
    },

    /// Measure baseline thresholds and print them
    Calibrate {
        /// Store the measured thresholds in the configuration file
        #[arg(long)]
        save: bool,

        /// Calibration period per modality, in seconds
        #[arg(long)]
        calibration_secs: Option<u64>,
    },

    /// Show the status of a running monitor
    Status,

    /// Show recorded sleep sessions
    History,

    /// Show configuration
    Config,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config_path = cli.config.unwrap_or_else(Config::config_path);

    match cli.command {
        Commands::Start {
            no_calibrate,
            calibration_secs,
            camera_file,
            no_audio,
        } => {
            cmd_start(
                &config_path,
                no_calibrate,
                calibration_secs,
                camera_file,
                no_audio,
            );
        }
        Commands::Calibrate {
            save,
            calibration_secs,
        } => {
            cmd_calibrate(&config_path, save, calibration_secs);
        }
        Commands::Status => {
            cmd_status(&config_path);
        }
        Commands::History => {
            cmd_history(&config_path);
        }
        Commands::Config => {
            cmd_config(&config_path);
        }
    }
}

fn load_config(path: &Path) -> Config {
    match Config::load_from(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading {}: {e}", path.display());
            std::process::exit(1);
        }
    }
}

fn install_shutdown() -> ShutdownToken {
    let shutdown = ShutdownToken::new();
    if let Err(e) = shutdown.install_signal_handler() {
        eprintln!("Error setting signal handler: {e}");
        std::process::exit(1);
    }
    shutdown
}

fn cmd_start(
    config_path: &Path,
    no_calibrate: bool,
    calibration_secs: Option<u64>,
    camera_file: Option<PathBuf>,
    no_audio: bool,
) {
    let mut config = load_config(config_path);
    if let Some(secs) = calibration_secs {
        config.calibration_duration = Duration::from_secs(secs);
    }
    if let Some(file) = camera_file {
        config.camera.backend = CameraBackend::File;
        config.camera.file = Some(file);
    }
    if no_audio {
        config.audio.backend = AudioBackend::Disabled;
    }
    let calibrate = config.calibrate_on_start && !no_calibrate;

    println!("sleep-sentinel v{VERSION}");
    println!();
    println!("  Data directory: {}", config.data_path.display());
    println!("  Camera: {:?}", config.camera.backend);
    println!("  Audio: {:?}", config.audio.backend);
    println!(
        "  Sleep after {}s still, wake after {}s active, {} snores in {}s",
        config.timings.sleep_threshold.as_secs(),
        config.timings.wake_grace.as_secs(),
        config.timings.snore_count,
        config.timings.snore_window.as_secs()
    );
    if calibrate {
        println!(
            "  Calibration: {}s per modality (keep still and quiet)",
            config.calibration_duration.as_secs()
        );
    } else {
        println!("  Calibration: skipped");
    }
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let session_log = config.session_log_path();
    let shutdown = install_shutdown();

    let summary = match run_monitor(config, RunOptions { calibrate }, &shutdown) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("Error starting monitor: {e}");
            std::process::exit(1);
        }
    };

    println!();
    print_run_summary(&summary);
    println!();
    match read_rows(&session_log) {
        Ok(rows) => print_history(&rows),
        Err(e) => eprintln!("Warning: Could not read session log: {e}"),
    }
}

fn print_run_summary(summary: &RunSummary) {
    println!("Run Summary");
    println!("===========");
    println!("  Instance ID: {}", summary.instance_id);
    println!(
        "  Ran from {} to {}",
        summary.started_at.format("%Y-%m-%d %H:%M:%S"),
        summary.ended_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!("  Ticks: {}", summary.ticks);
    if let Some(calibration) = &summary.calibration {
        println!(
            "  Thresholds: motion {:.0}, silence {:.0}, snore {:.0}",
            calibration.motion_threshold,
            calibration.silence_threshold,
            calibration.snore_threshold
        );
    }
    println!("  Sessions recorded: {}", summary.sessions.len());
    println!("  Total sleep: {}", format_hms(summary.total_sleep_seconds));
}

fn cmd_calibrate(config_path: &Path, save: bool, calibration_secs: Option<u64>) {
    let mut config = load_config(config_path);
    if let Some(secs) = calibration_secs {
        config.calibration_duration = Duration::from_secs(secs);
    }

    let shutdown = install_shutdown();
    let calibrator = Calibrator::new(config.calibration_duration);

    println!(
        "Calibrating for {}s per modality. Keep still and quiet.",
        config.calibration_duration.as_secs()
    );

    let mut monitor = Monitor::from_config(config.clone(), Box::new(MemoryRecorder::default()));
    if !monitor.camera_available() {
        eprintln!("Warning: Camera unavailable, motion threshold unchanged");
    }
    if !monitor.audio_available() {
        eprintln!("Warning: Microphone unavailable, audio thresholds unchanged");
    }
    let result = monitor.calibrate(&calibrator, &shutdown);
    monitor.finish(Local::now());

    println!();
    println!("Calibrated thresholds:");
    println!("  Motion:  {:.1}", result.motion_threshold);
    println!("  Silence: {:.1}", result.silence_threshold);
    println!("  Snore:   {:.1}", result.snore_threshold);

    if save {
        config.thresholds.apply(&result);
        config.calibrate_on_start = false;
        if let Err(e) = config.save_to(config_path) {
            eprintln!("Error saving config: {e}");
            std::process::exit(1);
        }
        println!();
        println!("Saved to {}", config_path.display());
        println!("Calibration on start disabled; the saved thresholds will be used.");
    }
}

fn cmd_status(config_path: &Path) {
    let config = load_config(config_path);

    println!("sleep-sentinel Status");
    println!("=====================");
    println!();

    let pid_path = config.pid_path();
    match std::fs::read_to_string(&pid_path) {
        Ok(pid) => println!("PID file: {} (pid {})", pid_path.display(), pid.trim()),
        Err(_) => println!("PID file: none"),
    }

    match StatusFile::new(config.status_path()).read() {
        Ok(Some(report)) => {
            println!("Running: {}", report.running);
            if let Some(id) = report.instance_id {
                println!("Instance ID: {id}");
            }
            if let Some(start) = &report.start_time {
                println!("Started: {start}");
            }
            println!("Sleeping: {}", report.is_sleeping);
            println!("Total sleep: {}", format_hms(report.total_sleep_seconds));
            println!("Last update: {}", report.last_update);
        }
        Ok(None) => println!("No status recorded yet."),
        Err(e) => eprintln!("Error reading status: {e}"),
    }
}

fn cmd_history(config_path: &Path) {
    let config = load_config(config_path);
    match read_rows(&config.session_log_path()) {
        Ok(rows) => print_history(&rows),
        Err(e) => {
            eprintln!("Error reading session log: {e}");
            std::process::exit(1);
        }
    }
}

fn print_history(rows: &[SessionRow]) {
    if rows.is_empty() {
        println!("No sleep sessions recorded.");
        return;
    }

    println!(
        "{:<12} {:<10} {:<10} {:>9} {:>6}",
        "Date", "Start", "End", "Duration", "Snore"
    );
    println!("{}", "-".repeat(51));
    for row in rows {
        println!(
            "{:<12} {:<10} {:<10} {:>5}h{:02}m {:>6}",
            row.date,
            row.sleep_start,
            row.sleep_end,
            row.duration_hours,
            row.duration_minutes,
            if row.snore_detected { "yes" } else { "no" }
        );
    }
    let total_minutes: i64 = rows.iter().map(SessionRow::total_minutes).sum();
    println!();
    println!(
        "{} session(s), {}h {}m in total",
        rows.len(),
        total_minutes / 60,
        total_minutes % 60
    );
}

fn cmd_config(config_path: &Path) {
    let config = load_config(config_path);

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {}", config_path.display());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}
