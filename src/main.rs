//! Face tracking rig: camera, face detector and a pan/tilt servo mount.

use anyhow::{Context, Result};
use clap::Parser;
use face_servo_tracker::{
    app::{self, RunOptions},
    config::{Config, MicroControllerBackend, EXAMPLE_CONFIG},
    Error,
};
use log::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long)]
    config: Option<String>,

    /// Camera index to use
    #[arg(long)]
    camera: Option<i32>,

    /// Frame width in pixels
    #[arg(long)]
    width: Option<usize>,

    /// Frame height in pixels
    #[arg(long)]
    height: Option<usize>,

    /// Drive servos over this serial port instead of the dry-run backend
    #[arg(short, long)]
    serial_port: Option<String>,

    /// Serial baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Run without a window
    #[arg(long)]
    headless: bool,

    /// Use the synthetic camera and detector
    #[arg(long)]
    simulate: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    /// Print the example configuration and exit
    #[arg(long)]
    print_config: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(index) = self.camera {
            config.camera.index = index;
        }
        if let Some(width) = self.width {
            config.camera.width = width;
        }
        if let Some(height) = self.height {
            config.camera.height = height;
        }
        if let Some(port) = &self.serial_port {
            config.microcontroller.backend = MicroControllerBackend::Serial;
            config.microcontroller.port.clone_from(port);
        }
        if let Some(baud) = self.baud {
            config.microcontroller.baud_rate = baud;
        }
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    if args.print_config {
        print!("{EXAMPLE_CONFIG}");
        return Ok(());
    }

    // Initialize logger
    if args.debug {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));
    } else {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    }

    info!("Face Servo Tracker");

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from: {path}");
            Config::from_file(path).with_context(|| format!("Failed to load config file {path}"))?
        }
        None => Config::default(),
    };
    args.apply(&mut config);

    let options = RunOptions {
        headless: args.headless,
        simulate: args.simulate,
        handle_signals: true,
    };

    match app::run(&config, options) {
        Ok(report) => {
            info!(
                "Shut down cleanly: {} frames captured, {} servo updates, {} detections",
                report.capture.frames_captured, report.capture.servo_updates, report.detector.detections
            );
            Ok(())
        }
        Err(e @ Error::ShutdownTimeout(_)) => {
            error!("{e}; forcing exit");
            std::process::exit(2);
        }
        Err(e) => Err(e).context("Face tracker failed"),
    }
}
