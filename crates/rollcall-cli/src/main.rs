use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall_hw::{FrameSampler, V4lCamera, VideoSource};

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance kiosk CLI")]
struct Cli {
    /// Talk to the daemon on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the detection loop
    Start,
    /// Stop the detection loop
    Stop,
    /// Show daemon status
    Status,
    /// List V4L2 capture devices
    Devices,
    /// Capture one frame directly from the camera (bypasses the daemon)
    Test {
        /// V4L2 device path
        #[arg(short, long, default_value = "/dev/video0")]
        device: String,
        /// Write the encoded JPEG to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[zbus::proxy(
    interface = "org.rollcall.Attendance1",
    default_service = "org.rollcall.Attendance1",
    default_path = "/org/rollcall/Attendance1"
)]
trait Attendance {
    async fn start(&self) -> zbus::Result<bool>;
    async fn stop(&self) -> zbus::Result<bool>;
    async fn status(&self) -> zbus::Result<String>;
}

async fn connect(system: bool) -> Result<AttendanceProxy<'static>> {
    let connection = if system {
        zbus::Connection::system().await
    } else {
        zbus::Connection::session().await
    }
    .context("failed to connect to D-Bus")?;
    AttendanceProxy::new(&connection)
        .await
        .context("failed to reach rollcalld")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start => {
            let proxy = connect(cli.system).await?;
            if proxy.start().await? {
                println!("Detection running");
            } else {
                println!("Detection did not start");
            }
        }
        Commands::Stop => {
            let proxy = connect(cli.system).await?;
            if proxy.stop().await? {
                println!("Detection stopped");
            } else {
                println!("Detection was not running");
            }
        }
        Commands::Status => {
            let proxy = connect(cli.system).await?;
            let raw = proxy.status().await?;
            let status: serde_json::Value =
                serde_json::from_str(&raw).context("daemon returned malformed status")?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Devices => {
            let devices = V4lCamera::list_devices();
            if devices.is_empty() {
                println!("No capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
        Commands::Test { device, output } => camera_test(&device, output)?,
    }

    Ok(())
}

fn camera_test(device: &str, output: Option<PathBuf>) -> Result<()> {
    tracing::debug!(device, "running camera test");
    println!("Opening {device}...");
    let camera = V4lCamera::new(device, 640, 480, 0);
    let mut source = camera
        .open()
        .with_context(|| format!("failed to open {device}"))?;
    let (width, height) = source.dimensions();
    println!("  format: {:?} {width}x{height}", source.pixel_format());

    let sampler = FrameSampler::default();
    let started = Instant::now();
    let frame = sampler.capture(&mut source).context("capture failed")?;
    println!(
        "  frame #{}: {} bytes JPEG (q{}) in {:?}",
        frame.sequence,
        frame.jpeg.len(),
        sampler.quality(),
        started.elapsed()
    );
    println!("  data URL: {} chars", frame.to_data_url().len());

    if let Some(path) = output {
        std::fs::write(&path, &frame.jpeg)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("  written to {}", path.display());
    }
    Ok(())
}
