use std::sync::Arc;

use anyhow::{Context, Result};
use rollcall_core::{CooldownRegistry, HttpRecognizer};
use rollcall_hw::{FrameSampler, V4lCamera};
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod presenter;

use config::{BusKind, Config};
use dbus_interface::{AttendanceService, BUS_NAME, OBJECT_PATH};
use engine::DetectionLoop;
use presenter::DaemonPresenter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::load().context("failed to load configuration")?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        camera = %config.camera_device,
        service = %config.service_url,
        "rollcalld starting"
    );

    let camera = V4lCamera::new(
        config.camera_device.clone(),
        config.frame_width,
        config.frame_height,
        config.warmup_frames,
    );
    let recognizer = HttpRecognizer::new(&config.recognizer_config())
        .context("failed to build recognition client")?;
    tracing::info!(endpoint = %recognizer.endpoint(), "recognition client ready");

    let timing = config.loop_timing();
    let presenter = Arc::new(DaemonPresenter::new(timing.display_window));
    let engine = DetectionLoop::new(
        Arc::new(camera),
        FrameSampler::new(config.jpeg_quality),
        Arc::new(recognizer),
        CooldownRegistry::new(config.cooldown_window()),
        presenter.clone(),
        timing,
    );

    let service = AttendanceService::new(engine.clone(), presenter);
    let builder = match config.bus {
        BusKind::Session => zbus::connection::Builder::session()?,
        BusKind::System => zbus::connection::Builder::system()?,
    };
    let _connection = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .with_context(|| format!("failed to register {BUS_NAME} on the {:?} bus", config.bus))?;

    tracing::info!(bus = ?config.bus, name = BUS_NAME, path = OBJECT_PATH, "rollcalld ready");

    if config.autostart {
        if let Err(e) = engine.start().await {
            tracing::error!(error = %e, "autostart failed; waiting for Start()");
        }
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");
    engine.stop();

    Ok(())
}
