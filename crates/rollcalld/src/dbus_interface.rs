//! D-Bus control surface of the daemon.

use std::sync::Arc;

use zbus::interface;

use crate::engine::DetectionLoop;
use crate::presenter::DaemonPresenter;

pub const BUS_NAME: &str = "org.rollcall.Attendance1";
pub const OBJECT_PATH: &str = "/org/rollcall/Attendance1";

/// D-Bus interface for the Rollcall attendance daemon.
///
/// Bus name: org.rollcall.Attendance1
/// Object path: /org/rollcall/Attendance1
pub struct AttendanceService {
    engine: DetectionLoop,
    presenter: Arc<DaemonPresenter>,
}

impl AttendanceService {
    pub fn new(engine: DetectionLoop, presenter: Arc<DaemonPresenter>) -> Self {
        Self { engine, presenter }
    }

    fn status_json(&self) -> serde_json::Value {
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "running": self.engine.is_running(),
            "cooldown_active": self.engine.cooldown().len(),
            "display": self.presenter.snapshot(),
        })
    }
}

#[interface(name = "org.rollcall.Attendance1")]
impl AttendanceService {
    /// Start the detection loop. Returns whether it is running afterwards.
    async fn start(&self) -> zbus::fdo::Result<bool> {
        tracing::info!("start requested");
        self.engine
            .start()
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        Ok(self.engine.is_running())
    }

    /// Stop the detection loop. Returns false if it was not running.
    async fn stop(&self) -> zbus::fdo::Result<bool> {
        tracing::info!("stop requested");
        Ok(self.engine.stop())
    }

    /// Return daemon and display state as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(self.status_json().to_string())
    }
}
