//! Presenter: consumer of detection status, messages and confirmations.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rollcall_core::{Confirmation, DetectionStatus, MessageLevel};
use serde::Serialize;
use tokio::time::Instant;

/// Receives everything the detection loop wants the operator to see.
pub trait Presenter: Send + Sync {
    fn on_status(&self, status: &DetectionStatus);
    fn on_message(&self, text: &str, level: MessageLevel);
    fn on_confirmed(&self, confirmation: &Confirmation);
}

/// How long a confirmation stays on display.
pub const CONFIRMATION_DISPLAY: Duration = Duration::from_millis(5_000);

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub text: String,
    pub level: MessageLevel,
}

/// What an operator display would currently show.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PresenterSnapshot {
    pub status: Option<DetectionStatus>,
    pub message: Option<Message>,
    pub confirmation: Option<Confirmation>,
}

#[derive(Default)]
struct Board {
    status: Option<DetectionStatus>,
    message: Option<Message>,
    confirmation: Option<(Confirmation, Instant)>,
}

/// Presenter used by the daemon: mirrors every event into the log and keeps
/// the latest state for the D-Bus `Status` call.
pub struct DaemonPresenter {
    board: Mutex<Board>,
    display_window: Duration,
}

impl Default for DaemonPresenter {
    fn default() -> Self {
        Self::new(CONFIRMATION_DISPLAY)
    }
}

impl DaemonPresenter {
    pub fn new(display_window: Duration) -> Self {
        Self {
            board: Mutex::new(Board::default()),
            display_window,
        }
    }

    /// Current display state. A confirmation is cleared once its display
    /// window has passed.
    pub fn snapshot(&self) -> PresenterSnapshot {
        let mut board = self.board();
        let expired = board
            .confirmation
            .as_ref()
            .is_some_and(|(_, shown_at)| shown_at.elapsed() >= self.display_window);
        if expired {
            board.confirmation = None;
        }
        PresenterSnapshot {
            status: board.status.clone(),
            message: board.message.clone(),
            confirmation: board.confirmation.as_ref().map(|(c, _)| c.clone()),
        }
    }

    fn board(&self) -> MutexGuard<'_, Board> {
        self.board.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Presenter for DaemonPresenter {
    fn on_status(&self, status: &DetectionStatus) {
        tracing::info!(status = ?status, "{status}");
        self.board().status = Some(status.clone());
    }

    fn on_message(&self, text: &str, level: MessageLevel) {
        match level {
            MessageLevel::Error => tracing::error!(text, "operator message"),
            MessageLevel::Info | MessageLevel::Success => {
                tracing::info!(level = ?level, text, "operator message")
            }
        }
        self.board().message = Some(Message {
            text: text.to_string(),
            level,
        });
    }

    fn on_confirmed(&self, confirmation: &Confirmation) {
        let employee = &confirmation.employee;
        tracing::info!(
            emp_id = %employee.emp_id,
            name = %employee.name,
            department = employee.department.as_deref().unwrap_or("-"),
            at = %confirmation.timestamp.format("%Y-%m-%d %H:%M:%S"),
            "attendance confirmed"
        );
        self.board().confirmation = Some((confirmation.clone(), Instant::now()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::Employee;

    fn confirmation() -> Confirmation {
        Confirmation {
            employee: Employee {
                emp_id: "E1".into(),
                name: "Alice".into(),
                department: None,
            },
            timestamp: chrono::Local::now(),
        }
    }

    #[test]
    fn test_snapshot_tracks_latest_events() {
        let presenter = DaemonPresenter::default();
        presenter.on_status(&DetectionStatus::Scanning);
        presenter.on_status(&DetectionStatus::NoFaceDetected);
        presenter.on_message("Face not recognized", MessageLevel::Info);

        let snapshot = presenter.snapshot();
        assert_eq!(snapshot.status, Some(DetectionStatus::NoFaceDetected));
        assert_eq!(snapshot.message.unwrap().text, "Face not recognized");
        assert!(snapshot.confirmation.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_clears_after_display_window() {
        let presenter = DaemonPresenter::default();
        presenter.on_confirmed(&confirmation());

        tokio::time::sleep(Duration::from_millis(4_999)).await;
        assert!(presenter.snapshot().confirmation.is_some());

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(presenter.snapshot().confirmation.is_none());
    }

    #[test]
    fn test_snapshot_serializes() {
        let presenter = DaemonPresenter::default();
        presenter.on_status(&DetectionStatus::Recognized("Alice".into()));
        presenter.on_confirmed(&confirmation());

        let json = serde_json::to_value(presenter.snapshot()).unwrap();
        assert_eq!(json["status"]["state"], "recognized");
        assert_eq!(json["confirmation"]["employee"]["emp_id"], "E1");
    }
}
