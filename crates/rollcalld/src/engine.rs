//! Detection loop: samples the camera on a fixed cadence, sends frames to the
//! recognition service and turns the answers into operator-facing status.
//!
//! At most one tick is in flight at a time. A tick that fires while the
//! previous one is still waiting on the service is dropped, never queued.
//! Every session has a generation; results and timers belonging to a
//! stopped session never reach the presenter.
//!
//! Camera work (acquisition, frame reads, JPEG encoding) runs on the blocking
//! pool. A tick owns the video source while it reads, so `stop` never waits
//! on the camera.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rollcall_core::{
    Confirmation, CooldownRegistry, DetectionStatus, MessageLevel, RecognitionResult, Recognizer,
};
use rollcall_hw::{CameraError, CameraProvider, FrameSampler, SampleError, VideoSource};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::presenter::Presenter;

const REGISTRATION_REQUIRED: &str = "Face not recognized. Please register first.";

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("camera task failed: {0}")]
    CameraTask(#[from] tokio::task::JoinError),
}

/// Cadence of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopTiming {
    /// Time between ticks.
    pub tick_interval: Duration,
    /// How long `Recognized` stays up before reverting to `Scanning`.
    pub display_window: Duration,
}

impl Default for LoopTiming {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(2_000),
            display_window: Duration::from_millis(5_000),
        }
    }
}

/// Clone-safe handle to the detection loop.
#[derive(Clone)]
pub struct DetectionLoop {
    inner: Arc<Inner>,
}

struct Inner {
    camera: Arc<dyn CameraProvider>,
    sampler: FrameSampler,
    recognizer: Arc<dyn Recognizer>,
    cooldown: CooldownRegistry,
    presenter: Arc<dyn Presenter>,
    timing: LoopTiming,
    /// Serializes `start` calls while the camera is being acquired.
    lifecycle: tokio::sync::Mutex<()>,
    session: Mutex<Option<DetectionSession>>,
    gate: Mutex<Gate>,
    next_generation: AtomicU64,
}

/// Guards every presenter emission. Only the live generation may emit.
#[derive(Default)]
struct Gate {
    live: Option<u64>,
    status: Option<DetectionStatus>,
}

struct DetectionSession {
    ticker: JoinHandle<()>,
    ctx: TickContext,
}

/// State shared by the ticker and the ticks of one session.
#[derive(Clone)]
struct TickContext {
    generation: u64,
    source: Arc<Mutex<SourceSlot>>,
    processing: Arc<AtomicBool>,
}

/// A tick takes the source out for the duration of a read. Once `closed` is
/// set the tick releases the source instead of putting it back.
struct SourceSlot {
    source: Option<Box<dyn VideoSource>>,
    closed: bool,
}

impl TickContext {
    fn take_source(&self) -> Option<Box<dyn VideoSource>> {
        let mut slot = lock(&self.source);
        if slot.closed {
            return None;
        }
        slot.source.take()
    }

    fn restore_source(&self, camera: &dyn CameraProvider, source: Box<dyn VideoSource>) {
        let mut slot = lock(&self.source);
        if slot.closed {
            drop(slot);
            tracing::debug!(generation = self.generation, "session ended during read");
            camera.release(source);
        } else {
            slot.source = Some(source);
        }
    }
}

/// Holds the session's processing flag for the duration of a tick and
/// clears it on drop, whichever way the tick ends.
struct InFlight(Arc<AtomicBool>);

impl InFlight {
    fn try_begin(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl DetectionLoop {
    pub fn new(
        camera: Arc<dyn CameraProvider>,
        sampler: FrameSampler,
        recognizer: Arc<dyn Recognizer>,
        cooldown: CooldownRegistry,
        presenter: Arc<dyn Presenter>,
        timing: LoopTiming,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                camera,
                sampler,
                recognizer,
                cooldown,
                presenter,
                timing,
                lifecycle: tokio::sync::Mutex::new(()),
                session: Mutex::new(None),
                gate: Mutex::new(Gate::default()),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Acquire the camera and begin ticking.
    ///
    /// A no-op if a session is already active. On camera failure the loop
    /// stays idle and reports `ErrorState`.
    pub async fn start(&self) -> Result<(), EngineError> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        if self.is_running() {
            tracing::debug!("start requested while already running");
            return Ok(());
        }

        let camera = Arc::clone(&self.inner.camera);
        let acquired = match tokio::task::spawn_blocking(move || camera.acquire()).await {
            Ok(result) => result.map_err(EngineError::from),
            Err(e) => Err(EngineError::from(e)),
        };
        let source = match acquired {
            Ok(source) => source,
            Err(e) => {
                tracing::error!(error = %e, "camera acquisition failed");
                let mut gate = lock(&self.inner.gate);
                self.inner.set_status(&mut gate, DetectionStatus::ErrorState);
                self.inner
                    .presenter
                    .on_message(&format!("Error accessing camera: {e}"), MessageLevel::Error);
                return Err(e);
            }
        };

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            generation,
            source = %source.describe(),
            interval_ms = self.inner.timing.tick_interval.as_millis() as u64,
            "detection started"
        );

        {
            let mut gate = lock(&self.inner.gate);
            gate.live = Some(generation);
            self.inner.set_status(&mut gate, DetectionStatus::Scanning);
        }

        let ctx = TickContext {
            generation,
            source: Arc::new(Mutex::new(SourceSlot {
                source: Some(source),
                closed: false,
            })),
            processing: Arc::new(AtomicBool::new(false)),
        };
        let ticker = tokio::spawn(run_ticker(Arc::clone(&self.inner), ctx.clone()));
        *lock(&self.inner.session) = Some(DetectionSession { ticker, ctx });
        Ok(())
    }

    /// Cancel ticking and release the camera.
    ///
    /// Returns `false` if no session was active. A recognition call already
    /// in flight is left to finish; its result is discarded.
    pub fn stop(&self) -> bool {
        let mut slot = lock(&self.inner.session);
        let Some(session) = slot.take() else {
            tracing::debug!("stop requested while idle");
            return false;
        };

        lock(&self.inner.gate).live = None;
        session.ticker.abort();
        session.ctx.processing.store(false, Ordering::Release);

        let source = {
            let mut source_slot = lock(&session.ctx.source);
            source_slot.closed = true;
            source_slot.source.take()
        };
        match source {
            Some(source) => self.inner.camera.release(source),
            None => tracing::debug!("frame read in flight; its tick releases the source"),
        }

        tracing::info!(generation = session.ctx.generation, "detection stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner.session).is_some()
    }

    /// Last status reported to the presenter, if any.
    pub fn status(&self) -> Option<DetectionStatus> {
        lock(&self.inner.gate).status.clone()
    }

    pub fn cooldown(&self) -> &CooldownRegistry {
        &self.inner.cooldown
    }
}

impl Inner {
    fn set_status(&self, gate: &mut Gate, status: DetectionStatus) {
        self.presenter.on_status(&status);
        gate.status = Some(status);
    }

    /// Lock the gate if `generation` is still live.
    fn live_gate(&self, generation: u64) -> Option<MutexGuard<'_, Gate>> {
        let gate = lock(&self.gate);
        (gate.live == Some(generation)).then_some(gate)
    }

    fn apply(self: &Arc<Self>, generation: u64, result: RecognitionResult) {
        let Some(mut gate) = self.live_gate(generation) else {
            tracing::debug!(generation, kind = result.kind(), "discarding result of stopped session");
            return;
        };

        match result {
            RecognitionResult::Success { employee, message } => {
                let name = employee.name.clone();
                if self.cooldown.is_suppressed(&employee.emp_id) {
                    tracing::debug!(emp_id = %employee.emp_id, "already marked within cooldown");
                    self.set_status(&mut gate, DetectionStatus::AlreadyMarked(name));
                    return;
                }

                self.cooldown.confirm(&employee.emp_id);
                let text = if message.is_empty() {
                    format!("Attendance marked for {name}")
                } else {
                    message
                };
                self.presenter.on_confirmed(&Confirmation {
                    employee,
                    timestamp: chrono::Local::now(),
                });
                self.presenter.on_message(&text, MessageLevel::Success);
                self.set_status(&mut gate, DetectionStatus::Recognized(name));
                self.schedule_revert(generation);
            }
            RecognitionResult::NoFace(_) => {
                self.set_status(&mut gate, DetectionStatus::NoFaceDetected);
            }
            RecognitionResult::NotFound(_) => {
                self.set_status(&mut gate, DetectionStatus::NotRecognized);
                self.presenter.on_message(REGISTRATION_REQUIRED, MessageLevel::Info);
            }
            RecognitionResult::Rejected(message) => {
                tracing::debug!(message = %message, "unclassified service response");
                self.set_status(&mut gate, DetectionStatus::Scanning);
            }
            RecognitionResult::Error(message) => {
                tracing::warn!(error = %message, "recognition failed");
                self.set_status(&mut gate, DetectionStatus::ErrorState);
                self.presenter
                    .on_message(&format!("Recognition failed: {message}"), MessageLevel::Error);
            }
        }
    }

    fn report_capture_failure(&self, generation: u64, error: &dyn std::fmt::Display) {
        if let Some(mut gate) = self.live_gate(generation) {
            self.set_status(&mut gate, DetectionStatus::ErrorState);
            self.presenter
                .on_message(&format!("Capture failed: {error}"), MessageLevel::Error);
        }
    }

    /// Put `Scanning` back after the display window, unless the session ended.
    fn schedule_revert(self: &Arc<Self>, generation: u64) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(inner.timing.display_window).await;
            if let Some(mut gate) = inner.live_gate(generation) {
                inner.set_status(&mut gate, DetectionStatus::Scanning);
            }
        });
    }
}

async fn run_ticker(inner: Arc<Inner>, ctx: TickContext) {
    let period = inner.timing.tick_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let Some(in_flight) = InFlight::try_begin(&ctx.processing) else {
            tracing::trace!(generation = ctx.generation, "previous tick in flight; skipping");
            continue;
        };
        tokio::spawn(run_tick(Arc::clone(&inner), ctx.clone(), in_flight));
    }
}

async fn run_tick(inner: Arc<Inner>, ctx: TickContext, _in_flight: InFlight) {
    let Some(mut source) = ctx.take_source() else {
        tracing::trace!("no video source; skipping tick");
        return;
    };

    let sampler = inner.sampler;
    let read = tokio::task::spawn_blocking(move || {
        let sampled = sampler.capture(&mut *source);
        (source, sampled)
    })
    .await;

    let sampled = match read {
        Ok((source, sampled)) => {
            ctx.restore_source(inner.camera.as_ref(), source);
            sampled
        }
        Err(e) => {
            tracing::error!(error = %e, "frame read task failed");
            inner.report_capture_failure(ctx.generation, &e);
            return;
        }
    };

    let frame = match sampled {
        Ok(frame) => frame,
        Err(SampleError::NoFrame) => {
            tracing::trace!("no frame available yet; skipping tick");
            return;
        }
        Err(e) => {
            tracing::warn!(error = %e, "frame capture failed");
            inner.report_capture_failure(ctx.generation, &e);
            return;
        }
    };

    match inner.live_gate(ctx.generation) {
        Some(mut gate) => inner.set_status(&mut gate, DetectionStatus::Processing),
        None => return,
    }

    let image = frame.to_data_url();
    let result = inner.recognizer.recognize(&image).await;
    tracing::debug!(
        generation = ctx.generation,
        sequence = frame.sequence,
        kind = result.kind(),
        "recognition finished"
    );
    inner.apply(ctx.generation, result);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
