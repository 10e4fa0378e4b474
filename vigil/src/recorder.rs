//! # Recording state machine
//!
//! Owns the Idle/Recording mode, clip start and stop timing, and frame
//! hand-off to the clip writer. Clips are fixed duration: once a session
//! starts, every frame is written until the configured wall-clock duration
//! elapses, whether or not motion persists.

use crate::dispatch::NotifyQueue;
use crate::frame::Frame;
use anyhow::Result;
use chrono::{DateTime, Local};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Sink for the frames of one recording session.
///
/// The controller drives a strict `open` / `write`* / `close` lifecycle and
/// never accesses the sink outside it. After `close`, the file at the opened
/// path is a complete, independently playable artifact.
pub trait RecordingSink {
    /// Start a clip at the given path, frame rate and dimensions.
    fn open(&mut self, path: &Path, frame_rate: f64, width: usize, height: usize) -> Result<()>;

    /// Append one frame. Dimensions must match the ones passed to `open`.
    fn write(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and finalise the clip.
    fn close(&mut self) -> Result<()>;
}

/// Recording mode of the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Recording,
}

/// Controller tunables.
#[derive(Clone, Debug)]
pub struct RecorderConfig {
    /// Directory finished clips are written to.
    pub output_dir: PathBuf,
    /// Wall-clock length of every clip.
    pub record_duration: Duration,
    /// Frame rate the clip writer is opened with.
    pub frame_rate: f64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_dir: "recorded_videos".into(),
            record_duration: Duration::from_secs(3),
            frame_rate: 20.0,
        }
    }
}

/// Derive the clip path for a session starting at `stamp`.
pub fn clip_path(dir: &Path, stamp: &DateTime<Local>) -> PathBuf {
    dir.join(format!("motion_{}.mp4", stamp.format("%Y%m%d_%H%M%S")))
}

struct Session {
    start: Instant,
    path: PathBuf,
}

/// Recording trigger state machine.
///
/// Fed once per capture cycle with the current frame and the motion verdict.
/// At most one session is open at any time; motion during an active session
/// neither opens a second clip nor resets the timer. Writer failures are
/// session-local: the controller logs, drops the session and returns to
/// idle, leaving the capture loop running.
pub struct RecordingController {
    config: RecorderConfig,
    sink: Box<dyn RecordingSink>,
    queue: NotifyQueue,
    session: Option<Session>,
}

impl RecordingController {
    pub fn new(config: RecorderConfig, sink: Box<dyn RecordingSink>, queue: NotifyQueue) -> Self {
        Self {
            config,
            sink,
            queue,
            session: None,
        }
    }

    pub fn mode(&self) -> Mode {
        if self.session.is_some() {
            Mode::Recording
        } else {
            Mode::Idle
        }
    }

    /// Advance the state machine by one capture cycle.
    ///
    /// # Arguments
    ///
    /// * `frame` - the frame read this cycle.
    /// * `motion` - whether the classifier reported motion for this cycle.
    /// * `now` - monotonic timestamp of this cycle.
    pub fn on_frame(&mut self, frame: &Frame, motion: bool, now: Instant) {
        if self.session.is_none() {
            if motion {
                self.start_session(frame, now);
            }
            return;
        }

        // Not motion-gated: an active session records every frame until the
        // duration elapses.
        if let Err(e) = self.sink.write(frame) {
            error!("Failed to write frame: {e}");
            self.abort_session();
            return;
        }

        let elapsed = self
            .session
            .as_ref()
            .map(|s| now.duration_since(s.start))
            .unwrap_or_default();

        if elapsed >= self.config.record_duration {
            self.finalize_session();
        }
    }

    /// Finalise any open session without dispatching it.
    ///
    /// Called on shutdown so no partially written file is left open.
    pub fn finish(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = self.sink.close() {
                error!("Failed to finalise {}: {e}", session.path.display());
            } else {
                info!("Recording saved as {}", session.path.display());
            }
        }
    }

    fn start_session(&mut self, frame: &Frame, now: Instant) {
        let path = clip_path(&self.config.output_dir, &Local::now());
        let (width, height) = frame.dim();

        if let Err(e) = self
            .sink
            .open(&path, self.config.frame_rate, width, height)
        {
            error!("Failed to open clip writer for {}: {e}", path.display());
            return;
        }

        info!("Started recording: {}", path.display());

        // The triggering frame is the first frame of the clip.
        if let Err(e) = self.sink.write(frame) {
            error!("Failed to write frame: {e}");
            if let Err(e) = self.sink.close() {
                error!("Failed to close clip writer: {e}");
            }
            return;
        }

        self.session = Some(Session { start: now, path });
    }

    fn finalize_session(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = self.sink.close() {
                // Do not announce a clip that may not have flushed fully.
                error!("Failed to finalise {}: {e}", session.path.display());
                return;
            }
            info!("Recording saved as {}", session.path.display());
            self.queue.notify(session.path);
        }
    }

    fn abort_session(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = self.sink.close() {
                error!("Failed to close clip writer: {e}");
            }
            warn!("Session {} aborted", session.path.display());
        }
    }
}
