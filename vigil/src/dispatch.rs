//! # Asynchronous clip notification
//!
//! Finished clips are handed off to a transport on a dedicated worker thread
//! so that capture loop timing is never stalled by network or IO latency.

use anyhow::Result;
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, SyncSender, TrySendError};
use std::thread::{spawn, JoinHandle};

/// Delivery transport for finished clips.
///
/// Implementations run on the queue worker thread and may block; errors are
/// caught and logged at the dispatch boundary and never reach the capture
/// loop.
pub trait Notifier: Send {
    /// Deliver one finished clip.
    fn notify(&mut self, clip: &Path) -> Result<()>;
}

/// Fallback transport that only logs finished clips.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&mut self, clip: &Path) -> Result<()> {
        info!("Clip finished: {}", clip.display());
        Ok(())
    }
}

/// Bounded handoff queue draining into a single notifier worker.
///
/// [`NotifyQueue::notify`] never blocks; once the queue is at capacity,
/// further clips are dropped with a warning. Dropping the queue closes the
/// channel and joins the worker, so every accepted clip is either delivered
/// or has had its failure logged by then.
pub struct NotifyQueue {
    sender: Option<SyncSender<PathBuf>>,
    handle: Option<JoinHandle<()>>,
}

impl NotifyQueue {
    /// Spawn the worker for the given transport.
    ///
    /// # Arguments
    ///
    /// * `notifier` - transport the worker delivers clips with.
    /// * `capacity` - number of clips that may wait for delivery at once.
    pub fn new(mut notifier: Box<dyn Notifier>, capacity: usize) -> Self {
        let (sender, receiver) = sync_channel::<PathBuf>(capacity);

        let handle = spawn(move || {
            for clip in receiver {
                if let Err(e) = notifier.notify(&clip) {
                    error!("Failed to dispatch {}: {e}", clip.display());
                }
            }
        });

        Self {
            sender: Some(sender),
            handle: Some(handle),
        }
    }

    /// Queue a finished clip for delivery without blocking.
    pub fn notify(&self, clip: PathBuf) {
        if let Some(sender) = &self.sender {
            match sender.try_send(clip) {
                Ok(()) => {}
                Err(TrySendError::Full(clip)) => {
                    warn!("Notification queue full, dropping {}", clip.display())
                }
                Err(TrySendError::Disconnected(clip)) => {
                    error!("Notification worker exited, dropping {}", clip.display())
                }
            }
        }
    }
}

impl Drop for NotifyQueue {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::{channel, Receiver, Sender};
    use std::sync::{Arc, Mutex};

    struct RecordingNotifier {
        seen: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&mut self, clip: &Path) -> Result<()> {
            self.seen.lock().unwrap().push(clip.to_path_buf());
            Ok(())
        }
    }

    /// Signals on entry and stalls until released (or the release side is
    /// dropped).
    struct BlockingNotifier {
        seen: Arc<Mutex<Vec<PathBuf>>>,
        started: Sender<()>,
        release: Receiver<()>,
    }

    impl Notifier for BlockingNotifier {
        fn notify(&mut self, clip: &Path) -> Result<()> {
            let _ = self.started.send(());
            let _ = self.release.recv();
            self.seen.lock().unwrap().push(clip.to_path_buf());
            Ok(())
        }
    }

    #[test]
    fn delivers_each_clip_once_in_order() {
        let seen = Arc::new(Mutex::new(vec![]));
        let queue = NotifyQueue::new(Box::new(RecordingNotifier { seen: seen.clone() }), 4);

        queue.notify(PathBuf::from("a.mp4"));
        queue.notify(PathBuf::from("b.mp4"));
        queue.notify(PathBuf::from("c.mp4"));
        drop(queue);

        assert_eq!(
            *seen.lock().unwrap(),
            ["a.mp4", "b.mp4", "c.mp4"].map(PathBuf::from)
        );
    }

    #[test]
    fn overflow_drops_without_blocking() {
        let (started_tx, started_rx) = channel();
        let (release_tx, release_rx) = channel();
        let seen = Arc::new(Mutex::new(vec![]));

        let queue = NotifyQueue::new(
            Box::new(BlockingNotifier {
                seen: seen.clone(),
                started: started_tx,
                release: release_rx,
            }),
            2,
        );

        queue.notify(PathBuf::from("a.mp4"));
        // Wait until the worker is stuck delivering the first clip, leaving
        // the queue slots empty.
        started_rx.recv().unwrap();

        queue.notify(PathBuf::from("b.mp4"));
        queue.notify(PathBuf::from("c.mp4"));
        // Queue is at capacity; this one must be dropped, not block.
        queue.notify(PathBuf::from("d.mp4"));

        drop(release_tx);
        drop(queue);

        assert_eq!(
            *seen.lock().unwrap(),
            ["a.mp4", "b.mp4", "c.mp4"].map(PathBuf::from)
        );
    }

    #[test]
    fn failures_stay_at_the_boundary() {
        struct FailingNotifier;

        impl Notifier for FailingNotifier {
            fn notify(&mut self, _: &Path) -> Result<()> {
                Err(anyhow::anyhow!("transport down"))
            }
        }

        let queue = NotifyQueue::new(Box::new(FailingNotifier), 2);
        queue.notify(PathBuf::from("a.mp4"));
        queue.notify(PathBuf::from("b.mp4"));
        // The worker consumes the failures; dropping still joins cleanly.
        drop(queue);
    }
}
