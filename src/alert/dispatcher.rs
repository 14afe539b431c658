use anyhow::{Context, Result};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::player::AlertPlayer;
use crate::drowsiness::DetectionEvent;

/// Message to the alert worker
#[derive(Debug)]
pub enum AlertRequest {
    Play(DetectionEvent),
}

/// Message back from the alert worker once playback is over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertFinished {
    pub event: DetectionEvent,
    /// false if playback failed; the alert still counts as finished
    pub played: bool,
}

/// Posts play requests to a dedicated worker thread and collects completions.
///
/// `dispatch` never blocks. The worker is not joined: dropping the dispatcher
/// closes the request channel and the worker exits after any in-flight
/// playback.
pub struct AlertDispatcher {
    requests: Sender<AlertRequest>,
    finished: Receiver<AlertFinished>,
    in_flight: usize,
}

impl AlertDispatcher {
    pub fn spawn(player: Box<dyn AlertPlayer>) -> Result<Self> {
        let (request_tx, request_rx) = mpsc::channel::<AlertRequest>();
        let (finished_tx, finished_rx) = mpsc::channel::<AlertFinished>();

        thread::Builder::new()
            .name("alert-worker".to_string())
            .spawn(move || run_worker(player, request_rx, finished_tx))
            .context("Failed to spawn alert worker")?;

        Ok(Self {
            requests: request_tx,
            finished: finished_rx,
            in_flight: 0,
        })
    }

    pub fn dispatch(&mut self, event: DetectionEvent) -> Result<()> {
        self.requests
            .send(AlertRequest::Play(event))
            .map_err(|_| anyhow::anyhow!("Alert worker is not running"))?;
        self.in_flight += 1;
        debug!("Alert dispatched: {:?}", event);
        Ok(())
    }

    /// Drains completions without blocking.
    pub fn poll_finished(&mut self) -> Vec<AlertFinished> {
        let done: Vec<AlertFinished> = self.finished.try_iter().collect();
        self.in_flight = self.in_flight.saturating_sub(done.len());
        done
    }

    /// Blocks up to `timeout` for the next completion.
    pub fn wait_finished(&mut self, timeout: Duration) -> Option<AlertFinished> {
        let done = self.finished.recv_timeout(timeout).ok()?;
        self.in_flight = self.in_flight.saturating_sub(1);
        Some(done)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }
}

fn run_worker(
    mut player: Box<dyn AlertPlayer>,
    requests: Receiver<AlertRequest>,
    finished: Sender<AlertFinished>,
) {
    debug!("Alert worker started");

    while let Ok(request) = requests.recv() {
        let AlertRequest::Play(event) = request;
        info!("Playing alert: {}", event.label());

        let played = match panic::catch_unwind(AssertUnwindSafe(|| player.play())) {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!("Alert playback failed: {}", e);
                false
            }
            Err(_) => {
                error!("Alert playback panicked");
                false
            }
        };

        if finished.send(AlertFinished { event, played }).is_err() {
            warn!("Alert completion dropped: frame loop is gone");
            break;
        }
    }

    debug!("Alert worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::PlaybackError;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingPlayer {
        plays: Arc<AtomicUsize>,
        fail: bool,
    }

    impl AlertPlayer for CountingPlayer {
        fn play(&mut self) -> Result<(), PlaybackError> {
            self.plays.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(PlaybackError::Missing(PathBuf::from("alert.wav")))
            } else {
                Ok(())
            }
        }
    }

    struct PanickingPlayer;

    impl AlertPlayer for PanickingPlayer {
        fn play(&mut self) -> Result<(), PlaybackError> {
            panic!("device exploded");
        }
    }

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn test_dispatch_reports_finished() {
        let plays = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = AlertDispatcher::spawn(Box::new(CountingPlayer {
            plays: plays.clone(),
            fail: false,
        }))
        .unwrap();

        dispatcher.dispatch(DetectionEvent::EyesClosed).unwrap();
        assert_eq!(dispatcher.in_flight(), 1);

        let done = dispatcher.wait_finished(WAIT).unwrap();
        assert_eq!(
            done,
            AlertFinished {
                event: DetectionEvent::EyesClosed,
                played: true
            }
        );
        assert_eq!(plays.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[test]
    fn test_playback_failure_still_finishes() {
        let plays = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = AlertDispatcher::spawn(Box::new(CountingPlayer {
            plays: plays.clone(),
            fail: true,
        }))
        .unwrap();

        dispatcher.dispatch(DetectionEvent::Yawning).unwrap();
        let done = dispatcher.wait_finished(WAIT).unwrap();
        assert_eq!(done.event, DetectionEvent::Yawning);
        assert!(!done.played);

        // ワーカーは生きている
        dispatcher.dispatch(DetectionEvent::EyesClosed).unwrap();
        assert!(dispatcher.wait_finished(WAIT).is_some());
        assert_eq!(plays.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_panicking_player_is_contained() {
        let mut dispatcher = AlertDispatcher::spawn(Box::new(PanickingPlayer)).unwrap();
        dispatcher.dispatch(DetectionEvent::EyesClosed).unwrap();
        let done = dispatcher.wait_finished(WAIT).unwrap();
        assert!(!done.played);
    }

    #[test]
    fn test_poll_finished_is_non_blocking() {
        let mut dispatcher = AlertDispatcher::spawn(Box::new(CountingPlayer {
            plays: Arc::new(AtomicUsize::new(0)),
            fail: false,
        }))
        .unwrap();
        assert!(dispatcher.poll_finished().is_empty());
    }
}
