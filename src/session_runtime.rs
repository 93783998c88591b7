//! Session runtime: one listening session on its own thread.
//!
//! The thread owns the `PlaybackSession` and its backend (rodio output
//! streams are not `Send`, so the backend is built on the thread). Callers
//! talk to it through `SessionHandle`, which wraps an `mpsc::Sender`. Item
//! end and progress are polled on every `recv_timeout` tick.

use crate::broadcast::BroadcastDescriptor;
use crate::error::PlaybackError;
use crate::player::PlayerBackend;
use crate::session::{Clock, PlaybackSession, SessionConfig, SessionEvent, StopReason};
use std::sync::mpsc;
use tracing::{debug, warn};

pub enum SessionCmd {
    TuneIn(BroadcastDescriptor),
    Stop,
    Shutdown,
}

/// Thread-safe handle for commanding a session runtime.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCmd>,
}

impl SessionHandle {
    pub fn tune_in(&self, descriptor: BroadcastDescriptor) {
        let _ = self.tx.send(SessionCmd::TuneIn(descriptor));
    }

    pub fn stop(&self) {
        let _ = self.tx.send(SessionCmd::Stop);
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(SessionCmd::Shutdown);
    }
}

/// Spawn a session runtime on a dedicated `session-runtime` thread.
///
/// `make_backend` runs on that thread the first time a broadcast is tuned in,
/// and again on later tune-ins if it failed. `on_event` is called from the
/// thread for every session event.
pub fn spawn_session_runtime<B, F, C, E>(
    make_backend: F,
    clock: C,
    config: SessionConfig,
    on_event: E,
) -> Result<SessionHandle, PlaybackError>
where
    B: PlayerBackend + 'static,
    F: FnMut() -> Result<B, PlaybackError> + Send + 'static,
    C: Clock + Send + 'static,
    E: Fn(SessionEvent) + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<SessionCmd>();

    std::thread::Builder::new()
        .name("session-runtime".into())
        .spawn(move || session_thread_loop(rx, make_backend, clock, config, on_event))
        .map_err(|e| {
            PlaybackError::OutputUnavailable(format!("failed to spawn session thread: {}", e))
        })?;

    Ok(SessionHandle { tx })
}

fn session_thread_loop<B, F, C, E>(
    rx: mpsc::Receiver<SessionCmd>,
    mut make_backend: F,
    clock: C,
    config: SessionConfig,
    on_event: E,
) where
    B: PlayerBackend,
    F: FnMut() -> Result<B, PlaybackError>,
    C: Clock,
    E: Fn(SessionEvent),
{
    // Built lazily; the clock moves into the session on first tune-in.
    let mut clock = Some(clock);
    let mut session: Option<PlaybackSession<B, C>> = None;

    loop {
        let events = match rx.recv_timeout(config.progress_tick) {
            Ok(SessionCmd::TuneIn(descriptor)) => {
                if session.is_none() {
                    match make_backend() {
                        Ok(backend) => {
                            if let Some(clock) = clock.take() {
                                session = Some(PlaybackSession::new(backend, clock, config));
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "audio output unavailable");
                            on_event(SessionEvent::PlayError {
                                index: 0,
                                message: e.to_string(),
                                consecutive: 1,
                            });
                            on_event(SessionEvent::Stopped {
                                reason: StopReason::Unavailable,
                            });
                            continue;
                        }
                    }
                }
                session
                    .as_mut()
                    .map(|s| s.tune_in(descriptor))
                    .unwrap_or_default()
            }
            Ok(SessionCmd::Stop) => session.as_mut().map(|s| s.stop()).unwrap_or_default(),
            Ok(SessionCmd::Shutdown) => {
                if let Some(s) = session.as_mut() {
                    for event in s.stop() {
                        on_event(event);
                    }
                }
                debug!("session runtime shutting down");
                break;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                session.as_mut().map(|s| s.tick()).unwrap_or_default()
            }
            // Every handle dropped.
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                if let Some(s) = session.as_mut() {
                    s.stop();
                }
                break;
            }
        };

        for event in events {
            on_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::BroadcastStart;
    use crate::player::ItemPlayer;
    use crate::session::SystemClock;
    use crate::timeline::{ExternalClip, SpeechClip, Timeline};
    use chrono::Utc;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct CountingBackend {
        live: Arc<AtomicI32>,
    }

    struct CountingPlayer {
        live: Arc<AtomicI32>,
        running: bool,
    }

    impl ItemPlayer for CountingPlayer {
        fn start(&mut self, _seek: Duration) -> Result<(), PlaybackError> {
            self.live.fetch_add(1, Ordering::SeqCst);
            self.running = true;
            Ok(())
        }

        fn stop(&mut self) {
            if self.running {
                self.live.fetch_sub(1, Ordering::SeqCst);
                self.running = false;
            }
        }

        fn has_ended(&self) -> bool {
            false
        }
    }

    impl PlayerBackend for CountingBackend {
        fn external_clip(&mut self, _clip: &ExternalClip) -> Result<Box<dyn ItemPlayer>, PlaybackError> {
            Ok(Box::new(CountingPlayer {
                live: self.live.clone(),
                running: false,
            }))
        }

        fn speech(&mut self, _speech: &SpeechClip) -> Result<Box<dyn ItemPlayer>, PlaybackError> {
            Err(PlaybackError::Decode("not in this test".into()))
        }
    }

    fn live_broadcast() -> BroadcastDescriptor {
        let mut timeline = Timeline::new();
        timeline
            .add_clip(ExternalClip::new("dQw4w9WgXcQ", "Long song", 0.0, 600.0, None).unwrap())
            .unwrap();
        BroadcastDescriptor::new(1, "Drive Time", BroadcastStart::Live(Utc::now()), true, timeline.items().to_vec())
            .unwrap()
    }

    fn fast_config() -> SessionConfig {
        SessionConfig {
            progress_tick: Duration::from_millis(20),
            retry_backoff: Duration::from_millis(50),
            max_consecutive_failures: 2,
        }
    }

    fn collector() -> (Arc<Mutex<Vec<SessionEvent>>>, impl Fn(SessionEvent) + Send + 'static) {
        let events: Arc<Mutex<Vec<SessionEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        (events, move |evt| sink.lock().unwrap().push(evt))
    }

    #[test]
    fn handle_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SessionHandle>();
    }

    #[test]
    fn shutdown_stops_thread() {
        let handle = spawn_session_runtime(
            || Err::<CountingBackend, _>(PlaybackError::OutputUnavailable("none".into())),
            SystemClock,
            fast_config(),
            |_| {},
        )
        .unwrap();
        handle.shutdown();
        std::thread::sleep(Duration::from_millis(100));
    }

    #[test]
    fn tune_in_plays_and_reports_progress() {
        let live = Arc::new(AtomicI32::new(0));
        let backend_live = live.clone();
        let (events, on_event) = collector();
        let handle = spawn_session_runtime(
            move || {
                Ok(CountingBackend {
                    live: backend_live.clone(),
                })
            },
            SystemClock,
            fast_config(),
            on_event,
        )
        .unwrap();

        handle.tune_in(live_broadcast());
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(live.load(Ordering::SeqCst), 1);

        handle.stop();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(live.load(Ordering::SeqCst), 0);

        let evts = events.lock().unwrap();
        assert!(matches!(evts[0], SessionEvent::NowPlaying { index: 0, .. }));
        assert!(evts.iter().any(|e| matches!(e, SessionEvent::Progress { .. })));
        assert!(matches!(
            evts.last(),
            Some(SessionEvent::Stopped {
                reason: StopReason::TunedOut
            })
        ));
        drop(evts);
        handle.shutdown();
    }

    #[test]
    fn missing_output_reports_unavailable() {
        let (events, on_event) = collector();
        let handle = spawn_session_runtime(
            || Err::<CountingBackend, _>(PlaybackError::OutputUnavailable("no device".into())),
            SystemClock,
            fast_config(),
            on_event,
        )
        .unwrap();
        handle.tune_in(live_broadcast());
        std::thread::sleep(Duration::from_millis(200));

        let evts = events.lock().unwrap();
        assert!(evts.iter().any(|e| matches!(e, SessionEvent::PlayError { .. })));
        assert!(evts.iter().any(|e| matches!(
            e,
            SessionEvent::Stopped {
                reason: StopReason::Unavailable
            }
        )));
        drop(evts);
        handle.shutdown();
    }

    #[test]
    fn dropping_all_handles_releases_player() {
        let live = Arc::new(AtomicI32::new(0));
        let backend_live = live.clone();
        let handle = spawn_session_runtime(
            move || {
                Ok(CountingBackend {
                    live: backend_live.clone(),
                })
            },
            SystemClock,
            fast_config(),
            |_| {},
        )
        .unwrap();
        handle.tune_in(live_broadcast());
        std::thread::sleep(Duration::from_millis(100));
        drop(handle);
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }
}
