//! Stream ingestion tasks.
//!
//! A response stream is pumped by a spawned task that tags every event with
//! the generation of the request it belongs to and forwards it to whoever
//! owns the [`SessionController`]. Each wait for the next event is bounded
//! by an inactivity timeout; a stalled stream turns into a failure event.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::controller::{Applied, Generation, SessionController, SessionState, Submission};
use crate::backend::{ResponseBackend, StreamEvent};
use crate::Result;

/// A stream event together with the request generation it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tagged {
    pub generation: Generation,
    pub event: StreamEvent,
}

/// Open the backend stream for `submission` and forward its events to `tx`.
///
/// The task ends after the first terminal event, or as soon as `tx` is
/// closed. Aborting the returned handle cancels the request.
pub fn spawn_stream<B>(
    backend: Arc<B>,
    submission: Submission,
    inactivity: Duration,
    tx: mpsc::Sender<Tagged>,
) -> JoinHandle<()>
where
    B: ResponseBackend + 'static,
{
    let generation = submission.generation;
    tokio::spawn(async move {
        let send = |event: StreamEvent| {
            let tx = tx.clone();
            async move { tx.send(Tagged { generation, event }).await.is_ok() }
        };

        let silent = || StreamEvent::Failed(format!("no response for {}s", inactivity.as_secs()));

        // Waiting for the stream to open counts as inactivity too
        let mut rx = match tokio::time::timeout(inactivity, backend.open_stream(submission.history)).await {
            Ok(Ok(rx)) => rx,
            Ok(Err(e)) => {
                warn!(%generation, "Failed to open response stream: {e}");
                send(StreamEvent::Failed(e.to_string())).await;
                return;
            }
            Err(_) => {
                warn!(%generation, "Response stream did not open in time");
                send(silent()).await;
                return;
            }
        };

        loop {
            let event = match tokio::time::timeout(inactivity, rx.recv()).await {
                Ok(Some(event)) => event,
                Ok(None) => StreamEvent::Failed("response stream closed before completion".to_string()),
                Err(_) => silent(),
            };
            let terminal = event.is_terminal();
            if !send(event).await {
                debug!(%generation, "Stream receiver dropped");
                return;
            }
            if terminal {
                return;
            }
        }
    })
}

/// Run one full request against `controller`: submit, stream, apply every
/// event in arrival order until the controller is idle again.
///
/// `observe` sees each event the controller accepted, and the controller
/// right after it. Stale and ignored events are not reported.
pub async fn run_turn<B, F>(
    controller: &mut SessionController,
    backend: Arc<B>,
    input: &str,
    inactivity: Duration,
    mut observe: F,
) -> Result<()>
where
    B: ResponseBackend + 'static,
    F: FnMut(&StreamEvent, &SessionController),
{
    let submission = controller.submit(input)?;
    let generation = submission.generation;
    let (tx, mut rx) = mpsc::channel(64);
    let handle = spawn_stream(backend, submission, inactivity, tx);

    while controller.state() != SessionState::Idle {
        let Some(tagged) = rx.recv().await else {
            break;
        };
        let event = tagged.event.clone();
        if controller.apply(tagged.generation, tagged.event) == Applied::Accepted {
            observe(&event, controller);
        }
    }

    handle.abort();
    if controller.generation() == generation && controller.state() != SessionState::Idle {
        // Pump vanished without a terminal event
        controller.apply(
            generation,
            StreamEvent::Failed("response stream task ended".to_string()),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{IndicatorPhase, Turn};
    use crate::ChatError;

    /// Replays a fixed list of events, optionally stalling afterwards
    struct Script {
        events: Vec<StreamEvent>,
        stall: bool,
    }

    impl ResponseBackend for Script {
        async fn open_stream(&self, _history: Vec<Turn>) -> Result<mpsc::Receiver<StreamEvent>> {
            let (tx, rx) = mpsc::channel(16);
            let events = self.events.clone();
            let stall = self.stall;
            tokio::spawn(async move {
                for event in events {
                    let _ = tx.send(event).await;
                }
                if stall {
                    // Hold the sender open without sending anything
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
            });
            Ok(rx)
        }
    }

    /// Accepts the request but never produces a stream
    struct NeverOpens;

    impl ResponseBackend for NeverOpens {
        async fn open_stream(&self, _history: Vec<Turn>) -> Result<mpsc::Receiver<StreamEvent>> {
            std::future::pending().await
        }
    }

    struct Refusing;

    impl ResponseBackend for Refusing {
        async fn open_stream(&self, _history: Vec<Turn>) -> Result<mpsc::Receiver<StreamEvent>> {
            Err(ChatError::StreamFailed("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_run_turn_streams_answer() {
        let backend = Arc::new(Script {
            events: vec![
                StreamEvent::Phase(IndicatorPhase::new("searching")),
                StreamEvent::Fragment("Hi".into()),
                StreamEvent::Fragment(" there".into()),
                StreamEvent::Done,
            ],
            stall: false,
        });
        let mut controller = SessionController::new();
        let mut seen = Vec::new();

        run_turn(&mut controller, backend, "hello", Duration::from_secs(5), |event, _| {
            seen.push(event.clone())
        })
        .await
        .unwrap();

        assert_eq!(seen.len(), 4);
        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(controller.transcript().last().unwrap().content, "Hi there");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_stream_times_out() {
        let backend = Arc::new(Script {
            events: vec![StreamEvent::Fragment("partial".into())],
            stall: true,
        });
        let mut controller = SessionController::new();

        run_turn(&mut controller, backend, "hello", Duration::from_secs(30), |_, _| {})
            .await
            .unwrap();

        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(controller.transcript().last().unwrap().content, "partial");
        assert_eq!(controller.last_error(), Some("no response for 30s"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_that_never_opens_times_out() {
        let mut controller = SessionController::new();
        let started = tokio::time::Instant::now();

        run_turn(&mut controller, Arc::new(NeverOpens), "hello", Duration::from_secs(5), |_, _| {})
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(60));
        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(controller.transcript().len(), 1);
        assert_eq!(controller.last_error(), Some("no response for 5s"));
        assert!(!controller.indicator_visible());
    }

    #[tokio::test]
    async fn test_observe_skips_ignored_events() {
        let backend = Arc::new(Script {
            events: vec![
                StreamEvent::Fragment("Hi".into()),
                StreamEvent::Phase(IndicatorPhase::new("late phase")),
                StreamEvent::Done,
            ],
            stall: false,
        });
        let mut controller = SessionController::new();
        let mut seen = Vec::new();

        run_turn(&mut controller, backend, "hello", Duration::from_secs(5), |event, _| {
            seen.push(event.clone())
        })
        .await
        .unwrap();

        assert_eq!(seen, vec![StreamEvent::Fragment("Hi".into()), StreamEvent::Done]);
        assert!(!controller.indicator().is_active());
    }

    #[tokio::test]
    async fn test_open_failure_becomes_failed_event() {
        let mut controller = SessionController::new();
        run_turn(&mut controller, Arc::new(Refusing), "hello", Duration::from_secs(5), |_, _| {})
            .await
            .unwrap();

        assert_eq!(controller.state(), SessionState::Idle);
        assert!(controller.last_error().unwrap().contains("connection refused"));
        assert!(!controller.indicator_visible());
    }

    #[tokio::test]
    async fn test_run_turn_rejects_empty_input() {
        let mut controller = SessionController::new();
        let result = run_turn(
            &mut controller,
            Arc::new(Refusing),
            "  ",
            Duration::from_secs(5),
            |_, _| {},
        )
        .await;
        assert!(matches!(result, Err(ChatError::InputRejected(_))));
        assert!(controller.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_spawned_stream_tags_generation() {
        let backend = Arc::new(Script {
            events: vec![StreamEvent::Fragment("x".into()), StreamEvent::Done],
            stall: false,
        });
        let mut controller = SessionController::new();
        let submission = controller.submit("hello").unwrap();
        let generation = submission.generation;
        let (tx, mut rx) = mpsc::channel(8);

        let _handle = spawn_stream(backend, submission, Duration::from_secs(5), tx);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.generation, generation);
        assert_eq!(first.event, StreamEvent::Fragment("x".into()));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.event, StreamEvent::Done);
        assert!(rx.recv().await.is_none());
    }
}
