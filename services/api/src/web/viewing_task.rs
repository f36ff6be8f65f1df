//! services/api/src/web/viewing_task.rs
//!
//! This module contains the asynchronous "worker" that owns one viewing session.
//!
//! The one-second tick, the customer's close request and the results of point
//! submissions are all turned into `ViewerCommand`s and consumed by a single loop,
//! so the session is only ever mutated from one place.

use crate::web::protocol::ServerMessage;
use ambassador_core::{AccrualEngine, SessionPhase, Submission, SubmitOutcome, ViewingSession};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// How often the viewing timer advances.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Everything that can happen to a running viewing session.
#[derive(Debug)]
pub enum ViewerCommand {
    /// One second of viewing elapsed.
    Tick,
    /// The customer closed the viewer (or disconnected).
    Close,
    /// A point submission issued by this session has finished.
    SubmitFinished {
        submission: Submission,
        outcome: SubmitOutcome,
    },
}

/// Runs a viewing session until it is closed.
///
/// Submissions are delivered on their own task so that a slow point API never
/// delays ticks or the close request. Once the session is closed the loop only
/// waits for deliveries that are still in flight and forwards their results.
pub async fn viewing_process(
    engine: AccrualEngine,
    mut session: ViewingSession,
    mut commands: mpsc::Receiver<ViewerCommand>,
    outbound: mpsc::Sender<ServerMessage>,
) {
    info!(
        "Viewing process started for session {} (document {}).",
        session.id(),
        session.document().document_id
    );

    let thresholds = *session.thresholds();
    notify(
        &outbound,
        ServerMessage::SessionOpened {
            session_id: session.id(),
            document_id: session.document().document_id.clone(),
            duration50: thresholds.duration50,
            duration100: thresholds.duration100,
            milestone50_enabled: thresholds.milestone50_enabled,
        },
    )
    .await;

    let (results_tx, mut results_rx) = mpsc::unbounded_channel::<ViewerCommand>();
    let mut ticker = interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut in_flight = 0usize;

    loop {
        let watching = matches!(session.phase(), SessionPhase::Watching { .. });
        let command = tokio::select! {
            biased;
            command = commands.recv() => command.unwrap_or(ViewerCommand::Close),
            Some(result) = results_rx.recv() => result,
            _ = ticker.tick(), if watching => ViewerCommand::Tick,
        };

        match command {
            ViewerCommand::Tick => {
                let step = session.tick();
                notify(
                    &outbound,
                    ServerMessage::Progress {
                        elapsed_seconds: session.elapsed_seconds(),
                        earned_points: session.earned_points(),
                    },
                )
                .await;
                for event in step.events {
                    notify(&outbound, event.into()).await;
                }
                if let Some(submission) = step.submission {
                    spawn_delivery(&engine, submission, results_tx.clone());
                    in_flight += 1;
                }
            }
            ViewerCommand::Close => {
                if let Some(submission) = session.close() {
                    spawn_delivery(&engine, submission, results_tx.clone());
                    in_flight += 1;
                }
                notify(
                    &outbound,
                    ServerMessage::SessionClosed {
                        elapsed_seconds: session.elapsed_seconds(),
                        earned_points: session.earned_points(),
                    },
                )
                .await;
                break;
            }
            ViewerCommand::SubmitFinished {
                submission,
                outcome,
            } => {
                in_flight = in_flight.saturating_sub(1);
                notify(&outbound, outcome.to_event(&submission).into()).await;
            }
        }
    }

    drop(results_tx);
    while in_flight > 0 {
        match results_rx.recv().await {
            Some(ViewerCommand::SubmitFinished {
                submission,
                outcome,
            }) => {
                in_flight -= 1;
                notify(&outbound, outcome.to_event(&submission).into()).await;
            }
            Some(_) => {}
            None => break,
        }
    }

    info!("Viewing session {} closed.", session.id());
}

/// Delivers a submission on its own task and reports the outcome back to the loop.
fn spawn_delivery(
    engine: &AccrualEngine,
    submission: Submission,
    results: mpsc::UnboundedSender<ViewerCommand>,
) {
    let pending = engine.begin_delivery(submission.clone());
    tokio::spawn(async move {
        let outcome = pending.finish().await;
        if results
            .send(ViewerCommand::SubmitFinished {
                submission,
                outcome,
            })
            .is_err()
        {
            warn!("Submission result arrived after the viewing session ended.");
        }
    });
}

async fn notify(outbound: &mpsc::Sender<ServerMessage>, message: ServerMessage) {
    if outbound.send(message).await.is_err() {
        debug!("Viewer disconnected; dropping message.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MemoryLedger, MemoryThresholds};
    use ambassador_core::{
        AccrualError, DocumentDescriptor, PortError, PortResult, SubmissionAck, SubmissionGateway,
        SystemClock, ThresholdConfig, TimeRate, ViewingLedger,
    };
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeGateway {
        calls: Mutex<Vec<Submission>>,
        fail: bool,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl SubmissionGateway for FakeGateway {
        async fn submit_viewing(&self, submission: &Submission) -> PortResult<SubmissionAck> {
            self.calls.lock().unwrap().push(submission.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(PortError::Unexpected("connection reset".to_string()));
            }
            Ok(SubmissionAck::default())
        }
    }

    struct Harness {
        commands: mpsc::Sender<ViewerCommand>,
        outbound: mpsc::Receiver<ServerMessage>,
        ledger: Arc<MemoryLedger>,
        gateway: Arc<FakeGateway>,
        engine: AccrualEngine,
    }

    async fn start(milestone50_enabled: bool, gateway: FakeGateway) -> Harness {
        let thresholds = ThresholdConfig {
            duration50: 60,
            duration100: 120,
            milestone50_enabled,
            cooldown_secs: 86_400,
        };
        let ledger = Arc::new(MemoryLedger::new());
        let gateway = Arc::new(gateway);
        let engine = AccrualEngine::new(
            Arc::new(MemoryThresholds::new(thresholds)),
            ledger.clone(),
            gateway.clone(),
            Arc::new(SystemClock),
            thresholds,
        );
        let session = engine
            .open(
                "0812345678",
                DocumentDescriptor {
                    document_id: "doc-1".to_string(),
                    base_points: 10,
                },
            )
            .await
            .unwrap();

        let (commands, commands_rx) = mpsc::channel(8);
        let (outbound_tx, outbound) = mpsc::channel(256);
        tokio::spawn(viewing_process(
            engine.clone(),
            session,
            commands_rx,
            outbound_tx,
        ));
        Harness {
            commands,
            outbound,
            ledger,
            gateway,
            engine,
        }
    }

    /// Collects messages up to and including the first one matching `done`.
    async fn collect_until(
        outbound: &mut mpsc::Receiver<ServerMessage>,
        done: impl Fn(&ServerMessage) -> bool,
    ) -> Vec<ServerMessage> {
        let mut seen = Vec::new();
        while let Some(message) = outbound.recv().await {
            let stop = done(&message);
            seen.push(message);
            if stop {
                return seen;
            }
        }
        panic!("viewer stopped before the expected message; saw {seen:?}");
    }

    fn progress_at(seconds: u32) -> impl Fn(&ServerMessage) -> bool {
        move |m| matches!(m, ServerMessage::Progress { elapsed_seconds, .. } if *elapsed_seconds == seconds)
    }

    #[tokio::test(start_paused = true)]
    async fn full_viewing_submits_once_at_one_hundred_percent() {
        let mut h = start(true, FakeGateway::default()).await;

        let opened = collect_until(&mut h.outbound, |_| true).await;
        assert!(matches!(opened[0], ServerMessage::SessionOpened { duration100: 120, .. }));

        let early = collect_until(&mut h.outbound, progress_at(59)).await;
        assert!(early
            .iter()
            .all(|m| matches!(m, ServerMessage::Progress { earned_points: 0, .. })));

        let at_sixty = collect_until(&mut h.outbound, |m| {
            matches!(m, ServerMessage::Milestone50Reached { .. })
        })
        .await;
        assert_eq!(
            at_sixty,
            vec![
                ServerMessage::Progress {
                    elapsed_seconds: 60,
                    earned_points: 5
                },
                ServerMessage::Milestone50Reached { earned_points: 5 },
            ]
        );

        let rest = collect_until(&mut h.outbound, |m| {
            matches!(m, ServerMessage::SubmitResult { .. })
        })
        .await;
        assert!(rest.contains(&ServerMessage::Progress {
            elapsed_seconds: 119,
            earned_points: 5
        }));
        assert!(rest.contains(&ServerMessage::Milestone100Reached { earned_points: 10 }));
        assert!(matches!(
            rest.last(),
            Some(ServerMessage::SubmitResult { success: true, .. })
        ));

        let calls = h.gateway.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].time_rate, TimeRate::Full);
        assert_eq!(calls[0].effective_points, 10);
        assert!(h.ledger.last_viewed("0812345678", "doc-1").await.unwrap().is_some());

        // Closing after the automatic submission must not submit again.
        h.commands.send(ViewerCommand::Close).await.unwrap();
        let closed = collect_until(&mut h.outbound, |m| {
            matches!(m, ServerMessage::SessionClosed { .. })
        })
        .await;
        assert_eq!(
            closed.last(),
            Some(&ServerMessage::SessionClosed {
                elapsed_seconds: 120,
                earned_points: 10
            })
        );
        assert!(h.outbound.recv().await.is_none());
        assert_eq!(h.gateway.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_partial_credit_without_half_milestone() {
        let mut h = start(false, FakeGateway::default()).await;

        let early = collect_until(&mut h.outbound, progress_at(90)).await;
        assert!(!early
            .iter()
            .any(|m| matches!(m, ServerMessage::Milestone50Reached { .. })));
        assert_eq!(
            early.last(),
            Some(&ServerMessage::Progress {
                elapsed_seconds: 90,
                earned_points: 0
            })
        );

        collect_until(&mut h.outbound, |m| {
            matches!(m, ServerMessage::SubmitResult { success: true, .. })
        })
        .await;
        assert_eq!(h.gateway.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn closing_after_half_milestone_submits_half_credit() {
        let mut h = start(true, FakeGateway::default()).await;

        collect_until(&mut h.outbound, progress_at(70)).await;
        h.commands.send(ViewerCommand::Close).await.unwrap();

        let tail = collect_until(&mut h.outbound, |m| {
            matches!(m, ServerMessage::SubmitResult { .. })
        })
        .await;
        assert!(tail.contains(&ServerMessage::SessionClosed {
            elapsed_seconds: 70,
            earned_points: 5
        }));

        let calls = h.gateway.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].time_rate, TimeRate::Half);
        assert_eq!(calls[0].effective_points, 5);
        assert_eq!(calls[0].elapsed_seconds, 70);
        assert!(h.ledger.last_viewed("0812345678", "doc-1").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn closing_early_makes_no_submission() {
        let mut h = start(true, FakeGateway::default()).await;

        collect_until(&mut h.outbound, progress_at(30)).await;
        h.commands.send(ViewerCommand::Close).await.unwrap();

        let tail = collect_until(&mut h.outbound, |m| {
            matches!(m, ServerMessage::SessionClosed { .. })
        })
        .await;
        assert!(!tail
            .iter()
            .any(|m| matches!(m, ServerMessage::SubmitResult { .. })));
        assert!(h.outbound.recv().await.is_none());
        assert!(h.gateway.calls.lock().unwrap().is_empty());
        assert!(h.ledger.entries("0812345678").await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_submission_is_reported_once_and_not_retried() {
        let mut h = start(
            true,
            FakeGateway {
                fail: true,
                ..Default::default()
            },
        )
        .await;

        let messages = collect_until(&mut h.outbound, |m| {
            matches!(m, ServerMessage::SubmitResult { .. })
        })
        .await;
        assert!(matches!(
            messages.last(),
            Some(ServerMessage::SubmitResult { success: false, .. })
        ));

        h.commands.send(ViewerCommand::Close).await.unwrap();
        let tail = collect_until(&mut h.outbound, |m| {
            matches!(m, ServerMessage::SessionClosed { .. })
        })
        .await;
        assert!(!tail
            .iter()
            .any(|m| matches!(m, ServerMessage::SubmitResult { .. })));
        assert_eq!(h.gateway.calls.lock().unwrap().len(), 1);
        assert!(h.ledger.entries("0812345678").await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn result_of_in_flight_submission_arrives_after_close() {
        let mut h = start(
            true,
            FakeGateway {
                delay: Some(Duration::from_secs(5)),
                ..Default::default()
            },
        )
        .await;

        collect_until(&mut h.outbound, |m| {
            matches!(m, ServerMessage::Milestone100Reached { .. })
        })
        .await;
        h.commands.send(ViewerCommand::Close).await.unwrap();

        let tail = collect_until(&mut h.outbound, |m| {
            matches!(m, ServerMessage::SubmitResult { .. })
        })
        .await;
        let closed_at = tail
            .iter()
            .position(|m| matches!(m, ServerMessage::SessionClosed { .. }))
            .expect("session closed");
        assert_eq!(closed_at, tail.len() - 2);
        assert!(h.outbound.recv().await.is_none());
        assert_eq!(h.gateway.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reopen_is_refused_until_the_closing_submission_lands() {
        let mut h = start(
            true,
            FakeGateway {
                delay: Some(Duration::from_secs(5)),
                ..Default::default()
            },
        )
        .await;
        let doc = || DocumentDescriptor {
            document_id: "doc-1".to_string(),
            base_points: 10,
        };

        collect_until(&mut h.outbound, progress_at(70)).await;
        h.commands.send(ViewerCommand::Close).await.unwrap();
        collect_until(&mut h.outbound, |m| {
            matches!(m, ServerMessage::SessionClosed { .. })
        })
        .await;

        let err = h.engine.open("0812345678", doc()).await.unwrap_err();
        assert!(matches!(err, AccrualError::SubmissionPending { .. }));

        collect_until(&mut h.outbound, |m| {
            matches!(m, ServerMessage::SubmitResult { success: true, .. })
        })
        .await;
        let err = h.engine.open("0812345678", doc()).await.unwrap_err();
        assert!(matches!(err, AccrualError::CooldownActive { .. }));
        assert_eq!(h.gateway.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_connection_closes_the_session() {
        let Harness {
            commands,
            mut outbound,
            gateway,
            ..
        } = start(true, FakeGateway::default()).await;

        collect_until(&mut outbound, progress_at(65)).await;
        drop(commands);

        collect_until(&mut outbound, |m| {
            matches!(m, ServerMessage::SubmitResult { success: true, .. })
        })
        .await;
        let calls = gateway.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].time_rate, TimeRate::Half);
    }
}
