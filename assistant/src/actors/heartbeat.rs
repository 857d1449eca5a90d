//! HeartbeatActor - fixed-interval scheduler for background rounds
//!
//! Each tick starts exactly one round unless the previous round is still
//! running, in which case the tick is skipped and counted. Rounds are never
//! queued, never overlap, and are never cancelled by the scheduler.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use serde::Serialize;
use shared_types::HeartbeatStats;
use tokio::task::JoinHandle;

/// Summary of a finished round
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundReport {
    pub round: u64,
    /// Whether anything was forwarded to the executive
    pub posted: bool,
    pub summary: String,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum RoundError {
    #[error("background actor is not accepting rounds")]
    Unavailable,
    #[error("round failed: {0}")]
    Failed(String),
}

/// One round of background reasoning
#[async_trait]
pub trait HeartbeatRound: Send + Sync {
    async fn run_round(&self, round: u64) -> Result<RoundReport, RoundError>;
}

pub type SharedHeartbeatRound = Arc<dyn HeartbeatRound>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDecision {
    Fire { round: u64 },
    Skip,
}

/// Fire-or-skip bookkeeping, independent of timers
#[derive(Debug, Default)]
pub struct TickGate {
    in_flight: Option<u64>,
    next_round: u64,
    stats: HeartbeatStats,
}

impl TickGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_tick(&mut self) -> TickDecision {
        if self.in_flight.is_some() {
            self.stats.skipped += 1;
            return TickDecision::Skip;
        }
        self.next_round += 1;
        let round = self.next_round;
        self.in_flight = Some(round);
        self.stats.fired += 1;
        self.stats.in_flight = true;
        self.stats.last_started_at = Some(Utc::now());
        TickDecision::Fire { round }
    }

    /// Returns false for a round that is not the one in flight
    pub fn on_finished(&mut self, round: u64, succeeded: bool) -> bool {
        if self.in_flight != Some(round) {
            return false;
        }
        self.in_flight = None;
        self.stats.in_flight = false;
        self.stats.last_finished_at = Some(Utc::now());
        if succeeded {
            self.stats.completed += 1;
        } else {
            self.stats.failed += 1;
        }
        true
    }

    pub fn stats(&self) -> HeartbeatStats {
        self.stats.clone()
    }
}

#[derive(Debug, Default)]
pub struct HeartbeatActor;

#[derive(Clone)]
pub struct HeartbeatArguments {
    pub interval: Duration,
    pub round: SharedHeartbeatRound,
}

#[derive(Debug)]
pub enum HeartbeatMsg {
    Tick,
    /// Manual trigger; obeys the same overlap rule as a tick
    TriggerNow,
    RoundFinished {
        round: u64,
        outcome: Result<RoundReport, RoundError>,
    },
    GetStats {
        reply: RpcReplyPort<HeartbeatStats>,
    },
}

pub struct HeartbeatState {
    gate: TickGate,
    round: SharedHeartbeatRound,
    ticker: JoinHandle<()>,
}

#[async_trait]
impl Actor for HeartbeatActor {
    type Msg = HeartbeatMsg;
    type State = HeartbeatState;
    type Arguments = HeartbeatArguments;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let interval = args.interval.max(Duration::from_millis(1));
        tracing::info!(
            actor_id = %myself.get_id(),
            interval_secs = interval.as_secs_f64(),
            "HeartbeatActor starting"
        );

        let tick_ref = myself.clone();
        let ticker = tokio::spawn(async move {
            // First round one full interval after start.
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if tick_ref.cast(HeartbeatMsg::Tick).is_err() {
                    break;
                }
            }
        });

        Ok(HeartbeatState {
            gate: TickGate::new(),
            round: args.round,
            ticker,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            HeartbeatMsg::Tick => self.fire(&myself, state, "tick"),
            HeartbeatMsg::TriggerNow => self.fire(&myself, state, "manual"),
            HeartbeatMsg::RoundFinished { round, outcome } => {
                let succeeded = outcome.is_ok();
                if !state.gate.on_finished(round, succeeded) {
                    tracing::debug!(round, "Ignoring completion of a round not in flight");
                    return Ok(());
                }
                match outcome {
                    Ok(report) => tracing::info!(
                        round,
                        posted = report.posted,
                        summary = %report.summary,
                        "Heartbeat round finished"
                    ),
                    Err(err) => tracing::warn!(round, error = %err, "Heartbeat round failed"),
                }
            }
            HeartbeatMsg::GetStats { reply } => {
                let _ = reply.send(state.gate.stats());
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.ticker.abort();
        tracing::info!(actor_id = %myself.get_id(), "HeartbeatActor stopped");
        Ok(())
    }
}

impl HeartbeatActor {
    fn fire(&self, myself: &ActorRef<HeartbeatMsg>, state: &mut HeartbeatState, reason: &'static str) {
        match state.gate.on_tick() {
            TickDecision::Fire { round } => {
                tracing::info!(round, reason, "Heartbeat round starting");
                let runner = state.round.clone();
                let reply_to = myself.clone();
                let inner = tokio::spawn(async move { runner.run_round(round).await });
                // A panicking round still has to release the gate.
                tokio::spawn(async move {
                    let outcome = match inner.await {
                        Ok(outcome) => outcome,
                        Err(join_err) => Err(RoundError::Failed(join_err.to_string())),
                    };
                    let _ = reply_to.cast(HeartbeatMsg::RoundFinished { round, outcome });
                });
            }
            TickDecision::Skip => {
                tracing::warn!(
                    reason,
                    skipped_total = state.gate.stats().skipped,
                    "Heartbeat tick skipped; previous round still running"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Round that sleeps and records how many rounds overlapped
    struct SlowRound {
        duration: Duration,
        running: AtomicUsize,
        max_running: AtomicUsize,
        started: AtomicUsize,
    }

    impl SlowRound {
        fn new(duration: Duration) -> Arc<Self> {
            Arc::new(Self {
                duration,
                running: AtomicUsize::new(0),
                max_running: AtomicUsize::new(0),
                started: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl HeartbeatRound for SlowRound {
        async fn run_round(&self, round: u64) -> Result<RoundReport, RoundError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.duration).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(RoundReport {
                round,
                posted: false,
                summary: String::new(),
            })
        }
    }

    async fn stats(actor: &ActorRef<HeartbeatMsg>) -> HeartbeatStats {
        ractor::call!(actor, |reply| HeartbeatMsg::GetStats { reply }).unwrap()
    }

    #[test]
    fn test_gate_skips_while_round_in_flight() {
        let mut gate = TickGate::new();
        assert_eq!(gate.on_tick(), TickDecision::Fire { round: 1 });
        assert_eq!(gate.on_tick(), TickDecision::Skip);
        assert_eq!(gate.on_tick(), TickDecision::Skip);
        assert!(!gate.on_finished(7, true));
        assert!(gate.on_finished(1, true));
        assert_eq!(gate.on_tick(), TickDecision::Fire { round: 2 });
        assert!(gate.on_finished(2, false));

        let stats = gate.stats();
        assert_eq!(stats.fired, 2);
        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert!(!stats.in_flight);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrunning_round_skips_ticks_without_overlap() {
        let round = SlowRound::new(Duration::from_millis(250));
        let (actor, handle) = Actor::spawn(
            None,
            HeartbeatActor,
            HeartbeatArguments {
                interval: Duration::from_millis(100),
                round: round.clone(),
            },
        )
        .await
        .unwrap();

        // Ticks at 100 (fires, runs to 350), 200 and 300 (skipped), 400 (fires).
        tokio::time::sleep(Duration::from_millis(450)).await;
        let snapshot = stats(&actor).await;
        assert_eq!(snapshot.fired, 2);
        assert_eq!(snapshot.skipped, 2);
        assert_eq!(snapshot.completed, 1);
        assert!(snapshot.in_flight);
        assert_eq!(round.max_running.load(Ordering::SeqCst), 1);

        actor.stop(None);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_rounds_fire_every_tick() {
        let round = SlowRound::new(Duration::from_millis(10));
        let (actor, handle) = Actor::spawn(
            None,
            HeartbeatActor,
            HeartbeatArguments {
                interval: Duration::from_millis(100),
                round: round.clone(),
            },
        )
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(350)).await;
        let snapshot = stats(&actor).await;
        assert_eq!(snapshot.fired, 3);
        assert_eq!(snapshot.skipped, 0);
        assert_eq!(snapshot.completed, 3);

        actor.stop(None);
        handle.await.unwrap();
    }

    /// Round that panics the first time and succeeds afterwards
    struct PanicsOnce {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl HeartbeatRound for PanicsOnce {
        async fn run_round(&self, round: u64) -> Result<RoundReport, RoundError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("round {round} blew up");
            }
            Ok(RoundReport {
                round,
                posted: false,
                summary: String::new(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_round_counts_as_failed_and_ticks_resume() {
        let round = Arc::new(PanicsOnce {
            calls: AtomicUsize::new(0),
        });
        let (actor, handle) = Actor::spawn(
            None,
            HeartbeatActor,
            HeartbeatArguments {
                interval: Duration::from_millis(100),
                round: round.clone(),
            },
        )
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(1050)).await;
        let snapshot = stats(&actor).await;
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.skipped, 0);
        assert_eq!(snapshot.fired, 10);
        assert_eq!(snapshot.completed, 9);
        assert!(!snapshot.in_flight);
        assert_eq!(round.calls.load(Ordering::SeqCst), 10);

        actor.stop(None);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_trigger_obeys_overlap_rule() {
        let round = SlowRound::new(Duration::from_secs(5));
        let (actor, handle) = Actor::spawn(
            None,
            HeartbeatActor,
            HeartbeatArguments {
                interval: Duration::from_secs(900),
                round: round.clone(),
            },
        )
        .await
        .unwrap();

        actor.cast(HeartbeatMsg::TriggerNow).unwrap();
        actor.cast(HeartbeatMsg::TriggerNow).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let snapshot = stats(&actor).await;
        assert_eq!(snapshot.fired, 1);
        assert_eq!(snapshot.skipped, 1);
        assert_eq!(round.started.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(stats(&actor).await.completed, 1);

        actor.stop(None);
        handle.await.unwrap();
    }
}
