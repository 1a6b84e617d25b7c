//! Timed driver that generates and publishes one reading per tick.
//!
//! The first tick fires immediately, later ticks fire on a fixed period
//! measured from loop start. Each tick's publish runs as its own task, so a
//! slow acknowledgment never delays the next tick; ticks may overlap.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinSet};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::LogDescriptor;
use crate::gateway::PublishGateway;
use crate::generator::ReadingGenerator;

/// Default period between ticks.
pub const DEFAULT_PUBLISH_INTERVAL: Duration = Duration::from_secs(3);

/// Counters of loop activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Ticks started
    pub ticks: u64,

    /// Readings acknowledged by the log
    pub published: u64,

    /// Readings dropped because serialization or delivery failed, or the
    /// publish task panicked
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    ticks: AtomicU64,
    published: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> LoopStats {
        LoopStats {
            ticks: self.ticks.load(Ordering::SeqCst),
            published: self.published.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}

/// Periodic generate-then-publish driver.
pub struct PublishLoop {
    generator: Arc<ReadingGenerator>,
    gateway: PublishGateway,
    log: Arc<LogDescriptor>,
    subject: Arc<str>,
    period: Duration,
    counters: Arc<Counters>,
}

impl PublishLoop {
    pub fn new(
        generator: Arc<ReadingGenerator>,
        gateway: PublishGateway,
        log: LogDescriptor,
        subject: impl Into<String>,
        period: Duration,
    ) -> Self {
        Self {
            generator,
            gateway,
            log: Arc::new(log),
            subject: Arc::from(subject.into()),
            period,
            counters: Arc::new(Counters::default()),
        }
    }

    /// A handle to read counters while the loop runs in another task.
    pub fn stats_handle(&self) -> StatsHandle {
        StatsHandle {
            counters: self.counters.clone(),
        }
    }

    /// Run until `cancel` fires.
    ///
    /// After cancellation no further ticks are scheduled; publishes already
    /// in flight are awaited, not aborted.
    pub async fn run(self, cancel: CancellationToken) -> LoopStats {
        info!(
            log = %self.log.name,
            subject = %self.subject,
            period_secs = self.period.as_secs_f64(),
            "Publish loop started"
        );

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                _ = ticker.tick() => {
                    self.spawn_tick(&mut in_flight);
                }

                // Reap finished ticks so the set does not grow unbounded
                Some(result) = in_flight.join_next(), if !in_flight.is_empty() => {
                    self.reap(result);
                }
            }
        }

        let pending = in_flight.len();
        if pending > 0 {
            debug!(pending, "Waiting for in-flight publishes");
        }
        while let Some(result) = in_flight.join_next().await {
            self.reap(result);
        }

        let stats = self.counters.snapshot();
        info!(
            ticks = stats.ticks,
            published = stats.published,
            failed = stats.failed,
            "Publish loop stopped"
        );
        stats
    }

    fn reap(&self, result: Result<(), JoinError>) {
        if let Err(e) = result {
            self.counters.failed.fetch_add(1, Ordering::SeqCst);
            warn!(error = %e, "Publish task ended abnormally");
        }
    }

    fn spawn_tick(&self, in_flight: &mut JoinSet<()>) {
        self.counters.ticks.fetch_add(1, Ordering::SeqCst);
        let reading = self.generator.generate();

        let gateway = self.gateway.clone();
        let log = self.log.clone();
        let subject = self.subject.clone();
        let counters = self.counters.clone();

        in_flight.spawn(async move {
            match gateway.publish(&log, &subject, &reading).await {
                Ok(ack) => {
                    counters.published.fetch_add(1, Ordering::SeqCst);
                    info!(
                        sensor_id = %reading.sensor_id,
                        location = %reading.location,
                        temperature = format_args!("{:.1}", reading.temperature),
                        band = %reading.band(),
                        log = %ack.log_name,
                        sequence = ack.sequence_number,
                        duplicate = ack.duplicate,
                        "Published reading"
                    );
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::SeqCst);
                    warn!(
                        error = %e,
                        sensor_id = %reading.sensor_id,
                        "Failed to publish reading, skipping tick"
                    );
                }
            }
        });
    }
}

/// Read-only view of a running loop's counters.
#[derive(Debug, Clone)]
pub struct StatsHandle {
    counters: Arc<Counters>,
}

impl StatsHandle {
    pub fn snapshot(&self) -> LoopStats {
        self.counters.snapshot()
    }
}
