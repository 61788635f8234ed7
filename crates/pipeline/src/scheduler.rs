//! In-process job scheduler
//!
//! Registers `(name, interval, handler)` triples and drives each on its own
//! tokio task. A job is serialised against itself: if a run is still going
//! when the next tick fires, that tick is skipped and counted, never queued.
//! Every run's textual result lands in the per-job health map consumed by
//! the ops surface.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

type JobFuture = Pin<Box<dyn Future<Output = String> + Send>>;

/// Observable state of one registered job.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobHealth {
    pub runs: u64,
    pub skips: u64,
    pub last_result: Option<String>,
    pub last_run_at: Option<DateTime<Utc>>,
}

/// Tick scheduler for the background pipeline.
pub struct Scheduler {
    shutdown_tx: watch::Sender<bool>,
    health: Arc<DashMap<String, JobHealth>>,
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            health: Arc::new(DashMap::new()),
        }
    }

    /// Register a job and start ticking it. The first run happens one full
    /// interval after registration.
    pub fn register<F, Fut>(&self, name: &str, period: Duration, handler: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = String> + Send + 'static,
    {
        let name = name.to_string();
        self.health.insert(name.clone(), JobHealth::default());

        let handler: Arc<dyn Fn() -> JobFuture + Send + Sync> =
            Arc::new(move || Box::pin(handler()));
        let health = self.health.clone();
        let busy = Arc::new(Mutex::new(()));
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Scheduled job '{}' every {:?}", name, period);
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match busy.clone().try_lock_owned() {
                            Ok(guard) => {
                                let handler = handler.clone();
                                let health = health.clone();
                                let name = name.clone();
                                tokio::spawn(async move {
                                    debug!("Job '{}' tick starting", name);
                                    let result = handler().await;
                                    if let Some(mut entry) = health.get_mut(&name) {
                                        entry.runs += 1;
                                        entry.last_result = Some(result);
                                        entry.last_run_at = Some(Utc::now());
                                    }
                                    drop(guard);
                                });
                            }
                            Err(_) => {
                                warn!("Job '{}' still running, skipping tick", name);
                                if let Some(mut entry) = health.get_mut(&name) {
                                    entry.skips += 1;
                                }
                            }
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        info!("Job '{}' shutting down", name);
                        break;
                    }
                }
            }
        });
    }

    /// Per-job health in stable order.
    pub fn health_snapshot(&self) -> BTreeMap<String, JobHealth> {
        self.health
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Signal every job task to stop after its current run.
    pub fn shutdown(&self) {
        info!("Signaling shutdown to scheduled jobs");
        let _ = self.shutdown_tx.send(true);
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[tokio::test]
    async fn jobs_tick_and_record_health() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicU64::new(0));

        let c = counter.clone();
        scheduler.register("counter", Duration::from_millis(10), move || {
            let c = c.clone();
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                format!("run {n}")
            }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.shutdown();

        assert!(counter.load(Ordering::SeqCst) >= 2);
        let health = scheduler.health_snapshot();
        let job = health.get("counter").unwrap();
        assert!(job.runs >= 2);
        assert!(job.last_result.as_deref().unwrap().starts_with("run "));
        assert!(job.last_run_at.is_some());
    }

    #[tokio::test]
    async fn overlapping_ticks_are_skipped_not_queued() {
        let scheduler = Scheduler::new();
        let active = Arc::new(AtomicU64::new(0));
        let peak = Arc::new(AtomicU64::new(0));

        let a = active.clone();
        let p = peak.clone();
        scheduler.register("slow", Duration::from_millis(5), move || {
            let a = a.clone();
            let p = p.clone();
            async move {
                let now = a.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(40)).await;
                a.fetch_sub(1, Ordering::SeqCst);
                "done".to_string()
            }
        });

        tokio::time::sleep(Duration::from_millis(150)).await;
        scheduler.shutdown();

        // At most one instance ever ran concurrently, and some ticks were skipped
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        let health = scheduler.health_snapshot();
        assert!(health.get("slow").unwrap().skips >= 1);
    }

    #[tokio::test]
    async fn shutdown_stops_future_runs() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicU64::new(0));

        let c = counter.clone();
        scheduler.register("stopped", Duration::from_millis(10), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                String::new()
            }
        });

        scheduler.shutdown();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
