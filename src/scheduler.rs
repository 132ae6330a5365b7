use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Notify;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{interval, sleep, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::dispatcher::{metric_inc, DeliveryReport, Dispatcher};
use crate::error::{DeliveryOutcome, FailureReason};
use crate::filter::{should_include, GeofencePredicate};
use crate::mapper::to_wire_payload;
use crate::memo::SentEventMemo;
use crate::queue::EntityQueues;
use crate::subscriber::{Subscriber, SubscriberRegistry};
use crate::types::EntityChange;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between ticks.
    pub interval: Duration,
    /// How long `shutdown` waits for in-flight deliveries before aborting them.
    pub shutdown_grace: Duration,
    /// Duplicate suppression window. Zero disables the memo.
    pub sent_memo_ttl: Duration,
    pub sent_memo_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(10),
            sent_memo_ttl: Duration::ZERO,
            sent_memo_capacity: 100_000,
        }
    }
}

/// A drained change with its wire payload.
#[derive(Debug, Clone)]
struct MappedChange {
    change: EntityChange,
    payload: Value,
}

/// Summary of one tick.
#[derive(Debug, Default, Clone)]
pub struct TickReport {
    pub drained: usize,
    pub duplicates: usize,
    pub mapping_failures: usize,
    pub deliveries: Vec<DeliveryReport>,
}

impl TickReport {
    pub fn delivered(&self) -> usize {
        self.deliveries
            .iter()
            .filter(|r| r.outcome.is_delivered())
            .count()
    }
}

/// Periodically drains the per-kind queues and fans batches out to subscribers.
pub struct DispatchScheduler {
    queues: Arc<EntityQueues>,
    registry: Arc<SubscriberRegistry>,
    geofence: Arc<dyn GeofencePredicate>,
    dispatcher: Dispatcher,
    memo: Option<Mutex<SentEventMemo>>,
    config: SchedulerConfig,
}

impl DispatchScheduler {
    pub fn new(
        queues: Arc<EntityQueues>,
        registry: Arc<SubscriberRegistry>,
        geofence: Arc<dyn GeofencePredicate>,
        dispatcher: Dispatcher,
        config: SchedulerConfig,
    ) -> Self {
        let memo = (!config.sent_memo_ttl.is_zero())
            .then(|| Mutex::new(SentEventMemo::new(config.sent_memo_ttl, config.sent_memo_capacity)));
        Self {
            queues,
            registry,
            geofence,
            dispatcher,
            memo,
            config,
        }
    }

    pub fn queues(&self) -> &Arc<EntityQueues> {
        &self.queues
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Run one drain/filter/dispatch cycle and wait for its deliveries.
    pub async fn tick(&self) -> TickReport {
        let (mut report, batch) = self.collect();
        if batch.is_empty() {
            return report;
        }
        report.deliveries = self.dispatch_batch(Arc::new(batch)).await;
        report
    }

    /// Drain every queue, drop remembered duplicates and map to wire payloads.
    fn collect(&self) -> (TickReport, Vec<MappedChange>) {
        let mut report = TickReport::default();
        let drained = self.queues.drain_all();
        report.drained = drained.len();
        if drained.is_empty() {
            return (report, Vec::new());
        }
        metric_inc("webhook.tick.drained");

        let fresh = match &self.memo {
            Some(memo) => {
                let now = Instant::now();
                let mut memo = memo.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                let before = drained.len();
                let fresh: Vec<_> = drained
                    .into_iter()
                    .filter(|change| memo.check_and_insert(&change.identity(), now))
                    .collect();
                report.duplicates = before - fresh.len();
                fresh
            }
            None => drained,
        };

        let mut batch = Vec::with_capacity(fresh.len());
        for change in fresh {
            match to_wire_payload(&change) {
                Ok(payload) => batch.push(MappedChange { change, payload }),
                Err(err) => {
                    report.mapping_failures += 1;
                    metric_inc("webhook.tick.mapping_failed");
                    warn!(kind = %change.kind(), error = %err, "dropping change that failed to map");
                }
            }
        }

        debug!(
            drained = report.drained,
            duplicates = report.duplicates,
            mapped = batch.len(),
            "collected tick batch"
        );
        (report, batch)
    }

    /// Filter and send the batch to every enabled subscriber concurrently.
    async fn dispatch_batch(&self, batch: Arc<Vec<MappedChange>>) -> Vec<DeliveryReport> {
        let subscribers = self.registry.snapshot();
        let mut handles = Vec::with_capacity(subscribers.len());

        for subscriber in subscribers.iter().filter(|s| s.enabled) {
            let payloads: Vec<Value> = batch
                .iter()
                .filter(|m| should_include(subscriber, &m.change, self.geofence.as_ref()))
                .map(|m| m.payload.clone())
                .collect();
            if payloads.is_empty() {
                continue;
            }

            let subscriber = Arc::clone(subscriber);
            let dispatcher = self.dispatcher.clone();
            let name = subscriber.name.clone();
            let events = payloads.len();
            let handle = tokio::spawn(async move { deliver_to(dispatcher, subscriber, payloads).await });
            handles.push((name, events, handle));
        }

        let _abort_on_drop = AbortOnDrop(handles.iter().map(|(_, _, h)| h.abort_handle()).collect());
        let mut reports = Vec::with_capacity(handles.len());
        for (name, events, handle) in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(err) => {
                    error!(subscriber = %name, error = %err, "delivery task failed");
                    reports.push(DeliveryReport {
                        subscriber: name,
                        events,
                        attempts: 0,
                        outcome: DeliveryOutcome::Failed(FailureReason::Aborted),
                    });
                }
            }
        }
        reports
    }

    /// Spawn the periodic loop.
    ///
    /// Each tick's deliveries run in the background so a slow endpoint never
    /// delays the next drain.
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let is_running = Arc::new(AtomicBool::new(true));
        let notify = Arc::new(Notify::new());
        let loop_running = is_running.clone();
        let loop_notify = notify.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;

            let mut in_flight: Vec<JoinHandle<()>> = Vec::new();
            info!(interval_ms = self.config.interval.as_millis() as u64, "webhook scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = loop_notify.notified() => {}
                }
                if !loop_running.load(Ordering::SeqCst) {
                    break;
                }

                in_flight.retain(|h| !h.is_finished());

                let (report, batch) = self.collect();
                if batch.is_empty() {
                    continue;
                }
                debug!(drained = report.drained, "dispatching tick");
                let scheduler = self.clone();
                in_flight.push(tokio::spawn(async move {
                    scheduler.dispatch_batch(Arc::new(batch)).await;
                }));
            }

            let grace = self.config.shutdown_grace;
            let pending = in_flight.len();
            if pending > 0 {
                info!(pending, grace_ms = grace.as_millis() as u64, "waiting for in-flight deliveries");
                let abort_handles: Vec<_> = in_flight.iter().map(JoinHandle::abort_handle).collect();
                let finished = timeout(grace, futures::future::join_all(in_flight)).await;
                if finished.is_err() {
                    warn!(pending, "shutdown grace elapsed, abandoning in-flight deliveries");
                    for handle in abort_handles {
                        handle.abort();
                    }
                }
            }
            info!("webhook scheduler stopped");
        });

        SchedulerHandle {
            is_running,
            notify,
            handle: Some(handle),
        }
    }
}

/// Aborts the wrapped tasks when dropped.
///
/// Spawned deliveries outlive a cancelled `dispatch_batch` otherwise.
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

async fn deliver_to(dispatcher: Dispatcher, subscriber: Arc<Subscriber>, payloads: Vec<Value>) -> DeliveryReport {
    if subscriber.delay_seconds > 0 {
        sleep(subscriber.delay()).await;
    }
    dispatcher.send(&subscriber, &payloads).await
}

/// Controls a running scheduler loop.
pub struct SchedulerHandle {
    is_running: Arc<AtomicBool>,
    notify: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Stop ticking and wait for the loop to finish its grace period.
    ///
    /// Changes still queued, or drained but not yet delivered when the grace
    /// period ends, are lost.
    pub async fn shutdown(&mut self) {
        self.is_running.store(false, Ordering::SeqCst);
        self.notify.notify_one();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}
