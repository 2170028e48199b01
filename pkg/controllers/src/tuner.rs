use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Instrument, debug, info, info_span, warn};

use pkg_constants::events::{REASON_DOWNSCALE_MIN, REASON_FAILED_PROCESS, REASON_UPSCALE_MIN};
use pkg_constants::registry::TUNER_PREFIX;
use pkg_constants::tuning::{DEFAULT_MAX_CONCURRENT_RECONCILES, QUEUE_TICK_MILLIS};
use pkg_decision::DecisionSource;
use pkg_metrics::{
    DECISION_ERRORS_TOTAL, FLOOR_LOWERED_TOTAL, FLOOR_RAISED_TOTAL, MANAGED_TUNERS,
    MetricsRegistry, PERSIST_ERRORS_TOTAL, RECONCILE_TOTAL,
};
use pkg_state::registry::{AutoscalerStore, TunerStore};
use pkg_state::watch::{EventLog, WatchEvent};
use pkg_types::event::{EventType, TunerEvent};
use pkg_types::hpa::HorizontalPodAutoscaler;
use pkg_types::object::ObjectKey;
use pkg_types::tuner::HpaTuner;
use pkg_types::validate::validate_tuner_spec;

use crate::policy::{ScalingAction, evaluate};
use crate::recorder::EventRecorder;

/// What the scheduler should do with a tuner after one reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Reconcile again after the delay.
    Repeat(Duration),
    /// The tuner is gone; stop tracking it.
    Stop,
}

/// Everything a reconcile needs, shared by all in-flight reconciles.
pub struct TunerContext {
    pub tuners: Arc<dyn TunerStore>,
    pub autoscalers: Arc<dyn AutoscalerStore>,
    pub decisions: DecisionSource,
    pub recorder: Arc<dyn EventRecorder>,
    pub metrics: Arc<MetricsRegistry>,
    pub sync_period: Duration,
}

/// Run one evaluation cycle for the tuner at `key`.
///
/// Failures are logged and recorded; they never propagate. Every path except
/// a deleted tuner asks to be repeated after the sync period.
pub async fn reconcile(ctx: &TunerContext, key: &ObjectKey) -> ReconcileAction {
    let span = info_span!("reconcile", tuner = %key);
    let (outcome, action) = reconcile_inner(ctx, key).instrument(span).await;
    ctx.metrics
        .counter_inc(RECONCILE_TOTAL, &[("outcome", outcome)]);
    action
}

async fn reconcile_inner(ctx: &TunerContext, key: &ObjectKey) -> (&'static str, ReconcileAction) {
    let repeat = ReconcileAction::Repeat(ctx.sync_period);

    let tuner = match ctx.tuners.get_tuner(key).await {
        Ok(Some(tuner)) => tuner,
        Ok(None) => {
            debug!("Tuner {} no longer exists, dropping", key);
            return ("deleted", ReconcileAction::Stop);
        }
        Err(e) if e.is_not_found() => return ("deleted", ReconcileAction::Stop),
        Err(e) => {
            warn!("Failed to read tuner {}: {}", key, e);
            return ("error", repeat);
        }
    };

    if let Err(e) = validate_tuner_spec(&tuner.spec) {
        ctx.recorder
            .record(TunerEvent::new(
                key.clone(),
                EventType::Warning,
                REASON_FAILED_PROCESS,
                format!("invalid spec: {}", e),
            ))
            .await;
        return ("invalid", repeat);
    }

    let target_key = tuner.target_key();
    let hpa = match ctx.autoscalers.get_autoscaler(&target_key).await {
        Ok(Some(hpa)) => hpa,
        Ok(None) => {
            warn!("Tuner {}: target autoscaler {} not found", key, target_key);
            return ("target_missing", repeat);
        }
        Err(e) => {
            warn!("Tuner {}: failed to read autoscaler {}: {}", key, target_key, e);
            return ("error", repeat);
        }
    };

    let advisory = if tuner.spec.use_decision_service && ctx.decisions.is_enabled() {
        let name = target_key.to_string();
        match ctx
            .decisions
            .advisory(&name, hpa.spec.min_replicas, hpa.status.current_replicas)
            .await
        {
            Ok(min) => Some(min),
            Err(e) => {
                warn!("Tuner {}: no advisory from decision service: {:#}", key, e);
                ctx.metrics.counter_inc(DECISION_ERRORS_TOTAL, &[]);
                None
            }
        }
    } else {
        if tuner.spec.use_decision_service {
            debug!("Tuner {}: decision service requested but not configured", key);
        }
        None
    };

    let now = Utc::now();
    let action = evaluate(&tuner.spec, &tuner.status, &hpa, advisory, now);
    debug!(
        "Tuner {}: floor={} desired={} utilization={:?} advisory={:?} => {:?}",
        key,
        hpa.spec.min_replicas,
        hpa.status.desired_replicas,
        hpa.status.current_cpu_utilization_percent,
        advisory,
        action
    );

    match action {
        ScalingAction::NoAction => ("no_action", repeat),
        ScalingAction::RaiseFloorTo(_) | ScalingAction::LowerFloorTo(_) => {
            if apply_floor(ctx, &tuner, &hpa, action, now).await {
                ("scaled", repeat)
            } else {
                ("error", repeat)
            }
        }
    }
}

/// Write the new floor, then the transition timestamp. The status is only
/// touched once the floor write has succeeded.
async fn apply_floor(
    ctx: &TunerContext,
    tuner: &HpaTuner,
    hpa: &HorizontalPodAutoscaler,
    action: ScalingAction,
    now: DateTime<Utc>,
) -> bool {
    let key = tuner.key();
    let Some(new_min) = action.target() else {
        return true;
    };
    let old_min = hpa.spec.min_replicas;

    if let Err(e) = ctx
        .autoscalers
        .update_autoscaler_min(&hpa.key(), hpa.resource_version, new_min)
        .await
    {
        ctx.metrics
            .counter_inc(PERSIST_ERRORS_TOTAL, &[("resource", "autoscaler")]);
        ctx.recorder
            .record(TunerEvent::new(
                key,
                EventType::Warning,
                REASON_FAILED_PROCESS,
                format!(
                    "failed to set min of {} from {} to {}: {}",
                    hpa.key(),
                    old_min,
                    new_min,
                    e
                ),
            ))
            .await;
        return false;
    }

    let mut status = tuner.status.clone();
    let (reason, counter) = match action {
        ScalingAction::LowerFloorTo(_) => {
            status.last_down_scale_time = Some(now);
            (REASON_DOWNSCALE_MIN, FLOOR_LOWERED_TOTAL)
        }
        _ => {
            status.last_up_scale_time = Some(now);
            (REASON_UPSCALE_MIN, FLOOR_RAISED_TOTAL)
        }
    };
    ctx.metrics
        .counter_inc(counter, &[("namespace", key.namespace.as_str())]);
    info!(
        "Tuner {}: min of {} {} -> {}",
        key,
        hpa.key(),
        old_min,
        new_min
    );

    let mut ok = true;
    if let Err(e) = ctx
        .tuners
        .update_tuner_status(&key, tuner.resource_version, &status)
        .await
    {
        ok = false;
        ctx.metrics
            .counter_inc(PERSIST_ERRORS_TOTAL, &[("resource", "tuner")]);
        ctx.recorder
            .record(TunerEvent::new(
                key.clone(),
                EventType::Warning,
                REASON_FAILED_PROCESS,
                format!("min set to {} but status update failed: {}", new_min, e),
            ))
            .await;
    }

    ctx.recorder
        .record(TunerEvent::new(
            key,
            EventType::Normal,
            reason,
            format!("Locked Min to {}", new_min),
        ))
        .await;
    ok
}

/// Per-tuner due times. A key taken out for a reconcile comes back through
/// [`WorkQueue::schedule`] when that reconcile finishes.
#[derive(Debug, Default)]
pub struct WorkQueue {
    due: HashMap<ObjectKey, Instant>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `key` if it is not tracked yet.
    pub fn track(&mut self, key: ObjectKey, now: Instant) {
        self.due.entry(key).or_insert(now);
    }

    /// Make `key` due immediately.
    pub fn mark_due(&mut self, key: ObjectKey, now: Instant) {
        self.due.insert(key, now);
    }

    /// Remove and return up to `limit` keys due at `now`, earliest first.
    /// Keys for which `busy` holds stay queued.
    pub fn take_due(
        &mut self,
        now: Instant,
        limit: usize,
        busy: impl Fn(&ObjectKey) -> bool,
    ) -> Vec<ObjectKey> {
        let mut due: Vec<(&ObjectKey, &Instant)> = self
            .due
            .iter()
            .filter(|(key, at)| **at <= now && !busy(key))
            .collect();
        due.sort_by_key(|(_, at)| **at);
        let keys: Vec<ObjectKey> = due
            .into_iter()
            .take(limit)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            self.due.remove(key);
        }
        keys
    }

    /// Requeue a key after its reconcile finished. A key marked due while
    /// it was in flight keeps the earlier due time.
    pub fn schedule(&mut self, key: ObjectKey, action: ReconcileAction, now: Instant) {
        match action {
            ReconcileAction::Repeat(delay) => {
                let at = now + delay;
                self.due
                    .entry(key)
                    .and_modify(|due| *due = (*due).min(at))
                    .or_insert(at);
            }
            ReconcileAction::Stop => {
                self.due.remove(&key);
            }
        }
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.due.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.due.len()
    }

    pub fn is_empty(&self) -> bool {
        self.due.is_empty()
    }
}

/// Drives [`reconcile`] for every tuner in the store.
///
/// New tuners are discovered on each tick. A write under the tuner prefix
/// makes that tuner due at once. Reconciles only run while `leader` is true,
/// and at most `max_concurrent` run at the same time. Each reconcile is its
/// own task and its key is requeued as soon as it finishes, so a slow tuner
/// only holds up its own key.
pub struct HpaTunerController {
    ctx: Arc<TunerContext>,
    leader: watch::Receiver<bool>,
    changes: Option<EventLog>,
    tick: Duration,
    max_concurrent: usize,
    queue: WorkQueue,
    tasks: JoinSet<ReconcileAction>,
    in_flight: HashMap<Id, ObjectKey>,
}

impl HpaTunerController {
    pub fn new(ctx: TunerContext, leader: watch::Receiver<bool>) -> Self {
        Self {
            ctx: Arc::new(ctx),
            leader,
            changes: None,
            tick: Duration::from_millis(QUEUE_TICK_MILLIS),
            max_concurrent: DEFAULT_MAX_CONCURRENT_RECONCILES,
            queue: WorkQueue::new(),
            tasks: JoinSet::new(),
            in_flight: HashMap::new(),
        }
    }

    /// React to tuner writes in `log` instead of waiting for the next tick.
    pub fn with_watch(mut self, log: EventLog) -> Self {
        self.changes = Some(log);
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Start the controller loop as a background task.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(mut self) {
        info!(
            "HpaTunerController started (sync={}s, tick={}ms, concurrency={}, watch={})",
            self.ctx.sync_period.as_secs(),
            self.tick.as_millis(),
            self.max_concurrent,
            self.changes.is_some()
        );
        let mut changes = self.changes.as_ref().map(|log| log.subscribe());
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.discover().await;
                }
                result = next_change(&mut changes) => {
                    match result {
                        Ok(event) => {
                            if let Some(key) = ObjectKey::from_storage_key(TUNER_PREFIX, &event.key) {
                                debug!("Tuner {} changed ({:?})", key, event.event_type);
                                self.queue.mark_due(key, Instant::now());
                            }
                        }
                        Err(RecvError::Lagged(n)) => {
                            debug!("Watch lagged by {} events; relying on the next tick", n);
                        }
                        Err(RecvError::Closed) => {
                            warn!("Watch channel closed; falling back to periodic sync");
                            changes = None;
                        }
                    }
                }
                Some(joined) = self.tasks.join_next_with_id(), if !self.tasks.is_empty() => {
                    self.finish(joined);
                }
            }
            self.start_due();
        }
    }

    async fn discover(&mut self) {
        match self.ctx.tuners.list_tuner_keys().await {
            Ok(keys) => {
                let now = Instant::now();
                for key in keys {
                    // requeued when its reconcile finishes
                    if self.is_in_flight(&key) {
                        continue;
                    }
                    if !self.queue.contains(&key) {
                        debug!("Tracking tuner {}", key);
                    }
                    self.queue.track(key, now);
                }
            }
            Err(e) => warn!("HpaTunerController failed to list tuners: {}", e),
        }
        self.report_managed();
    }

    fn is_in_flight(&self, key: &ObjectKey) -> bool {
        self.in_flight.values().any(|k| k == key)
    }

    /// Spawn reconciles for due keys while there is room.
    fn start_due(&mut self) {
        if !*self.leader.borrow() {
            return;
        }
        let room = self.max_concurrent.saturating_sub(self.tasks.len());
        if room == 0 {
            return;
        }
        let in_flight = &self.in_flight;
        let due = self
            .queue
            .take_due(Instant::now(), room, |key| in_flight.values().any(|k| k == key));
        for key in due {
            let ctx = self.ctx.clone();
            let task_key = key.clone();
            let handle = self
                .tasks
                .spawn(async move { reconcile(&ctx, &task_key).await });
            self.in_flight.insert(handle.id(), key);
        }
    }

    /// Requeue the key of a finished reconcile.
    fn finish(&mut self, joined: Result<(Id, ReconcileAction), JoinError>) {
        let id = match &joined {
            Ok((id, _)) => *id,
            Err(e) => e.id(),
        };
        let Some(key) = self.in_flight.remove(&id) else {
            return;
        };
        let action = match joined {
            Ok((_, action)) => action,
            Err(e) => {
                warn!("Reconcile of tuner {} did not complete: {}", key, e);
                self.ctx
                    .metrics
                    .counter_inc(RECONCILE_TOTAL, &[("outcome", "error")]);
                ReconcileAction::Repeat(self.ctx.sync_period)
            }
        };
        self.queue.schedule(key, action, Instant::now());
        self.report_managed();
    }

    fn report_managed(&self) {
        let in_flight_only = self
            .in_flight
            .values()
            .filter(|key| !self.queue.contains(key))
            .count();
        self.ctx.metrics.gauge_set(
            MANAGED_TUNERS,
            &[],
            (self.queue.len() + in_flight_only) as i64,
        );
    }
}

async fn next_change(
    changes: &mut Option<broadcast::Receiver<WatchEvent>>,
) -> Result<WatchEvent, RecvError> {
    match changes {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
