//! Process metrics for hpa-tuner, rendered in Prometheus text format.

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Reconciliation cycles run, labeled by `outcome`.
pub const RECONCILE_TOTAL: &str = "hpa_tuner_reconcile_total";
/// Floors raised on target autoscalers, labeled by `namespace`.
pub const FLOOR_RAISED_TOTAL: &str = "hpa_tuner_floor_raised_total";
/// Floors lowered on target autoscalers, labeled by `namespace`.
pub const FLOOR_LOWERED_TOTAL: &str = "hpa_tuner_floor_lowered_total";
/// Decision-service lookups that failed.
pub const DECISION_ERRORS_TOTAL: &str = "hpa_tuner_decision_service_errors_total";
/// Failed writes, labeled by `resource` (`autoscaler` / `tuner` / `event`).
pub const PERSIST_ERRORS_TOTAL: &str = "hpa_tuner_persist_errors_total";
/// Tuners currently tracked by the controller.
pub const MANAGED_TUNERS: &str = "hpa_tuner_managed";

/// Label set of one series, kept sorted so equal sets render identically.
type Labels = Vec<(String, String)>;

struct Family<V> {
    help: String,
    series: BTreeMap<Labels, V>,
}

impl<V> Family<V> {
    fn new(help: &str) -> Self {
        Self {
            help: help.to_string(),
            series: BTreeMap::new(),
        }
    }
}

fn to_labels(labels: &[(&str, &str)]) -> Labels {
    let mut out: Labels = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    out.sort();
    out
}

fn render_labels(labels: &Labels) -> String {
    if labels.is_empty() {
        return String::new();
    }
    let inner: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, v.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("{{{}}}", inner.join(","))
}

/// A thread-safe counter/gauge registry with per-label-set series.
///
/// Operations on unregistered metric names are ignored.
pub struct MetricsRegistry {
    counters: RwLock<BTreeMap<String, Family<AtomicU64>>>,
    gauges: RwLock<BTreeMap<String, Family<AtomicI64>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(BTreeMap::new()),
            gauges: RwLock::new(BTreeMap::new()),
        }
    }

    /// Registry with every hpa-tuner metric registered.
    pub fn for_tuner() -> Self {
        let registry = Self::new();
        registry.register_counter(RECONCILE_TOTAL, "Reconciliation cycles run");
        registry.register_counter(FLOOR_RAISED_TOTAL, "Autoscaler floors raised");
        registry.register_counter(FLOOR_LOWERED_TOTAL, "Autoscaler floors lowered");
        registry.register_counter(
            DECISION_ERRORS_TOTAL,
            "Decision service lookups that produced no advisory",
        );
        registry.register_counter(PERSIST_ERRORS_TOTAL, "Failed writes to the state store");
        registry.register_gauge(MANAGED_TUNERS, "Tuners tracked by the controller");
        registry
    }

    pub fn register_counter(&self, name: &str, help: &str) {
        if let Ok(mut counters) = self.counters.write() {
            counters
                .entry(name.to_string())
                .or_insert_with(|| Family::new(help));
        }
    }

    pub fn register_gauge(&self, name: &str, help: &str) {
        if let Ok(mut gauges) = self.gauges.write() {
            gauges
                .entry(name.to_string())
                .or_insert_with(|| Family::new(help));
        }
    }

    pub fn counter_inc(&self, name: &str, labels: &[(&str, &str)]) {
        self.counter_add(name, labels, 1);
    }

    pub fn counter_add(&self, name: &str, labels: &[(&str, &str)], val: u64) {
        let labels = to_labels(labels);
        // fast path: series already exists
        if let Ok(counters) = self.counters.read() {
            match counters.get(name) {
                Some(family) => {
                    if let Some(c) = family.series.get(&labels) {
                        c.fetch_add(val, Ordering::Relaxed);
                        return;
                    }
                }
                None => return,
            }
        }
        if let Ok(mut counters) = self.counters.write()
            && let Some(family) = counters.get_mut(name)
        {
            family
                .series
                .entry(labels)
                .or_insert_with(|| AtomicU64::new(0))
                .fetch_add(val, Ordering::Relaxed);
        }
    }

    pub fn gauge_set(&self, name: &str, labels: &[(&str, &str)], val: i64) {
        let labels = to_labels(labels);
        if let Ok(mut gauges) = self.gauges.write()
            && let Some(family) = gauges.get_mut(name)
        {
            family
                .series
                .entry(labels)
                .or_insert_with(|| AtomicI64::new(0))
                .store(val, Ordering::Relaxed);
        }
    }

    /// Current value of a counter series, if it exists.
    pub fn counter_value(&self, name: &str, labels: &[(&str, &str)]) -> Option<u64> {
        let counters = self.counters.read().ok()?;
        let value = counters
            .get(name)?
            .series
            .get(&to_labels(labels))?
            .load(Ordering::Relaxed);
        Some(value)
    }

    /// Current value of a gauge series, if it exists.
    pub fn gauge_value(&self, name: &str, labels: &[(&str, &str)]) -> Option<i64> {
        let gauges = self.gauges.read().ok()?;
        let value = gauges
            .get(name)?
            .series
            .get(&to_labels(labels))?
            .load(Ordering::Relaxed);
        Some(value)
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut output = String::new();

        if let Ok(counters) = self.counters.read() {
            for (name, family) in counters.iter() {
                output.push_str(&format!("# HELP {} {}\n", name, family.help));
                output.push_str(&format!("# TYPE {} counter\n", name));
                for (labels, value) in &family.series {
                    output.push_str(&format!(
                        "{}{} {}\n",
                        name,
                        render_labels(labels),
                        value.load(Ordering::Relaxed)
                    ));
                }
            }
        }

        if let Ok(gauges) = self.gauges.read() {
            for (name, family) in gauges.iter() {
                output.push_str(&format!("# HELP {} {}\n", name, family.help));
                output.push_str(&format!("# TYPE {} gauge\n", name));
                for (labels, value) in &family.series {
                    output.push_str(&format!(
                        "{}{} {}\n",
                        name,
                        render_labels(labels),
                        value.load(Ordering::Relaxed)
                    ));
                }
            }
        }

        output
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
