/// Translation from an upstream metrics snapshot into flat records
///
/// The upstream collector hands over one snapshot per flush interval. Each
/// metric family expands into dotted keys: counters report an absolute count
/// and a per-second rate, timers report whatever statistics the collector
/// computed (possibly nested one level, e.g. percentile breakdowns), gauges
/// pass through, and sets report their cardinality.
use std::collections::{HashMap, HashSet};

/// One per-interval snapshot from the upstream collector
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub counters: HashMap<String, f64>,
    /// Per-second rates computed by the collector, keyed like `counters`
    pub counter_rates: HashMap<String, f64>,
    pub timer_data: HashMap<String, HashMap<String, TimerStat>>,
    pub gauges: HashMap<String, f64>,
    pub sets: HashMap<String, HashSet<String>>,
}

/// A single timer statistic, or a named breakdown of them
#[derive(Debug, Clone)]
pub enum TimerStat {
    Value(f64),
    Breakdown(HashMap<String, f64>),
}

/// Expand a snapshot into (key, value) records.
pub fn each_record<F: FnMut(String, f64)>(snapshot: &MetricsSnapshot, mut emit: F) {
    for (key, value) in &snapshot.counters {
        emit(format!("{key}.count"), *value);
        let rate = snapshot.counter_rates.get(key).copied().unwrap_or(0.0);
        emit(format!("{key}.rate"), rate);
    }

    for (key, stats) in &snapshot.timer_data {
        for (stat, value) in stats {
            match value {
                TimerStat::Value(v) => emit(format!("{key}.{stat}"), *v),
                TimerStat::Breakdown(subs) => {
                    for (sub, v) in subs {
                        emit(format!("{key}.{stat}.{sub}"), *v);
                    }
                }
            }
        }
    }

    for (key, value) in &snapshot.gauges {
        emit(key.clone(), *value);
    }

    for (key, members) in &snapshot.sets {
        emit(format!("{key}.count"), members.len() as f64);
    }
}
