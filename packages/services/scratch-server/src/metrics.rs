use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use once_cell::sync::Lazy;

/// Lightweight histogram buckets (ms), mirroring the teacher's own
/// `search-service` metrics module rather than pulling in a Prometheus
/// client the teacher itself never reaches for.
static LATENCY_BUCKETS: &[u64] = &[1, 5, 10, 25, 50, 100, 250, 500, 1000, 2500, 5000];

#[derive(Default, Debug, Clone)]
pub struct Histogram {
    pub buckets: Vec<u64>,
    pub counts: Vec<u64>,
    pub sum: u128,
    pub total: u64,
}

impl Histogram {
    pub fn new(buckets: &[u64]) -> Self {
        Self {
            buckets: buckets.to_vec(),
            counts: vec![0; buckets.len() + 1],
            sum: 0,
            total: 0,
        }
    }

    pub fn record(&mut self, v_ms: u64) {
        self.total += 1;
        self.sum += v_ms as u128;
        for (i, b) in self.buckets.iter().enumerate() {
            if v_ms <= *b {
                self.counts[i] += 1;
                return;
            }
        }
        *self.counts.last_mut().unwrap() += 1;
    }
}

pub static TOOL_CALL_LATENCY: Lazy<Mutex<Histogram>> = Lazy::new(|| Mutex::new(Histogram::new(LATENCY_BUCKETS)));
pub static SEARCH_LATENCY: Lazy<Mutex<Histogram>> = Lazy::new(|| Mutex::new(Histogram::new(LATENCY_BUCKETS)));

pub static TOOL_CALLS_OK: Lazy<AtomicU64> = Lazy::new(|| AtomicU64::new(0));
pub static TOOL_CALLS_ERROR: Lazy<AtomicU64> = Lazy::new(|| AtomicU64::new(0));
pub static SCRATCHPADS_CREATED: Lazy<AtomicU64> = Lazy::new(|| AtomicU64::new(0));
pub static SCRATCHPADS_EVICTED: Lazy<AtomicU64> = Lazy::new(|| AtomicU64::new(0));
pub static VALIDATION_TIMEOUTS: Lazy<AtomicU64> = Lazy::new(|| AtomicU64::new(0));

pub fn record_tool_call_latency(ms: u64) {
    if let Ok(mut h) = TOOL_CALL_LATENCY.lock() {
        h.record(ms);
    }
}

pub fn record_search_latency(ms: u64) {
    if let Ok(mut h) = SEARCH_LATENCY.lock() {
        h.record(ms);
    }
}

pub fn record_tool_call_ok() {
    TOOL_CALLS_OK.fetch_add(1, Ordering::Relaxed);
}

pub fn record_tool_call_error() {
    TOOL_CALLS_ERROR.fetch_add(1, Ordering::Relaxed);
}

pub fn record_scratchpad_created() {
    SCRATCHPADS_CREATED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_scratchpads_evicted(n: u64) {
    SCRATCHPADS_EVICTED.fetch_add(n, Ordering::Relaxed);
}

pub fn record_validation_timeout() {
    VALIDATION_TIMEOUTS.fetch_add(1, Ordering::Relaxed);
}

fn histogram_json(h: &Mutex<Histogram>) -> serde_json::Value {
    h.lock()
        .ok()
        .map(|hh| {
            serde_json::json!({
                "buckets": hh.buckets,
                "counts": hh.counts,
                "sum_ms": hh.sum,
                "total": hh.total,
            })
        })
        .unwrap_or(serde_json::Value::Null)
}

pub fn export_metrics_json() -> serde_json::Value {
    serde_json::json!({
        "tool_call_latency_ms": histogram_json(&TOOL_CALL_LATENCY),
        "search_latency_ms": histogram_json(&SEARCH_LATENCY),
        "tool_calls": {
            "ok": TOOL_CALLS_OK.load(Ordering::Relaxed),
            "error": TOOL_CALLS_ERROR.load(Ordering::Relaxed),
        },
        "scratchpads": {
            "created": SCRATCHPADS_CREATED.load(Ordering::Relaxed),
            "evicted": SCRATCHPADS_EVICTED.load(Ordering::Relaxed),
        },
        "validation_timeouts": VALIDATION_TIMEOUTS.load(Ordering::Relaxed),
    })
}
