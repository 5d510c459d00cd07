use lazy_static::lazy_static;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Registry, TextEncoder};
use std::sync::OnceLock;

lazy_static! {
    static ref REGISTRY: Registry = Registry::new();
}

static EXCHANGES: OnceLock<IntCounterVec> = OnceLock::new();
static MODEL_REQUESTS: OnceLock<IntCounterVec> = OnceLock::new();
static MODEL_LATENCY: OnceLock<HistogramVec> = OnceLock::new();
static STATEMENTS: OnceLock<IntCounterVec> = OnceLock::new();
static ACTIVE_SESSIONS: OnceLock<IntGauge> = OnceLock::new();

/// Register all collectors. Safe to call more than once.
pub fn init_metrics() {
    if let Ok(counter) = IntCounterVec::new(
        prometheus::opts!("askdb_exchanges_total", "Exchanges by terminal state"),
        &["state"],
    ) {
        if EXCHANGES.set(counter.clone()).is_ok() {
            REGISTRY.register(Box::new(counter)).ok();
        }
    }

    if let Ok(counter) = IntCounterVec::new(
        prometheus::opts!("askdb_model_requests_total", "Language model calls by stage and status"),
        &["stage", "status"],
    ) {
        if MODEL_REQUESTS.set(counter.clone()).is_ok() {
            REGISTRY.register(Box::new(counter)).ok();
        }
    }

    if let Ok(histogram) = HistogramVec::new(
        HistogramOpts::new("askdb_model_request_seconds", "Language model call latency"),
        &["stage"],
    ) {
        if MODEL_LATENCY.set(histogram.clone()).is_ok() {
            REGISTRY.register(Box::new(histogram)).ok();
        }
    }

    if let Ok(counter) = IntCounterVec::new(
        prometheus::opts!("askdb_statements_total", "SQL statements by kind and status"),
        &["kind", "status"],
    ) {
        if STATEMENTS.set(counter.clone()).is_ok() {
            REGISTRY.register(Box::new(counter)).ok();
        }
    }

    if let Ok(gauge) = IntGauge::new("askdb_active_sessions", "Sessions held by the server") {
        if ACTIVE_SESSIONS.set(gauge.clone()).is_ok() {
            REGISTRY.register(Box::new(gauge)).ok();
        }
    }
}

pub fn inc_exchange(state: &str) {
    if let Some(counter) = EXCHANGES.get() {
        counter.with_label_values(&[state]).inc();
    }
}

pub fn inc_model_request(stage: &str, status: &str) {
    if let Some(counter) = MODEL_REQUESTS.get() {
        counter.with_label_values(&[stage, status]).inc();
    }
}

pub fn observe_model_latency(stage: &str, seconds: f64) {
    if let Some(histogram) = MODEL_LATENCY.get() {
        histogram.with_label_values(&[stage]).observe(seconds);
    }
}

pub fn inc_statement(kind: &str, status: &str) {
    if let Some(counter) = STATEMENTS.get() {
        counter.with_label_values(&[kind, status]).inc();
    }
}

pub fn inc_sessions() {
    if let Some(gauge) = ACTIVE_SESSIONS.get() {
        gauge.inc();
    }
}

pub fn dec_sessions() {
    if let Some(gauge) = ACTIVE_SESSIONS.get() {
        gauge.dec();
    }
}

/// Text exposition of every registered collector.
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&REGISTRY.gather(), &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
