//! Prometheus metrics for the controller and the streaming pipeline.
//!
//! Metrics cover:
//! - Controller recovery progress (batches, records per kind)
//! - The topic-creation write path (append outcomes)
//! - Background partition-manage completions
//! - Partitions managed on this node
//!
//! # Safety
//!
//! All metrics are registered to a custom registry with the "metalog" prefix
//! to avoid name collisions with other libraries using the default Prometheus
//! registry. Registration errors are handled gracefully - if a metric fails
//! to register, a fallback no-op metric is used instead of panicking.

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Registry, TextEncoder, opts};
use tracing::warn;

/// Custom Prometheus registry for metalog metrics.
/// Using a custom registry prevents name collisions with other libraries.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    Registry::new_custom(Some("metalog".to_string()), None).unwrap_or_else(|_| Registry::new())
});

fn register_int_counter_safe(registry: &Registry, name: &str, help: &str) -> IntCounter {
    match IntCounter::with_opts(opts!(name, help)) {
        Ok(counter) => {
            if let Err(e) = registry.register(Box::new(counter.clone())) {
                warn!(metric = name, error = %e, "Failed to register metric");
            }
            counter
        }
        Err(e) => {
            warn!(metric = name, error = %e, "Failed to create metric, using fallback");
            IntCounter::new("fallback", "fallback").expect("fallback counter")
        }
    }
}

fn register_int_counter_vec_safe(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> IntCounterVec {
    match IntCounterVec::new(opts!(name, help), labels) {
        Ok(counter) => {
            if let Err(e) = registry.register(Box::new(counter.clone())) {
                warn!(metric = name, error = %e, "Failed to register metric");
            }
            counter
        }
        Err(e) => {
            warn!(metric = name, error = %e, "Failed to create metric, using fallback");
            IntCounterVec::new(opts!("fallback", "fallback"), labels)
                .expect("fallback counter vec")
        }
    }
}

fn register_int_gauge_safe(registry: &Registry, name: &str, help: &str) -> IntGauge {
    match IntGauge::with_opts(opts!(name, help)) {
        Ok(gauge) => {
            if let Err(e) = registry.register(Box::new(gauge.clone())) {
                warn!(metric = name, error = %e, "Failed to register metric");
            }
            gauge
        }
        Err(e) => {
            warn!(metric = name, error = %e, "Failed to create metric, using fallback");
            IntGauge::new("fallback", "fallback").expect("fallback gauge")
        }
    }
}

/// Record batches applied during controller recovery.
pub static RECOVERY_BATCHES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter_safe(
        &REGISTRY,
        "recovery_batches_total",
        "Record batches applied during controller recovery",
    )
});

/// Records dispatched during controller recovery, labeled by record kind.
pub static RECOVERY_RECORDS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec_safe(
        &REGISTRY,
        "recovery_records_total",
        "Records dispatched during controller recovery",
        &["kind"],
    )
});

/// Controller log appends, labeled by outcome (committed, rejected, error, timeout).
pub static CONTROLLER_APPENDS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec_safe(
        &REGISTRY,
        "controller_appends_total",
        "Controller log appends by outcome",
        &["outcome"],
    )
});

/// Background partition-manage completions, labeled by outcome.
pub static BACKGROUND_MANAGE: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec_safe(
        &REGISTRY,
        "background_manage_total",
        "Background partition-manage completions by outcome",
        &["outcome"],
    )
});

/// Partitions currently managed on this node across all shards.
pub static MANAGED_PARTITIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge_safe(
        &REGISTRY,
        "managed_partitions",
        "Partitions currently managed on this node",
    )
});

/// Record a controller append outcome.
pub fn record_append(outcome: &str) {
    CONTROLLER_APPENDS.with_label_values(&[outcome]).inc();
}

/// Record a background partition-manage outcome.
pub fn record_background_manage(outcome: &str) {
    BACKGROUND_MANAGE.with_label_values(&[outcome]).inc();
}

/// Gather all registered metrics in the Prometheus text exposition format.
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment() {
        let before = RECOVERY_BATCHES.get();
        RECOVERY_BATCHES.inc();
        assert_eq!(RECOVERY_BATCHES.get(), before + 1);
    }

    #[test]
    fn test_labeled_counters() {
        record_append("committed");
        assert!(
            CONTROLLER_APPENDS
                .with_label_values(&["committed"])
                .get()
                >= 1
        );
    }

    #[test]
    fn test_gather_includes_prefix() {
        RECOVERY_BATCHES.inc();
        let text = gather();
        assert!(text.contains("metalog_recovery_batches_total"));
    }
}
