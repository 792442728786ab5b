//! Telemetry counters, in the style of the project's existing metrics
//! module: `lazy_static` registrations against the global `prometheus`
//! registry. Gated behind the `telemetry` feature so a host that doesn't
//! want a metrics dependency can omit it entirely.
//!
//! Exported metrics:
//! - `fec_encoded_groups_total` / `fec_decoded_groups_total` /
//!   `fec_decode_failures_total`: FEC codec activity.
//! - `pacer_loss_events_total`: congestion-loss signals folded into a
//!   pacer.
//! - `filter_passed_total` / `filter_dropped_total`: Edge Filter
//!   outcomes, mirrored from [`crate::filter::CounterBank`] on read since
//!   the bank itself must stay dependency-free for the hot path.

use lazy_static::lazy_static;
use prometheus::{register_int_counter, IntCounter};

lazy_static! {
    pub static ref FEC_ENCODED_GROUPS: IntCounter =
        register_int_counter!("fec_encoded_groups_total", "Total FEC groups encoded").unwrap();
    pub static ref FEC_DECODED_GROUPS: IntCounter =
        register_int_counter!("fec_decoded_groups_total", "Total FEC groups decoded").unwrap();
    pub static ref FEC_DECODE_FAILURES: IntCounter = register_int_counter!(
        "fec_decode_failures_total",
        "Total FEC decode failures (FAIL status)"
    )
    .unwrap();
    pub static ref PACER_LOSS_EVENTS: IntCounter =
        register_int_counter!("pacer_loss_events_total", "Total non-debounced loss signals")
            .unwrap();
    pub static ref FILTER_PASSED: IntCounter =
        register_int_counter!("filter_passed_total", "Total packets passed by the Edge Filter")
            .unwrap();
    pub static ref FILTER_DROPPED: IntCounter =
        register_int_counter!("filter_dropped_total", "Total packets dropped by the Edge Filter")
            .unwrap();
}

/// Copies the current values out of a [`crate::filter::CounterBank`] into
/// the process-wide prometheus registry. The bank itself stays on plain
/// atomics so the Edge Filter's hot path never touches the registry.
pub fn record_filter_bank(bank: &crate::filter::CounterBank) {
    use std::sync::atomic::Ordering;
    FILTER_PASSED.inc_by(bank.passed.swap(0, Ordering::Relaxed));
    let dropped = bank.dropped_blacklist.swap(0, Ordering::Relaxed)
        + bank.dropped_rate_limit.swap(0, Ordering::Relaxed)
        + bank.dropped_invalid_magic.swap(0, Ordering::Relaxed)
        + bank.dropped_too_short.swap(0, Ordering::Relaxed)
        + bank.dropped_not_udp.swap(0, Ordering::Relaxed);
    FILTER_DROPPED.inc_by(dropped);
}

/// Renders the current registry as Prometheus text exposition format.
/// Serving it over HTTP is a host concern (spec section 1); this only
/// produces the bytes.
pub fn render() -> String {
    use prometheus::{Encoder, TextEncoder};
    let encoder = TextEncoder::new();
    let metrics = prometheus::gather();
    let mut buf = Vec::new();
    encoder.encode(&metrics, &mut buf).unwrap();
    String::from_utf8_lossy(&buf).into_owned()
}
