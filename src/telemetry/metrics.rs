//! Metric instruments, created from the global `"arycar"` meter.
//!
//! Without an OTLP endpoint the global meter is a no-op, so recording is
//! always safe.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("arycar")
}

/// Counter: work orders created.
pub fn work_orders_created() -> Counter<u64> {
    meter()
        .u64_counter("arycar.work_order.created")
        .with_description("Number of work orders created")
        .build()
}

/// Counter: applied status transitions.
/// Labels: `from`, `to`.
pub fn status_transitions() -> Counter<u64> {
    meter()
        .u64_counter("arycar.work_order.transitions")
        .with_description("Number of applied work order status transitions")
        .build()
}

/// Counter: rejected transition requests.
/// Labels: `reason` (error kind), `to`.
pub fn transition_rejections() -> Counter<u64> {
    meter()
        .u64_counter("arycar.work_order.transition_rejections")
        .with_description("Number of rejected status transition requests")
        .build()
}

/// Counter: media attached.
/// Labels: `type`.
pub fn media_attached() -> Counter<u64> {
    meter()
        .u64_counter("arycar.media.attached")
        .with_description("Number of media items attached to work orders")
        .build()
}

/// Counter: notification dispatch outcomes.
/// Labels: `kind`, `result` ("ok" | "error").
pub fn notifications() -> Counter<u64> {
    meter()
        .u64_counter("arycar.notifications")
        .with_description("Number of notification dispatch attempts")
        .build()
}

/// Histogram: engine operation duration in milliseconds.
/// Labels: `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("arycar.operation.duration_ms")
        .with_description("Engine operation duration in milliseconds")
        .with_unit("ms")
        .build()
}
