//! Span helpers for work-order operations.

use tracing::Span;

use crate::model::{Status, WorkOrderId};

/// Span for one engine operation on a work order.
///
/// `work_order.status` is declared empty; fill it with
/// [`record_state_transition`] or [`record_status`].
pub fn start_order_span(operation: &'static str, work_order_id: &WorkOrderId) -> Span {
    tracing::info_span!(
        "work_order",
        "work_order.operation" = operation,
        "work_order.id" = %work_order_id,
        "work_order.status" = tracing::field::Empty,
    )
}

pub fn record_status(span: &Span, status: Status) {
    span.record("work_order.status", status.as_str());
}

/// Emit a `state_transition` event in the span and record the new status.
pub fn record_state_transition(span: &Span, from: Status, to: Status) {
    record_status(span, to);
    span.in_scope(|| {
        tracing::info!(from = from.as_str(), to = to.as_str(), "state_transition");
    });
}
