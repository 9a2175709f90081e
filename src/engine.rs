//! Lifecycle engine. The public API for creating and advancing work orders.
//!
//! The engine owns the store and the notifier. Every status change goes
//! through [`Engine::request_transition`], which checks the transition
//! table and its guard, then commits status, milestone and event as one
//! compare-and-swap. The engine never retries.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use opentelemetry::KeyValue;
use tracing::{Instrument, debug, info, warn};

use crate::error::{Error, Result};
use crate::lifecycle::{self, AllowedTransition, MediaSet};
use crate::model::*;
use crate::notify::{self, MockNotifier, NotificationKind, NotificationTasks, Notifier};
use crate::plate::{parse_phone, parse_plate};
use crate::store::{CreateOrder, MemoryStore, StatusChange, Store};
use crate::telemetry::metrics;
use crate::telemetry::order::{record_state_transition, record_status, start_order_span};

/// The work-order engine. Owns all lifecycle state and enforces its invariants.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    notifications: NotificationTasks,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            notifier,
            notifications: NotificationTasks::new(),
        }
    }

    /// In-memory store with the mock notification channel (for testing).
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MockNotifier::new()))
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Wait for in-flight notifications. Call before the runtime shuts
    /// down, which would otherwise cancel them.
    pub async fn shutdown(&self) {
        let pending = self.notifications.pending();
        if pending > 0 {
            debug!(pending, "waiting for notifications");
        }
        self.notifications.drain().await;
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Create a work order in `CREATED`, together with its `created` event.
    pub async fn create_work_order(&self, new: NewWorkOrder, actor: UserId) -> Result<WorkOrder> {
        let plate = parse_plate(&new.plate)?;
        let customer_phone = parse_phone(&new.customer_phone)?;

        if new.services.is_empty() {
            return Err(Error::Validation(
                "a work order needs at least one service".to_string(),
            ));
        }
        if let Some((service_id, _)) = new.services.iter().find(|(_, qty)| *qty == 0) {
            return Err(Error::Validation(format!(
                "quantity for service {service_id} must be at least 1"
            )));
        }
        if let Some((service_id, _)) = new
            .services
            .iter()
            .find(|(_, qty)| i32::try_from(*qty).is_err())
        {
            return Err(Error::Validation(format!(
                "quantity for service {service_id} is too large"
            )));
        }
        let mut seen = HashSet::new();
        if let Some((service_id, _)) = new.services.iter().find(|(id, _)| !seen.insert(*id)) {
            return Err(Error::Validation(format!(
                "service {service_id} is listed more than once"
            )));
        }

        let order = self
            .store
            .create(CreateOrder {
                plate,
                customer_phone,
                customer_name: new.customer_name.filter(|n| !n.trim().is_empty()),
                services: new.services,
                notes: new.notes.filter(|n| !n.trim().is_empty()),
                actor,
                at: Utc::now(),
            })
            .await?;

        metrics::work_orders_created().add(1, &[]);
        info!(id = %order.id, code = %order.code, "work order created");
        Ok(order)
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Move a work order to `target`.
    ///
    /// Fails with `InvalidTransition`/`TerminalState` when the pair is not in
    /// the table, `GuardNotSatisfied` when required media is missing, and
    /// `ConcurrentModification` when another change committed first. On
    /// success a STARTED or READY notification is dispatched in the
    /// background; its outcome never affects the result.
    pub async fn request_transition(
        &self,
        id: WorkOrderId,
        target: Status,
        actor: UserId,
    ) -> Result<WorkOrder> {
        let span = start_order_span("transition", &id);
        let start = Instant::now();

        let result = self
            .transition_inner(id, target, actor, &span)
            .instrument(span.clone())
            .await;

        metrics::operation_duration_ms().record(
            start.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("operation", "work_order.transition")],
        );

        if let Err(ref e) = result {
            metrics::transition_rejections().add(
                1,
                &[
                    KeyValue::new("reason", e.kind().as_str()),
                    KeyValue::new("to", target.as_str()),
                ],
            );
            span.in_scope(|| warn!(to = %target, error = %e, "transition rejected"));
        }
        result
    }

    async fn transition_inner(
        &self,
        id: WorkOrderId,
        target: Status,
        actor: UserId,
        span: &tracing::Span,
    ) -> Result<WorkOrder> {
        let order = self.store.get(id).await?;
        record_status(span, order.status);

        let transition = lifecycle::lookup(order.status, target)?;
        let evidence = lifecycle::gather_evidence(&*self.store, id, transition.guard).await?;
        lifecycle::check(&order, target, &evidence)?;

        let (updated, event) = self
            .store
            .apply_transition(StatusChange {
                id,
                from: order.status,
                to: target,
                actor,
                at: Utc::now(),
            })
            .await?;

        record_state_transition(span, order.status, target);
        metrics::status_transitions().add(
            1,
            &[
                KeyValue::new("from", order.status.as_str()),
                KeyValue::new("to", target.as_str()),
            ],
        );
        debug!(seq = event.seq, event_type = %event.event_type, "status event appended");

        if let Some(kind) = NotificationKind::for_status(target) {
            self.notify(&updated, kind);
        }

        Ok(updated)
    }

    fn notify(&self, order: &WorkOrder, kind: NotificationKind) {
        notify::dispatch(
            &self.notifications,
            Arc::clone(&self.store),
            Arc::clone(&self.notifier),
            order.id,
            order.customer_id,
            kind,
        );
    }

    /// Outgoing transitions from the current status, each with its guard outcome.
    pub async fn allowed_transitions(&self, id: WorkOrderId) -> Result<Vec<AllowedTransition>> {
        let order = self.store.get(id).await?;
        let media: MediaSet = self
            .store
            .list_media(id)
            .await?
            .into_iter()
            .map(|m| m.media_type)
            .collect();
        Ok(lifecycle::allowed_targets(&order, &media))
    }

    // -----------------------------------------------------------------------
    // Media
    // -----------------------------------------------------------------------

    /// Store a media record and append its `media-added` event.
    ///
    /// Attaching never changes status; guards only read media existence.
    /// DELIVERED and CANCELLED orders are closed to new evidence; the store
    /// checks this atomically with the insert.
    pub async fn attach_media(
        &self,
        id: WorkOrderId,
        new: NewMedia,
        actor: UserId,
    ) -> Result<Media> {
        let span = start_order_span("attach_media", &id);
        async {
            let media = self.store.attach(id, new, actor, Utc::now()).await?;
            self.record_media_added(id, &media, actor).await?;

            metrics::media_attached().add(1, &[KeyValue::new("type", media.media_type.as_str())]);
            info!(media_id = %media.id, media_type = %media.media_type, "media attached");
            Ok(media)
        }
        .instrument(span)
        .await
    }

    /// Append the `media-added` event for a stored media record.
    ///
    /// The media must belong to `id`, and each media record is reported
    /// once: a second call for the same media fails with `Validation`.
    pub async fn record_media_added(
        &self,
        id: WorkOrderId,
        media: &Media,
        actor: UserId,
    ) -> Result<WorkOrderEvent> {
        if media.work_order_id != id {
            return Err(Error::Validation(format!(
                "media {} belongs to work order {}, not {id}",
                media.id, media.work_order_id
            )));
        }
        self.store.append(NewEvent::media_added(media, actor)).await
    }

    // -----------------------------------------------------------------------
    // Notes
    // -----------------------------------------------------------------------

    /// Replace the free-text notes. Blank text clears them.
    pub async fn update_notes(
        &self,
        id: WorkOrderId,
        notes: &str,
        actor: UserId,
    ) -> Result<WorkOrder> {
        let span = start_order_span("update_notes", &id);
        let notes = Some(notes.trim().to_string()).filter(|n| !n.is_empty());

        let (order, _) = self
            .store
            .set_notes(id, notes, actor, Utc::now())
            .instrument(span.clone())
            .await?;
        record_status(&span, order.status);
        Ok(order)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub async fn get(&self, id: WorkOrderId) -> Result<WorkOrder> {
        self.store.get(id).await
    }

    /// The order with customer, vehicle, services, media and timeline.
    pub async fn detail(&self, id: WorkOrderId) -> Result<WorkOrderDetail> {
        let order = self.store.get(id).await?;
        let (customer, vehicle, services, media, events) = tokio::try_join!(
            self.store.customer(order.customer_id),
            self.store.vehicle(order.vehicle_id),
            self.store.services_for(id),
            self.store.list_media(id),
            self.store.list_events(id),
        )?;
        Ok(WorkOrderDetail {
            order,
            customer,
            vehicle,
            services,
            media,
            events,
        })
    }

    pub async fn list(&self, filter: &WorkOrderFilter) -> Result<Vec<WorkOrder>> {
        self.store.list(filter).await
    }

    pub async fn events(&self, id: WorkOrderId) -> Result<Vec<WorkOrderEvent>> {
        self.store.get(id).await?;
        self.store.list_events(id).await
    }

    pub async fn media(&self, id: WorkOrderId) -> Result<Vec<Media>> {
        self.store.get(id).await?;
        self.store.list_media(id).await
    }
}
