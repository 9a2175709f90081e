//! In-process store.
//!
//! One `RwLock` guards all state: reads share it, every write holds it
//! exclusively, so a status change and its event are observed together or
//! not at all. Events live in an insertion-ordered arena indexed by order.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{CreateOrder, EventLog, MediaStore, StatusChange, WorkOrderStore, not_before};
use crate::error::{Error, Result};
use crate::lifecycle::MediaExistenceChecker;
use crate::model::*;
use crate::plate::normalize_plate;

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    orders: HashMap<WorkOrderId, WorkOrder>,
    code_seq: u64,
    services: HashMap<WorkOrderId, Vec<WorkOrderService>>,
    customers: HashMap<CustomerId, Customer>,
    vehicles: HashMap<VehicleId, Vehicle>,
    media: Vec<Media>,
    events: Vec<WorkOrderEvent>,
    events_by_order: HashMap<WorkOrderId, Vec<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn order(&self, id: WorkOrderId) -> Result<&WorkOrder> {
        self.orders
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("work order {id}")))
    }

    fn order_mut(&mut self, id: WorkOrderId) -> Result<&mut WorkOrder> {
        self.orders
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("work order {id}")))
    }

    fn find_or_create_customer(
        &mut self,
        phone: &str,
        name: Option<String>,
        at: DateTime<Utc>,
    ) -> CustomerId {
        if let Some(existing) = self.customers.values_mut().find(|c| c.phone == phone) {
            if existing.name.is_none() {
                existing.name = name;
            }
            return existing.id;
        }
        let customer = Customer {
            id: CustomerId::new(),
            phone: phone.to_string(),
            name,
            created_at: at,
        };
        let id = customer.id;
        self.customers.insert(id, customer);
        id
    }

    fn find_or_create_vehicle(
        &mut self,
        plate: &str,
        customer_id: CustomerId,
        at: DateTime<Utc>,
    ) -> VehicleId {
        if let Some(existing) = self.vehicles.values().find(|v| v.plate == plate) {
            return existing.id;
        }
        let vehicle = Vehicle {
            id: VehicleId::new(),
            customer_id,
            plate: plate.to_string(),
            created_at: at,
        };
        let id = vehicle.id;
        self.vehicles.insert(id, vehicle);
        id
    }

    /// Append to the arena. Event time never precedes the order's previous event.
    fn push_event(&mut self, new: NewEvent) -> WorkOrderEvent {
        let floor = self
            .events_by_order
            .get(&new.work_order_id)
            .and_then(|idx| idx.last())
            .map(|&i| self.events[i].created_at);

        let mut new = new;
        if let Some(floor) = floor {
            new.at = not_before(new.at, floor);
        }

        let seq = self.events.len() as u64 + 1;
        let event = new.into_event(EventId::new(), seq);
        self.events_by_order
            .entry(event.work_order_id)
            .or_default()
            .push(self.events.len());
        self.events.push(event.clone());
        event
    }
}

#[async_trait]
impl WorkOrderStore for MemoryStore {
    async fn create(&self, new: CreateOrder) -> Result<WorkOrder> {
        let mut inner = self.inner.write().await;

        let customer_id = inner.find_or_create_customer(&new.customer_phone, new.customer_name, new.at);
        let vehicle_id = inner.find_or_create_vehicle(&new.plate, customer_id, new.at);

        inner.code_seq += 1;
        let order = WorkOrder {
            id: WorkOrderId::new(),
            code: format!("OS-{:06}", inner.code_seq),
            vehicle_id,
            customer_id,
            status: Status::Created,
            notes: new.notes,
            created_by: new.actor,
            cancelled_by: None,
            started_at: None,
            ready_at: None,
            delivered_at: None,
            cancelled_at: None,
            created_at: new.at,
            updated_at: new.at,
        };

        let lines = new
            .services
            .iter()
            .map(|&(service_id, quantity)| WorkOrderService {
                work_order_id: order.id,
                service_id,
                quantity,
            })
            .collect();
        inner.services.insert(order.id, lines);
        inner.orders.insert(order.id, order.clone());
        inner.push_event(NewEvent::created(order.id, new.actor, new.at));

        Ok(order)
    }

    async fn get(&self, id: WorkOrderId) -> Result<WorkOrder> {
        self.inner.read().await.order(id).cloned()
    }

    async fn list(&self, filter: &WorkOrderFilter) -> Result<Vec<WorkOrder>> {
        let inner = self.inner.read().await;
        let needle = filter.search.as_deref().map(normalize_plate);

        let mut orders: Vec<WorkOrder> = inner
            .orders
            .values()
            .filter(|o| filter.status.is_none_or(|s| o.status == s))
            .filter(|o| match &needle {
                None => true,
                Some(needle) => {
                    normalize_plate(&o.code).contains(needle.as_str())
                        || inner
                            .vehicles
                            .get(&o.vehicle_id)
                            .is_some_and(|v| v.plate.contains(needle.as_str()))
                }
            })
            .cloned()
            .collect();

        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.code.cmp(&a.code)));
        if let Some(limit) = filter.limit {
            orders.truncate(limit);
        }
        Ok(orders)
    }

    async fn services_for(&self, id: WorkOrderId) -> Result<Vec<WorkOrderService>> {
        let inner = self.inner.read().await;
        inner.order(id)?;
        Ok(inner.services.get(&id).cloned().unwrap_or_default())
    }

    async fn customer(&self, id: CustomerId) -> Result<Customer> {
        self.inner
            .read()
            .await
            .customers
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("customer {id}")))
    }

    async fn vehicle(&self, id: VehicleId) -> Result<Vehicle> {
        self.inner
            .read()
            .await
            .vehicles
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("vehicle {id}")))
    }

    async fn apply_transition(&self, change: StatusChange) -> Result<(WorkOrder, WorkOrderEvent)> {
        let mut inner = self.inner.write().await;

        let order = inner.order_mut(change.id)?;
        if order.status != change.from {
            return Err(Error::ConcurrentModification {
                id: change.id,
                expected: change.from,
            });
        }

        let at = not_before(change.at, order.updated_at);
        order.status = change.to;
        order.updated_at = at;
        match change.to {
            Status::InProgress => order.started_at = Some(at),
            Status::Ready => order.ready_at = Some(at),
            Status::Delivered => order.delivered_at = Some(at),
            Status::Cancelled => {
                order.cancelled_at = Some(at);
                order.cancelled_by = Some(change.actor);
            }
            Status::Created => {}
        }
        let order = order.clone();

        let event = inner.push_event(NewEvent::transition(
            change.id,
            change.from,
            change.to,
            change.actor,
            at,
        ));
        Ok((order, event))
    }

    async fn set_notes(
        &self,
        id: WorkOrderId,
        notes: Option<String>,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Result<(WorkOrder, WorkOrderEvent)> {
        let mut inner = self.inner.write().await;

        let order = inner.order_mut(id)?;
        if order.is_terminal() {
            return Err(Error::Immutable {
                status: order.status,
            });
        }
        let at = not_before(at, order.updated_at);
        order.notes = notes.clone();
        order.updated_at = at;
        let order = order.clone();

        let event = inner.push_event(NewEvent::note_updated(id, notes, actor, at));
        Ok((order, event))
    }
}

#[async_trait]
impl MediaExistenceChecker for MemoryStore {
    async fn has_type(&self, work_order_id: WorkOrderId, media_type: MediaType) -> Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner
            .media
            .iter()
            .any(|m| m.work_order_id == work_order_id && m.media_type == media_type))
    }
}

#[async_trait]
impl MediaStore for MemoryStore {
    async fn attach(
        &self,
        work_order_id: WorkOrderId,
        new: NewMedia,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Result<Media> {
        let mut inner = self.inner.write().await;
        let order = inner.order(work_order_id)?;
        if order.is_terminal() {
            return Err(Error::Immutable {
                status: order.status,
            });
        }

        let media = Media {
            id: MediaId::new(),
            work_order_id,
            media_type: new.media_type,
            blob: new.blob,
            mime_type: new.mime_type,
            size_bytes: new.size_bytes,
            caption: new.caption,
            created_by: actor,
            created_at: at,
        };
        inner.media.push(media.clone());
        Ok(media)
    }

    async fn list_media(&self, work_order_id: WorkOrderId) -> Result<Vec<Media>> {
        let inner = self.inner.read().await;
        let mut media: Vec<Media> = inner
            .media
            .iter()
            .filter(|m| m.work_order_id == work_order_id)
            .cloned()
            .collect();
        // Stable: insertion order breaks timestamp ties.
        media.sort_by_key(|m| m.created_at);
        Ok(media)
    }
}

#[async_trait]
impl EventLog for MemoryStore {
    async fn append(&self, event: NewEvent) -> Result<WorkOrderEvent> {
        let mut inner = self.inner.write().await;
        inner.order(event.work_order_id)?;

        if let Some(media_id) = event.media_id {
            let owned = inner
                .media
                .iter()
                .any(|m| m.id == media_id && m.work_order_id == event.work_order_id);
            if !owned {
                return Err(Error::NotFound(format!(
                    "media {media_id} on work order {}",
                    event.work_order_id
                )));
            }
            if inner.events.iter().any(|e| e.media_id == Some(media_id)) {
                return Err(Error::Validation(format!(
                    "media {media_id} already has a MEDIA_ADDED event"
                )));
            }
        }
        Ok(inner.push_event(event))
    }

    async fn list_events(&self, work_order_id: WorkOrderId) -> Result<Vec<WorkOrderEvent>> {
        let inner = self.inner.read().await;
        Ok(inner
            .events_by_order
            .get(&work_order_id)
            .map(|idx| idx.iter().map(|&i| inner.events[i].clone()).collect())
            .unwrap_or_default())
    }
}
