//! Persistence seams for work orders, media and events.
//!
//! Three capabilities, one per component: [`WorkOrderStore`] (owned by the
//! lifecycle engine), [`MediaStore`] and [`EventLog`]. A [`Store`] is all
//! three on one backend, which lets status changes and their events commit
//! together. Backends: [`MemoryStore`] here and `crate::db::Db` for Postgres.

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::lifecycle::MediaExistenceChecker;
use crate::model::*;

/// Everything needed to insert a validated work order.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    /// Normalized plate.
    pub plate: String,
    /// Digits only.
    pub customer_phone: String,
    pub customer_name: Option<String>,
    pub services: Vec<(ServiceId, u32)>,
    pub notes: Option<String>,
    pub actor: UserId,
    pub at: DateTime<Utc>,
}

/// A compare-and-swap on status. Applied only if the order is still `from`.
#[derive(Debug, Clone, Copy)]
pub struct StatusChange {
    pub id: WorkOrderId,
    pub from: Status,
    pub to: Status,
    pub actor: UserId,
    pub at: DateTime<Utc>,
}

/// Work-order records. Mutations that change lifecycle data append their
/// event within the same atomic unit.
#[async_trait]
pub trait WorkOrderStore: Send + Sync {
    /// Insert the order in `CREATED` with its service lines and a `created`
    /// event. Customer (by phone) and vehicle (by plate) are found or created.
    async fn create(&self, new: CreateOrder) -> Result<WorkOrder>;

    async fn get(&self, id: WorkOrderId) -> Result<WorkOrder>;

    /// Newest first.
    async fn list(&self, filter: &WorkOrderFilter) -> Result<Vec<WorkOrder>>;

    async fn services_for(&self, id: WorkOrderId) -> Result<Vec<WorkOrderService>>;

    async fn customer(&self, id: CustomerId) -> Result<Customer>;

    async fn vehicle(&self, id: VehicleId) -> Result<Vehicle>;

    /// Set status, milestone, `updated_at` (and `cancelled_by`) and append
    /// the status event, all or nothing. Fails with `ConcurrentModification`
    /// if the stored status is no longer `change.from`.
    async fn apply_transition(&self, change: StatusChange) -> Result<(WorkOrder, WorkOrderEvent)>;

    /// Replace the notes and append `note-updated`. Fails with `Immutable`
    /// on DELIVERED/CANCELLED orders.
    async fn set_notes(
        &self,
        id: WorkOrderId,
        notes: Option<String>,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Result<(WorkOrder, WorkOrderEvent)>;
}

/// Immutable media records.
#[async_trait]
pub trait MediaStore: MediaExistenceChecker {
    /// Fails with `Immutable` on DELIVERED or CANCELLED orders, checked
    /// atomically with the insert.
    async fn attach(
        &self,
        work_order_id: WorkOrderId,
        new: NewMedia,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Result<Media>;

    /// Snapshot ordered by creation time, oldest first.
    async fn list_media(&self, work_order_id: WorkOrderId) -> Result<Vec<Media>>;
}

/// Append-only event history.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Fails with `NotFound` for an unknown order, or for a `media_id`
    /// that is not a media record of that order. A media record gets at
    /// most one event; a second one fails with `Validation`.
    async fn append(&self, event: NewEvent) -> Result<WorkOrderEvent>;

    /// Ordered by creation time, oldest first.
    async fn list_events(&self, work_order_id: WorkOrderId) -> Result<Vec<WorkOrderEvent>>;
}

/// A complete backend.
pub trait Store: WorkOrderStore + MediaStore + EventLog {}

impl<T> Store for T where T: WorkOrderStore + MediaStore + EventLog {}

/// Milestone clamp: never earlier than the last recorded change.
pub(crate) fn not_before(at: DateTime<Utc>, floor: DateTime<Utc>) -> DateTime<Utc> {
    at.max(floor)
}
