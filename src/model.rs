//! Core data model.
//!
//! A work order is one job on one vehicle for one customer. It carries a
//! lifecycle status, milestone timestamps, typed media evidence and an
//! append-only event trail.

pub mod event;
pub mod id;
pub mod media;
pub mod work_order;

pub use event::{EventType, NewEvent, WorkOrderEvent};
pub use id::{CustomerId, EventId, MediaId, ServiceId, UserId, VehicleId, WorkOrderId};
pub use media::{BlobRef, Media, MediaType, NewMedia};
pub use work_order::{
    Customer, NewWorkOrder, Status, Vehicle, WorkOrder, WorkOrderDetail, WorkOrderFilter,
    WorkOrderService,
};
