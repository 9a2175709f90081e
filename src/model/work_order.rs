//! Work orders, their status and the records they reference.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::WorkOrderEvent;
use super::id::{CustomerId, ServiceId, UserId, VehicleId, WorkOrderId};
use super::media::Media;
use crate::error::Error;

// ---------------------------------------------------------------------------
// Work Order
// ---------------------------------------------------------------------------

/// A trackable unit of service work on one vehicle for one customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrder {
    pub id: WorkOrderId,

    /// Human-readable code shown to staff and customers (e.g. `OS-000042`).
    pub code: String,

    pub vehicle_id: VehicleId,
    pub customer_id: CustomerId,

    /// Current lifecycle status. Only the engine changes it.
    pub status: Status,

    pub notes: Option<String>,

    pub created_by: UserId,
    pub cancelled_by: Option<UserId>,

    /// Milestones. Each is set exactly once, when the order enters the
    /// corresponding status, and never revised.
    pub started_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkOrder {
    /// When the order entered `status`, if it ever did.
    pub fn milestone(&self, status: Status) -> Option<DateTime<Utc>> {
        match status {
            Status::Created => Some(self.created_at),
            Status::InProgress => self.started_at,
            Status::Ready => self.ready_at,
            Status::Delivered => self.delivered_at,
            Status::Cancelled => self.cancelled_at,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a work order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Registered, vehicle checked in. Initial status.
    Created,
    /// Job under way.
    InProgress,
    /// Job finished, waiting for pickup.
    Ready,
    /// Handed back to the customer. Terminal.
    Delivered,
    /// Abandoned before completion. Terminal.
    Cancelled,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Created,
        Status::InProgress,
        Status::Ready,
        Status::Delivered,
        Status::Cancelled,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Delivered | Status::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Created => "CREATED",
            Status::InProgress => "IN_PROGRESS",
            Status::Ready => "READY",
            Status::Delivered => "DELIVERED",
            Status::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| Error::Validation(format!("unknown status: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Referenced records
// ---------------------------------------------------------------------------

/// Service line item. Fixed input to the job once the order exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOrderService {
    pub work_order_id: WorkOrderId,
    pub service_id: ServiceId,
    /// Always at least 1.
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    /// Digits only.
    pub phone: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub customer_id: CustomerId,
    /// Normalized plate (uppercase, no separators).
    pub plate: String,
    pub created_at: DateTime<Utc>,
}

/// Read projection of a work order with everything hanging off it.
#[derive(Debug, Clone, Serialize)]
pub struct WorkOrderDetail {
    pub order: WorkOrder,
    pub customer: Customer,
    pub vehicle: Vehicle,
    pub services: Vec<WorkOrderService>,
    pub media: Vec<Media>,
    pub events: Vec<WorkOrderEvent>,
}

/// Dashboard filter. `search` matches the plate or the order code.
#[derive(Debug, Clone, Default)]
pub struct WorkOrderFilter {
    pub status: Option<Status>,
    pub search: Option<String>,
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for creating work orders. Validated by the engine on submit.
#[derive(Debug, Clone)]
pub struct NewWorkOrder {
    pub(crate) plate: String,
    pub(crate) customer_phone: String,
    pub(crate) customer_name: Option<String>,
    pub(crate) services: Vec<(ServiceId, u32)>,
    pub(crate) notes: Option<String>,
}

impl NewWorkOrder {
    pub fn new(plate: impl Into<String>, customer_phone: impl Into<String>) -> Self {
        Self {
            plate: plate.into(),
            customer_phone: customer_phone.into(),
            customer_name: None,
            services: Vec::new(),
            notes: None,
        }
    }

    pub fn customer_name(mut self, name: impl Into<String>) -> Self {
        self.customer_name = Some(name.into());
        self
    }

    pub fn service(mut self, service_id: ServiceId, quantity: u32) -> Self {
        self.services.push((service_id, quantity));
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_wire_and_cli_spellings() {
        assert_eq!("IN_PROGRESS".parse::<Status>().unwrap(), Status::InProgress);
        assert_eq!("in-progress".parse::<Status>().unwrap(), Status::InProgress);
        assert_eq!(" ready ".parse::<Status>().unwrap(), Status::Ready);
        assert!("shipped".parse::<Status>().is_err());
    }

    #[test]
    fn status_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&Status::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
    }

    #[test]
    fn only_delivered_and_cancelled_are_terminal() {
        let terminal: Vec<_> = Status::ALL.into_iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal, vec![Status::Delivered, Status::Cancelled]);
    }
}
