//! Work-order operations on Postgres: creation, reads, status CAS, notes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use super::event::insert_event_on;
use super::{Db, parse_column};
use crate::error::{Error, Result};
use crate::model::*;
use crate::plate::normalize_plate;
use crate::store::{CreateOrder, StatusChange, WorkOrderStore};

const ORDER_COLUMNS: &str = "id, code, vehicle_id, customer_id, status, notes, created_by, cancelled_by, \
     started_at, ready_at, delivered_at, cancelled_at, created_at, updated_at";

/// Column holding the milestone for entering `status`.
fn milestone_column(status: Status) -> Option<&'static str> {
    match status {
        Status::Created => None,
        Status::InProgress => Some("started_at"),
        Status::Ready => Some("ready_at"),
        Status::Delivered => Some("delivered_at"),
        Status::Cancelled => Some("cancelled_at"),
    }
}

async fn fetch_status_on(conn: &mut PgConnection, id: WorkOrderId) -> Result<Status> {
    let row: Option<(String,)> = sqlx::query_as("SELECT status FROM work_orders WHERE id = $1")
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?;
    let (status,) = row.ok_or_else(|| Error::NotFound(format!("work order {id}")))?;
    parse_column("status", &status)
}

#[async_trait]
impl WorkOrderStore for Db {
    async fn create(&self, new: CreateOrder) -> Result<WorkOrder> {
        let mut tx = self.pool().begin().await?;

        let (customer_id,): (Uuid,) = sqlx::query_as(
            "INSERT INTO customers (id, phone, name, created_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (phone) DO UPDATE SET name = COALESCE(customers.name, EXCLUDED.name)
             RETURNING id",
        )
        .bind(CustomerId::new().0)
        .bind(&new.customer_phone)
        .bind(&new.customer_name)
        .bind(new.at)
        .fetch_one(&mut *tx)
        .await?;

        // No-op update so RETURNING yields the existing row on conflict.
        let (vehicle_id,): (Uuid,) = sqlx::query_as(
            "INSERT INTO vehicles (id, customer_id, plate, created_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (plate) DO UPDATE SET plate = EXCLUDED.plate
             RETURNING id",
        )
        .bind(VehicleId::new().0)
        .bind(customer_id)
        .bind(&new.plate)
        .bind(new.at)
        .fetch_one(&mut *tx)
        .await?;

        let id = WorkOrderId::new();
        let row: WorkOrderRow = sqlx::query_as(&format!(
            "INSERT INTO work_orders (id, code, vehicle_id, customer_id, status, notes, created_by, created_at, updated_at)
             VALUES ($1, 'OS-' || lpad(nextval('work_order_code_seq')::text, 6, '0'), $2, $3, 'CREATED', $4, $5, $6, $6)
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id.0)
        .bind(vehicle_id)
        .bind(customer_id)
        .bind(&new.notes)
        .bind(new.actor.0)
        .bind(new.at)
        .fetch_one(&mut *tx)
        .await?;

        for (service_id, quantity) in &new.services {
            let quantity = i32::try_from(*quantity).map_err(|_| {
                Error::Validation(format!("quantity for service {service_id} is too large"))
            })?;
            sqlx::query(
                "INSERT INTO work_order_services (work_order_id, service_id, quantity)
                 VALUES ($1, $2, $3)",
            )
            .bind(id.0)
            .bind(service_id.0)
            .bind(quantity)
            .execute(&mut *tx)
            .await?;
        }

        insert_event_on(&mut tx, NewEvent::created(id, new.actor, new.at)).await?;

        tx.commit().await?;
        row.try_into_work_order()
    }

    async fn get(&self, id: WorkOrderId) -> Result<WorkOrder> {
        let row: Option<WorkOrderRow> =
            sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM work_orders WHERE id = $1"))
                .bind(id.0)
                .fetch_optional(self.pool())
                .await?;

        row.ok_or_else(|| Error::NotFound(format!("work order {id}")))?
            .try_into_work_order()
    }

    async fn list(&self, filter: &WorkOrderFilter) -> Result<Vec<WorkOrder>> {
        let search = filter
            .search
            .as_deref()
            .map(normalize_plate)
            .filter(|s| !s.is_empty());
        let limit = filter.limit.map(|n| n as i64).unwrap_or(i64::MAX);

        let rows: Vec<WorkOrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM work_orders wo
             JOIN vehicles v ON v.id = wo.vehicle_id
             WHERE ($1::text IS NULL OR wo.status = $1)
             AND ($2::text IS NULL OR v.plate LIKE '%' || $2 || '%' OR replace(wo.code, '-', '') LIKE '%' || $2 || '%')
             ORDER BY wo.created_at DESC, wo.code DESC
             LIMIT $3",
            ORDER_COLUMNS
                .split(", ")
                .map(|c| format!("wo.{c}"))
                .collect::<Vec<_>>()
                .join(", ")
        ))
        .bind(filter.status.map(Status::as_str))
        .bind(search)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(WorkOrderRow::try_into_work_order)
            .collect()
    }

    async fn services_for(&self, id: WorkOrderId) -> Result<Vec<WorkOrderService>> {
        let rows: Vec<(Uuid, i32)> = sqlx::query_as(
            "SELECT service_id, quantity FROM work_order_services
             WHERE work_order_id = $1 ORDER BY service_id",
        )
        .bind(id.0)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(service_id, quantity)| WorkOrderService {
                work_order_id: id,
                service_id: ServiceId(service_id),
                quantity: quantity.max(1) as u32,
            })
            .collect())
    }

    async fn customer(&self, id: CustomerId) -> Result<Customer> {
        let row: Option<(Uuid, String, Option<String>, DateTime<Utc>)> =
            sqlx::query_as("SELECT id, phone, name, created_at FROM customers WHERE id = $1")
                .bind(id.0)
                .fetch_optional(self.pool())
                .await?;

        let (id, phone, name, created_at) =
            row.ok_or_else(|| Error::NotFound(format!("customer {id}")))?;
        Ok(Customer {
            id: CustomerId(id),
            phone,
            name,
            created_at,
        })
    }

    async fn vehicle(&self, id: VehicleId) -> Result<Vehicle> {
        let row: Option<(Uuid, Uuid, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT id, customer_id, plate, created_at FROM vehicles WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(self.pool())
        .await?;

        let (id, customer_id, plate, created_at) =
            row.ok_or_else(|| Error::NotFound(format!("vehicle {id}")))?;
        Ok(Vehicle {
            id: VehicleId(id),
            customer_id: CustomerId(customer_id),
            plate,
            created_at,
        })
    }

    /// Optimistic: the UPDATE only matches while the status is still `from`.
    async fn apply_transition(&self, change: StatusChange) -> Result<(WorkOrder, WorkOrderEvent)> {
        let column = milestone_column(change.to).ok_or(Error::InvalidTransition {
            from: change.from,
            to: change.to,
        })?;

        let mut tx = self.pool().begin().await?;

        // SET expressions read the pre-update row, so both clamps see the
        // previous updated_at.
        let row: Option<WorkOrderRow> = sqlx::query_as(&format!(
            "UPDATE work_orders
             SET status = $1,
                 {column} = GREATEST($2, updated_at),
                 updated_at = GREATEST($2, updated_at),
                 cancelled_by = CASE WHEN $1 = 'CANCELLED' THEN $3 ELSE cancelled_by END
             WHERE id = $4 AND status = $5
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(change.to.as_str())
        .bind(change.at)
        .bind(change.actor.0)
        .bind(change.id.0)
        .bind(change.from.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            // Distinguish a missing order from a lost race.
            fetch_status_on(&mut tx, change.id).await?;
            return Err(Error::ConcurrentModification {
                id: change.id,
                expected: change.from,
            });
        };
        let order = row.try_into_work_order()?;

        let event = insert_event_on(
            &mut tx,
            NewEvent::transition(change.id, change.from, change.to, change.actor, order.updated_at),
        )
        .await?;

        tx.commit().await?;
        Ok((order, event))
    }

    async fn set_notes(
        &self,
        id: WorkOrderId,
        notes: Option<String>,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Result<(WorkOrder, WorkOrderEvent)> {
        let mut tx = self.pool().begin().await?;

        let row: Option<WorkOrderRow> = sqlx::query_as(&format!(
            "UPDATE work_orders
             SET notes = $1, updated_at = GREATEST($2, updated_at)
             WHERE id = $3 AND status NOT IN ('DELIVERED', 'CANCELLED')
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(&notes)
        .bind(at)
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            let status = fetch_status_on(&mut tx, id).await?;
            return Err(Error::Immutable { status });
        };
        let order = row.try_into_work_order()?;

        let event = insert_event_on(
            &mut tx,
            NewEvent::note_updated(id, notes, actor, order.updated_at),
        )
        .await?;

        tx.commit().await?;
        Ok((order, event))
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct WorkOrderRow {
    id: Uuid,
    code: String,
    vehicle_id: Uuid,
    customer_id: Uuid,
    status: String,
    notes: Option<String>,
    created_by: Uuid,
    cancelled_by: Option<Uuid>,
    started_at: Option<DateTime<Utc>>,
    ready_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WorkOrderRow {
    fn try_into_work_order(self) -> Result<WorkOrder> {
        Ok(WorkOrder {
            id: WorkOrderId(self.id),
            code: self.code,
            vehicle_id: VehicleId(self.vehicle_id),
            customer_id: CustomerId(self.customer_id),
            status: parse_column("status", &self.status)?,
            notes: self.notes,
            created_by: UserId(self.created_by),
            cancelled_by: self.cancelled_by.map(UserId),
            started_at: self.started_at,
            ready_at: self.ready_at,
            delivered_at: self.delivered_at,
            cancelled_at: self.cancelled_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
