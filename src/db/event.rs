//! Event log on Postgres. Insert and select only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use super::{Db, parse_column};
use crate::error::{Error, Result};
use crate::model::*;
use crate::store::EventLog;

/// Append an event on the given connection (plain or transactional).
///
/// The timestamp is clamped to the order's latest event so per-order
/// timelines sort the same by time and by sequence.
pub(crate) async fn insert_event_on(
    conn: &mut PgConnection,
    new: NewEvent,
) -> Result<WorkOrderEvent> {
    let id = EventId::new();
    let result: std::result::Result<(i64, DateTime<Utc>), sqlx::Error> = sqlx::query_as(
        "INSERT INTO work_order_events
            (id, work_order_id, event_type, from_status, to_status, message, media_id, actor_user_id, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8,
            GREATEST($9, COALESCE(
                (SELECT MAX(created_at) FROM work_order_events WHERE work_order_id = $2), $9)))
         RETURNING seq, created_at",
    )
    .bind(id.0)
    .bind(new.work_order_id.0)
    .bind(new.event_type.as_str())
    .bind(new.from_status.map(Status::as_str))
    .bind(new.to_status.map(Status::as_str))
    .bind(&new.message)
    .bind(new.media_id.map(|m| m.0))
    .bind(new.actor.0)
    .bind(new.at)
    .fetch_one(&mut *conn)
    .await;

    let (seq, created_at) = match result {
        Ok(row) => row,
        Err(sqlx::Error::Database(e)) if e.is_foreign_key_violation() => {
            return Err(match (e.constraint(), new.media_id) {
                (Some(MEDIA_FK), Some(media_id)) => Error::NotFound(format!(
                    "media {media_id} on work order {}",
                    new.work_order_id
                )),
                _ => Error::NotFound(format!("work order {}", new.work_order_id)),
            });
        }
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() && new.media_id.is_some() => {
            return Err(already_recorded(new.media_id));
        }
        Err(e) => return Err(e.into()),
    };

    let mut new = new;
    new.at = created_at;
    Ok(new.into_event(id, seq as u64))
}

const MEDIA_FK: &str = "work_order_events_media_fkey";

fn already_recorded(media_id: Option<MediaId>) -> Error {
    let media_id = media_id.map(|m| m.to_string()).unwrap_or_default();
    Error::Validation(format!("media {media_id} already has a MEDIA_ADDED event"))
}

#[async_trait]
impl EventLog for Db {
    async fn append(&self, event: NewEvent) -> Result<WorkOrderEvent> {
        let mut conn = self.pool().acquire().await?;
        insert_event_on(&mut conn, event).await
    }

    async fn list_events(&self, work_order_id: WorkOrderId) -> Result<Vec<WorkOrderEvent>> {
        let rows: Vec<EventRow> = sqlx::query_as(
            "SELECT seq, id, work_order_id, event_type, from_status, to_status, message, media_id, actor_user_id, created_at
             FROM work_order_events
             WHERE work_order_id = $1
             ORDER BY created_at ASC, seq ASC",
        )
        .bind(work_order_id.0)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(EventRow::try_into_event).collect()
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct EventRow {
    seq: i64,
    id: Uuid,
    work_order_id: Uuid,
    event_type: String,
    from_status: Option<String>,
    to_status: Option<String>,
    message: Option<String>,
    media_id: Option<Uuid>,
    actor_user_id: Uuid,
    created_at: DateTime<Utc>,
}

impl EventRow {
    fn try_into_event(self) -> Result<WorkOrderEvent> {
        let event_type = EventType::parse(&self.event_type)
            .ok_or_else(|| Error::Other(format!("bad event_type in database: {}", self.event_type)))?;

        Ok(WorkOrderEvent {
            id: EventId(self.id),
            seq: self.seq as u64,
            work_order_id: WorkOrderId(self.work_order_id),
            event_type,
            from_status: self
                .from_status
                .as_deref()
                .map(|s| parse_column("from_status", s))
                .transpose()?,
            to_status: self
                .to_status
                .as_deref()
                .map(|s| parse_column("to_status", s))
                .transpose()?,
            message: self.message,
            media_id: self.media_id.map(MediaId),
            actor: UserId(self.actor_user_id),
            created_at: self.created_at,
        })
    }
}
