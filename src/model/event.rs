//! Work-order events: the append-only audit trail.
//!
//! Every mutating engine operation produces exactly one event. Events are
//! never updated or deleted; `seq` orders them within the log even when
//! two share a timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{EventId, MediaId, UserId, WorkOrderId};
use super::media::Media;
use super::work_order::Status;

/// A recorded lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOrderEvent {
    pub id: EventId,
    /// Log-wide monotonic sequence number.
    pub seq: u64,
    pub work_order_id: WorkOrderId,
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Only set for `StatusChanged` and `Cancelled`.
    pub from_status: Option<Status>,
    pub to_status: Option<Status>,
    pub message: Option<String>,
    /// The media record a `MediaAdded` event reports. At most one event per media.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_id: Option<MediaId>,
    pub actor: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Created,
    StatusChanged,
    MediaAdded,
    NoteUpdated,
    Cancelled,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Created => "CREATED",
            EventType::StatusChanged => "STATUS_CHANGED",
            EventType::MediaAdded => "MEDIA_ADDED",
            EventType::NoteUpdated => "NOTE_UPDATED",
            EventType::Cancelled => "CANCELLED",
        }
    }

    pub(crate) fn parse(s: &str) -> Option<Self> {
        match s {
            "CREATED" => Some(EventType::Created),
            "STATUS_CHANGED" => Some(EventType::StatusChanged),
            "MEDIA_ADDED" => Some(EventType::MediaAdded),
            "NOTE_UPDATED" => Some(EventType::NoteUpdated),
            "CANCELLED" => Some(EventType::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event not yet appended. Constructors keep `from_status`/`to_status`
/// populated only for status events.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub work_order_id: WorkOrderId,
    pub event_type: EventType,
    pub from_status: Option<Status>,
    pub to_status: Option<Status>,
    pub message: Option<String>,
    pub media_id: Option<MediaId>,
    pub actor: UserId,
    pub at: DateTime<Utc>,
}

impl NewEvent {
    pub fn created(work_order_id: WorkOrderId, actor: UserId, at: DateTime<Utc>) -> Self {
        Self::plain(work_order_id, EventType::Created, None, actor, at)
    }

    /// `Cancelled` when `to` is CANCELLED, `StatusChanged` otherwise.
    pub fn transition(
        work_order_id: WorkOrderId,
        from: Status,
        to: Status,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Self {
        let event_type = if to == Status::Cancelled {
            EventType::Cancelled
        } else {
            EventType::StatusChanged
        };
        Self {
            work_order_id,
            event_type,
            from_status: Some(from),
            to_status: Some(to),
            message: None,
            media_id: None,
            actor,
            at,
        }
    }

    /// `"TYPE added"`, with the caption appended when there is one. Timed
    /// at the media's creation.
    pub fn media_added(media: &Media, actor: UserId) -> Self {
        let message = match &media.caption {
            Some(caption) => format!("{} added: {caption}", media.media_type),
            None => format!("{} added", media.media_type),
        };
        Self {
            media_id: Some(media.id),
            ..Self::plain(
                media.work_order_id,
                EventType::MediaAdded,
                Some(message),
                actor,
                media.created_at,
            )
        }
    }

    pub fn note_updated(
        work_order_id: WorkOrderId,
        notes: Option<String>,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Self {
        Self::plain(work_order_id, EventType::NoteUpdated, notes, actor, at)
    }

    fn plain(
        work_order_id: WorkOrderId,
        event_type: EventType,
        message: Option<String>,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            work_order_id,
            event_type,
            from_status: None,
            to_status: None,
            message,
            media_id: None,
            actor,
            at,
        }
    }

    pub(crate) fn into_event(self, id: EventId, seq: u64) -> WorkOrderEvent {
        WorkOrderEvent {
            id,
            seq,
            work_order_id: self.work_order_id,
            event_type: self.event_type,
            from_status: self.from_status,
            to_status: self.to_status,
            message: self.message,
            media_id: self.media_id,
            actor: self.actor,
            created_at: self.at,
        }
    }
}
