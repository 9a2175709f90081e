//! Media evidence attached to work orders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{MediaId, UserId, WorkOrderId};
use crate::error::Error;

/// What a media item is evidence of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaType {
    /// Walk-around video of the exterior at check-in.
    EntryVideoExternal,
    /// Video of the interior at check-in.
    EntryVideoInternal,
    /// Close-up photo of pre-existing damage or detail.
    EntryDetailPhoto,
    /// Video recorded when the vehicle is handed back.
    DeliveryVideo,
}

impl MediaType {
    pub const ALL: [MediaType; 4] = [
        MediaType::EntryVideoExternal,
        MediaType::EntryVideoInternal,
        MediaType::EntryDetailPhoto,
        MediaType::DeliveryVideo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::EntryVideoExternal => "ENTRY_VIDEO_EXTERNAL",
            MediaType::EntryVideoInternal => "ENTRY_VIDEO_INTERNAL",
            MediaType::EntryDetailPhoto => "ENTRY_DETAIL_PHOTO",
            MediaType::DeliveryVideo => "DELIVERY_VIDEO",
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MediaType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        MediaType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| Error::Validation(format!("unknown media type: {s}")))
    }
}

/// Where the upload boundary stored the file. Opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    pub bucket: String,
    pub object_key: String,
}

impl BlobRef {
    pub fn new(bucket: impl Into<String>, object_key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            object_key: object_key.into(),
        }
    }
}

/// An immutable media record. Never updated, never deleted by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub id: MediaId,
    pub work_order_id: WorkOrderId,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub blob: BlobRef,
    pub mime_type: String,
    pub size_bytes: u64,
    pub caption: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

/// File metadata handed over by the upload boundary after the blob is
/// durably stored. MIME/type pairing is not checked here.
#[derive(Debug, Clone)]
pub struct NewMedia {
    pub media_type: MediaType,
    pub blob: BlobRef,
    pub mime_type: String,
    pub size_bytes: u64,
    pub caption: Option<String>,
}

impl NewMedia {
    pub fn new(
        media_type: MediaType,
        blob: BlobRef,
        mime_type: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        Self {
            media_type,
            blob,
            mime_type: mime_type.into(),
            size_bytes,
            caption: None,
        }
    }

    pub fn caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }
}
