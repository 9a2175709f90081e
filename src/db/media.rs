//! Media records on Postgres.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{Db, parse_column};
use crate::error::{Error, Result};
use crate::lifecycle::MediaExistenceChecker;
use crate::model::*;
use crate::store::MediaStore;

#[async_trait]
impl MediaExistenceChecker for Db {
    async fn has_type(&self, work_order_id: WorkOrderId, media_type: MediaType) -> Result<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM media WHERE work_order_id = $1 AND media_type = $2)",
        )
        .bind(work_order_id.0)
        .bind(media_type.as_str())
        .fetch_one(self.pool())
        .await?;
        Ok(exists)
    }
}

#[async_trait]
impl MediaStore for Db {
    async fn attach(
        &self,
        work_order_id: WorkOrderId,
        new: NewMedia,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Result<Media> {
        let size = i64::try_from(new.size_bytes)
            .map_err(|_| Error::Validation(format!("media too large: {} bytes", new.size_bytes)))?;
        let id = MediaId::new();
        let mut tx = self.pool().begin().await?;

        // FOR SHARE holds off a concurrent status change until commit.
        let row: Option<(String,)> =
            sqlx::query_as("SELECT status FROM work_orders WHERE id = $1 FOR SHARE")
                .bind(work_order_id.0)
                .fetch_optional(&mut *tx)
                .await?;
        let (status,) = row.ok_or_else(|| Error::NotFound(format!("work order {work_order_id}")))?;
        let status: Status = parse_column("status", &status)?;
        if status.is_terminal() {
            return Err(Error::Immutable { status });
        }

        sqlx::query(
            "INSERT INTO media (id, work_order_id, media_type, bucket, object_key, mime_type, size_bytes, caption, created_by, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(id.0)
        .bind(work_order_id.0)
        .bind(new.media_type.as_str())
        .bind(&new.blob.bucket)
        .bind(&new.blob.object_key)
        .bind(&new.mime_type)
        .bind(size)
        .bind(&new.caption)
        .bind(actor.0)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Media {
            id,
            work_order_id,
            media_type: new.media_type,
            blob: new.blob,
            mime_type: new.mime_type,
            size_bytes: new.size_bytes,
            caption: new.caption,
            created_by: actor,
            created_at: at,
        })
    }

    async fn list_media(&self, work_order_id: WorkOrderId) -> Result<Vec<Media>> {
        let rows: Vec<MediaRow> = sqlx::query_as(
            "SELECT id, work_order_id, media_type, bucket, object_key, mime_type, size_bytes, caption, created_by, created_at
             FROM media
             WHERE work_order_id = $1
             ORDER BY created_at ASC, id ASC",
        )
        .bind(work_order_id.0)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(MediaRow::try_into_media).collect()
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct MediaRow {
    id: Uuid,
    work_order_id: Uuid,
    media_type: String,
    bucket: String,
    object_key: String,
    mime_type: String,
    size_bytes: i64,
    caption: Option<String>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
}

impl MediaRow {
    fn try_into_media(self) -> Result<Media> {
        Ok(Media {
            id: MediaId(self.id),
            work_order_id: WorkOrderId(self.work_order_id),
            media_type: parse_column("media_type", &self.media_type)?,
            blob: BlobRef::new(self.bucket, self.object_key),
            mime_type: self.mime_type,
            size_bytes: self.size_bytes.max(0) as u64,
            caption: self.caption,
            created_by: UserId(self.created_by),
            created_at: self.created_at,
        })
    }
}
