use chrono::Utc;
use common::storage::ObjectStore;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::entity::{attachment, blob, variant_record};
use crate::error::ProcessError;

/// Bounded retry for the reserve read-back; contention beyond this is a
/// fault, not routine racing.
const RESERVE_ATTEMPTS: u32 = 3;

/// Persistence operations for blobs, attachments, and variant records.
///
/// Reservation is the one concurrency-sensitive operation: it leans on the
/// unique (blob_id, variation_digest) index and resolves conflicts by
/// re-reading the winner, never by surfacing an error.
#[derive(Clone)]
pub struct BlobRepository {
    db: DatabaseConnection,
}

impl BlobRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub async fn blob(&self, id: Uuid) -> Result<Option<blob::Model>, ProcessError> {
        Ok(blob::Entity::find_by_id(id).one(&self.db).await?)
    }

    pub async fn find_variant_record(
        &self,
        blob_id: Uuid,
        digest: &str,
    ) -> Result<Option<variant_record::Model>, ProcessError> {
        Ok(variant_record::Entity::find()
            .filter(variant_record::Column::BlobId.eq(blob_id))
            .filter(variant_record::Column::VariationDigest.eq(digest))
            .one(&self.db)
            .await?)
    }

    /// Reserve the variant record for (blob, digest) exactly once.
    ///
    /// Two-phase: INSERT with ON CONFLICT DO NOTHING against the unique
    /// index, then read back. `created` is true only for the caller whose
    /// row landed; losers adopt the winner's record with no error.
    #[instrument(skip(self), fields(%blob_id))]
    pub async fn reserve_variant_record(
        &self,
        blob_id: Uuid,
        digest: &str,
    ) -> Result<(variant_record::Model, bool), ProcessError> {
        if let Some(existing) = self.find_variant_record(blob_id, digest).await? {
            return Ok((existing, false));
        }

        for attempt in 1..=RESERVE_ATTEMPTS {
            let id = Uuid::now_v7();
            let row = variant_record::ActiveModel {
                id: Set(id),
                blob_id: Set(blob_id),
                variation_digest: Set(digest.to_string()),
                created_at: Set(Utc::now()),
            };
            variant_record::Entity::insert(row)
                .on_conflict(
                    OnConflict::columns([
                        variant_record::Column::BlobId,
                        variant_record::Column::VariationDigest,
                    ])
                    .do_nothing()
                    .to_owned(),
                )
                .exec_without_returning(&self.db)
                .await?;

            if let Some(record) = self.find_variant_record(blob_id, digest).await? {
                let created = record.id == id;
                if !created {
                    debug!(digest, "lost reservation race; adopting existing record");
                }
                return Ok((record, created));
            }

            // Insert conflicted but the winning row is not visible yet
            // (e.g. deleted out from under us). Retry with a fresh id.
            debug!(attempt, digest, "reservation read-back missed, retrying");
        }

        Err(ProcessError::Internal(format!(
            "variant record reservation did not converge for digest {digest}"
        )))
    }

    /// Create a zero-size blob row with a freshly allocated storage key,
    /// before any bytes exist. The key is what dispatch payloads point the
    /// remote writer at.
    pub async fn create_placeholder_blob(
        &self,
        filename: &str,
        content_type: &str,
        service_name: &str,
    ) -> Result<blob::Model, ProcessError> {
        self.insert_blob(filename, content_type, service_name, 0, None)
            .await
    }

    /// Source-asset helper: upload bytes and record them with a real size
    /// and checksum.
    pub async fn create_and_upload(
        &self,
        store: &dyn ObjectStore,
        filename: &str,
        content_type: &str,
        service_name: &str,
        data: &[u8],
    ) -> Result<blob::Model, ProcessError> {
        let checksum = hex::encode(Sha256::digest(data));
        let record = self
            .insert_blob(
                filename,
                content_type,
                service_name,
                data.len() as i64,
                Some(checksum),
            )
            .await?;
        store.upload(&record.key, data, content_type).await?;
        Ok(record)
    }

    async fn insert_blob(
        &self,
        filename: &str,
        content_type: &str,
        service_name: &str,
        byte_size: i64,
        checksum: Option<String>,
    ) -> Result<blob::Model, ProcessError> {
        let id = Uuid::now_v7();
        let row = blob::ActiveModel {
            id: Set(id),
            key: Set(Uuid::new_v4().simple().to_string()),
            filename: Set(filename.to_string()),
            content_type: Set(content_type.to_string()),
            service_name: Set(service_name.to_string()),
            byte_size: Set(byte_size),
            checksum: Set(checksum),
            created_at: Set(Utc::now()),
        };
        blob::Entity::insert(row)
            .exec_without_returning(&self.db)
            .await?;

        self.blob(id)
            .await?
            .ok_or_else(|| ProcessError::Internal("blob missing after insert".into()))
    }

    /// Record the observed size of a previously placeholder blob.
    pub async fn mark_analyzed(
        &self,
        blob: blob::Model,
        byte_size: i64,
    ) -> Result<blob::Model, ProcessError> {
        let mut active: blob::ActiveModel = blob.into();
        active.byte_size = Set(byte_size);
        Ok(blob::Entity::update(active).exec(&self.db).await?)
    }

    /// Link a blob to an owner; must precede dispatch so the write target
    /// is discoverable from the record alone. Re-attaching the same
    /// (owner, name) replaces the blob.
    pub async fn attach(
        &self,
        name: &str,
        record_type: &str,
        record_id: &str,
        blob_id: Uuid,
    ) -> Result<attachment::Model, ProcessError> {
        let row = attachment::ActiveModel {
            id: Set(Uuid::now_v7()),
            name: Set(name.to_string()),
            record_type: Set(record_type.to_string()),
            record_id: Set(record_id.to_string()),
            blob_id: Set(blob_id),
            created_at: Set(Utc::now()),
        };
        attachment::Entity::insert(row)
            .on_conflict(
                OnConflict::columns([
                    attachment::Column::RecordType,
                    attachment::Column::RecordId,
                    attachment::Column::Name,
                ])
                .update_columns([attachment::Column::BlobId, attachment::Column::CreatedAt])
                .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        self.find_attachment(record_type, record_id, name)
            .await?
            .ok_or_else(|| ProcessError::Internal("attachment missing after upsert".into()))
    }

    /// Reserve the (owner, name) attachment slot exactly once.
    ///
    /// Same two-phase insert-then-read as `reserve_variant_record`: INSERT
    /// with ON CONFLICT DO NOTHING against the unique (record_type,
    /// record_id, name) index, then read back. `created` is true only when
    /// `blob_id` took the slot; losers adopt the winner's attachment
    /// unchanged.
    #[instrument(skip(self), fields(%blob_id))]
    pub async fn reserve_attachment(
        &self,
        name: &str,
        record_type: &str,
        record_id: &str,
        blob_id: Uuid,
    ) -> Result<(attachment::Model, bool), ProcessError> {
        if let Some(existing) = self.find_attachment(record_type, record_id, name).await? {
            return Ok((existing, false));
        }

        for attempt in 1..=RESERVE_ATTEMPTS {
            let row = attachment::ActiveModel {
                id: Set(Uuid::now_v7()),
                name: Set(name.to_string()),
                record_type: Set(record_type.to_string()),
                record_id: Set(record_id.to_string()),
                blob_id: Set(blob_id),
                created_at: Set(Utc::now()),
            };
            attachment::Entity::insert(row)
                .on_conflict(
                    OnConflict::columns([
                        attachment::Column::RecordType,
                        attachment::Column::RecordId,
                        attachment::Column::Name,
                    ])
                    .do_nothing()
                    .to_owned(),
                )
                .exec_without_returning(&self.db)
                .await?;

            if let Some(att) = self.find_attachment(record_type, record_id, name).await? {
                let created = att.blob_id == blob_id;
                if !created {
                    debug!(name, "lost attachment race; adopting existing slot");
                }
                return Ok((att, created));
            }
            debug!(attempt, name, "attachment read-back missed, retrying");
        }

        Err(ProcessError::Internal(format!(
            "attachment reservation did not converge for {record_type}/{record_id}/{name}"
        )))
    }

    /// Drop a blob row, e.g. a placeholder that lost an attachment race
    /// before anything referenced it.
    pub async fn delete_blob(&self, id: Uuid) -> Result<(), ProcessError> {
        blob::Entity::delete_by_id(id).exec(&self.db).await?;
        Ok(())
    }

    pub async fn find_attachment(
        &self,
        record_type: &str,
        record_id: &str,
        name: &str,
    ) -> Result<Option<attachment::Model>, ProcessError> {
        Ok(attachment::Entity::find()
            .filter(attachment::Column::RecordType.eq(record_type))
            .filter(attachment::Column::RecordId.eq(record_id))
            .filter(attachment::Column::Name.eq(name))
            .one(&self.db)
            .await?)
    }

    /// All attachments pointing at a blob, oldest first. Used to discover
    /// the owning domain record for endpoint overrides.
    pub async fn attachments_for_blob(
        &self,
        blob_id: Uuid,
    ) -> Result<Vec<attachment::Model>, ProcessError> {
        Ok(attachment::Entity::find()
            .filter(attachment::Column::BlobId.eq(blob_id))
            .order_by_asc(attachment::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    /// The output blob attached to a variant record, if any.
    pub async fn output_blob(
        &self,
        record: &variant_record::Model,
    ) -> Result<Option<blob::Model>, ProcessError> {
        let Some(att) = self
            .find_attachment("variant_record", &record.id.to_string(), "image")
            .await?
        else {
            return Ok(None);
        };
        self.blob(att.blob_id).await
    }
}
