use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Polymorphic link from an owning record to a blob.
///
/// Used for variant outputs (`record_type = "variant_record"`, name
/// `image`), video preview images (`record_type = "blob"`, name
/// `preview_image`), and arbitrary domain owners (e.g. a user's `avatar`),
/// which is how the engine discovers the owner for per-tenant endpoint
/// overrides. Unique per (record_type, record_id, name); re-attaching
/// replaces the blob.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "attachment")]
pub struct Model {
    /// UUIDv7 primary key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Attachment name within the owner's namespace (e.g. "image").
    pub name: String,

    /// Owner entity type (e.g. "variant_record", "user").
    pub record_type: String,

    /// Owner entity ID (canonical string form).
    pub record_id: String,

    pub blob_id: Uuid,

    #[sea_orm(belongs_to, from = "blob_id", to = "id")]
    pub blob: Option<super::blob::Entity>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
