use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A stored asset: either an original upload or a derived output.
///
/// Derived outputs start life as placeholders with `byte_size = 0` and no
/// checksum; the remote processor writes the object out of band and a later
/// analyze step fills the row in. Original uploads are never mutated after
/// their bytes land.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "blob")]
pub struct Model {
    /// UUIDv7 primary key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Object-store key, allocated before any bytes exist so dispatch
    /// payloads can reference it.
    #[sea_orm(unique)]
    pub key: String,

    pub filename: String,

    /// MIME content type.
    pub content_type: String,

    /// Logical object-store service holding the bytes.
    pub service_name: String,

    /// Size in bytes; 0 until the object is written and analyzed.
    pub byte_size: i64,

    /// SHA-256 hex checksum; `None` for placeholders.
    pub checksum: Option<String>,

    pub created_at: DateTimeUtc,

    #[sea_orm(has_many)]
    pub variant_records: HasMany<super::variant_record::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
