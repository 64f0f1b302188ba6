use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Binds a (source blob, variation digest) pair to a derived output.
///
/// The (blob_id, variation_digest) pair carries a database-level unique
/// index; reservation under concurrent callers relies on it rather than on
/// check-then-insert. The output blob hangs off an `attachment` row named
/// `image`.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "variant_record")]
pub struct Model {
    /// UUIDv7 primary key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Source blob this variant derives from.
    pub blob_id: Uuid,

    #[sea_orm(belongs_to, from = "blob_id", to = "id")]
    pub blob: Option<super::blob::Entity>,

    /// Deterministic identity of the requested variation.
    pub variation_digest: String,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
