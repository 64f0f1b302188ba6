use std::time::Duration;

use sea_orm::sea_query::{Index, MysqlQueryBuilder, PostgresQueryBuilder, SqliteQueryBuilder};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, Schema,
};
use tracing::info;

use crate::entity::{attachment, blob, variant_record};

/// Connect to the database and bring the engine schema up.
///
/// DDL runs over a dedicated single connection that is closed again before
/// the pool opens; a pooled connection opened pre-DDL would keep serving
/// the stale schema (SQLite rejects `ON CONFLICT` targets it prepared
/// before the unique index existed).
pub async fn init_db(db_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut setup_opt = ConnectOptions::new(db_url.to_owned());
    setup_opt.max_connections(1).sqlx_logging(true);
    let setup = Database::connect(setup_opt).await?;
    setup_schema(&setup).await?;
    setup.close().await?;

    let mut opt = ConnectOptions::new(db_url.to_owned());

    opt.max_connections(100)
        .min_connections(5)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(8))
        .max_lifetime(Duration::from_secs(8))
        .sqlx_logging(true);

    Database::connect(opt).await
}

/// Create the engine tables and indexes if they do not exist.
pub async fn setup_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut tables = [
        schema.create_table_from_entity(blob::Entity),
        schema.create_table_from_entity(attachment::Entity),
        schema.create_table_from_entity(variant_record::Entity),
    ];
    for table in &mut tables {
        table.if_not_exists();
        let sql = match backend {
            DbBackend::Sqlite => table.to_string(SqliteQueryBuilder),
            DbBackend::MySql => table.to_string(MysqlQueryBuilder),
            _ => table.to_string(PostgresQueryBuilder),
        };
        db.execute_unprepared(&sql).await?;
    }

    ensure_indexes(db).await?;
    Ok(())
}

/// Indexes the entity derives cannot express.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();

    // Reservation correctness depends on this constraint: concurrent
    // callers racing on the same (blob, digest) pair must collapse to one
    // row at the database level, not by check-then-insert.
    let unique_digest = Index::create()
        .if_not_exists()
        .unique()
        .name("idx_variant_record_blob_digest")
        .table(variant_record::Entity)
        .col(variant_record::Column::BlobId)
        .col(variant_record::Column::VariationDigest)
        .to_owned();

    // One attachment per (owner, name); re-attach replaces via upsert.
    let unique_attachment = Index::create()
        .if_not_exists()
        .unique()
        .name("idx_attachment_owner_name")
        .table(attachment::Entity)
        .col(attachment::Column::RecordType)
        .col(attachment::Column::RecordId)
        .col(attachment::Column::Name)
        .to_owned();

    for (name, index) in [
        ("idx_variant_record_blob_digest", unique_digest),
        ("idx_attachment_owner_name", unique_attachment),
    ] {
        let sql = match backend {
            DbBackend::Sqlite => index.to_string(SqliteQueryBuilder),
            DbBackend::MySql => index.to_string(MysqlQueryBuilder),
            _ => index.to_string(PostgresQueryBuilder),
        };
        db.execute_unprepared(&sql).await?;
        info!(index = name, "Ensured index exists");
    }

    Ok(())
}
