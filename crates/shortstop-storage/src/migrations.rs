use shortstop_core::{Result, StorageError};
use sqlx::PgPool;
use tracing::info;

/// Numbered schema steps, applied in ascending order. Each script ends by
/// recording its own version in `revision`, so a step is applied exactly
/// once. A fresh database starts at revision 0.
const MIGRATIONS: &[&str] = &[
    // revision 1: users and mappings
    r#"
CREATE TABLE "user" (
    id   BIGSERIAL CONSTRAINT user_id_pk PRIMARY KEY,
    uuid UUID UNIQUE
);

CREATE TABLE url (
    short   VARCHAR(255) CONSTRAINT url_short_pk PRIMARY KEY,
    long    TEXT,
    user_id BIGINT
        CONSTRAINT url_user_id_fk
            REFERENCES "user"
            ON UPDATE CASCADE ON DELETE SET NULL
);

INSERT INTO revision VALUES (1);
"#,
    // revision 2: soft-delete flag
    r#"
ALTER TABLE url ADD COLUMN is_deleted BOOLEAN DEFAULT FALSE;

INSERT INTO revision VALUES (2);
"#,
];

/// Brings the schema up to the latest revision.
///
/// Ensures the `revision` ledger exists, reads the highest applied version,
/// and applies every later step inside its own transaction. Any failure is
/// fatal to startup.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS revision (version BIGSERIAL CONSTRAINT revision_version_pk PRIMARY KEY)"#,
    )
    .execute(pool)
    .await
    .map_err(|err| StorageError::Migration(format!("cannot create revision ledger: {err}")))?;

    let version: Option<i64> =
        sqlx::query_scalar(r#"SELECT version FROM revision ORDER BY version DESC LIMIT 1"#)
            .fetch_optional(pool)
            .await
            .map_err(|err| StorageError::Migration(format!("cannot read revision: {err}")))?;
    let version = version.unwrap_or(0);

    for (index, script) in MIGRATIONS.iter().enumerate() {
        let target = index as i64 + 1;
        if version >= target {
            continue;
        }
        info!(revision = target, "applying schema migration");

        let mut tx = pool
            .begin()
            .await
            .map_err(|err| StorageError::Migration(format!("cannot begin migration: {err}")))?;
        sqlx::raw_sql(script)
            .execute(&mut *tx)
            .await
            .map_err(|err| {
                StorageError::Migration(format!("migration to revision {target} failed: {err}"))
            })?;
        tx.commit().await.map_err(|err| {
            StorageError::Migration(format!("cannot commit migration to revision {target}: {err}"))
        })?;
    }

    Ok(())
}
