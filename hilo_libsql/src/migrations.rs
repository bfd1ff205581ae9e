//! Versioned schema for the `users` and `hilo_counters` tables.
//!
//! Each file holds one idempotent statement; `apply` runs them in order and
//! is safe to call on every start-up.

pub const USERS_SQL: &str = include_str!("../migrations/001_users.sql");
pub const COUNTERS_SQL: &str = include_str!("../migrations/002_hilo_counters.sql");
pub const USERS_EMAIL_INDEX_SQL: &str = include_str!("../migrations/003_users_email_index.sql");

/// All migrations as `(version, sql)` in application order.
pub const ALL: &[(u32, &str)] = &[
    (1, USERS_SQL),
    (2, COUNTERS_SQL),
    (3, USERS_EMAIL_INDEX_SQL),
];

/// Apply every migration against `db`. Runs on a busy-timeout connection, so
/// it waits out writers holding the file lock.
#[cfg(feature = "libsql-backend")]
pub async fn apply(db: &libsql::Database) -> hilo_core::RepoResult<()> {
    use hilo_core::RepoError;

    let conn = crate::backend::connect(db).await?;
    for (_version, sql) in ALL {
        conn.execute(sql, ()).await.map_err(RepoError::backend)?;
        #[cfg(feature = "tracing")]
        tracing::debug!(version = _version, "applied migration");
    }
    Ok(())
}
