#![forbid(unsafe_code)]
#![cfg_attr(
    not(feature = "libsql-backend"),
    doc = "Enable feature `libsql-backend` to use this adapter."
)]

pub mod migrations;

#[cfg(feature = "libsql-backend")]
mod backend {
    use std::time::Instant;

    #[cfg(feature = "tracing")]
    use tracing::info;

    #[inline]
    #[allow(unused_variables)]
    fn obs_record(op: &str, table: &str, start: Instant, rows: usize, success: bool) {
        let elapsed = start.elapsed().as_millis() as u64;
        #[cfg(feature = "tracing")]
        {
            info!(
                sql_kind = "sql",
                table = table,
                op = op,
                rows = rows,
                elapsed_ms = elapsed,
                success = success,
                "repo op"
            );
        }
        #[cfg(feature = "metrics")]
        {
            metrics::counter!("repo_ops_total", 1, "op" => op.to_string(), "table" => table.to_string(), "success" => success.to_string());
            metrics::histogram!("repo_op_duration_ms", elapsed as f64, "op" => op.to_string(), "table" => table.to_string());
            if !success {
                metrics::counter!("repo_op_errors_total", 1, "op" => op.to_string(), "table" => table.to_string());
            }
        }
    }

    use async_trait::async_trait;
    use hilo_core::{
        findable_column, CasOutcome, CounterStore, Fetchable, Identifiable, Insertable, ParamValue, RepoError,
        RepoResult, Repository, RowAdapter, Updatable,
    };
    use hilo_sql_builder::CounterTable;
    use libsql::{params, Connection, Database, Row, Value};
    use std::collections::HashMap;
    use std::marker::PhantomData;
    use std::sync::{Arc, Mutex};

    const SQLITE_CONSTRAINT: std::ffi::c_int = 19;
    const BUSY_TIMEOUT_MS: u64 = 5_000;

    // Helper function to convert ParamValue to libsql::Value.
    pub(crate) fn to_libsql_value(p: ParamValue) -> RepoResult<Value> {
        Ok(match p {
            ParamValue::String(s) => s.into(),
            ParamValue::I64(i) => i.into(),
            ParamValue::U64(u) => i64::try_from(u).map_err(RepoError::backend)?.into(),
            ParamValue::Null => Value::Null,
        })
    }

    fn to_libsql_values(values: Vec<ParamValue>) -> RepoResult<Vec<Value>> {
        values.into_iter().map(to_libsql_value).collect()
    }

    fn is_constraint_violation(e: &libsql::Error) -> bool {
        // Extended result codes keep the primary code in the low byte.
        matches!(e, libsql::Error::SqliteFailure(code, _) if code & 0xff == SQLITE_CONSTRAINT)
    }

    /// Make `conn` wait up to the busy timeout for a locked database file
    /// instead of failing with `SQLITE_BUSY`.
    pub(crate) async fn set_busy_timeout(conn: &Connection) -> RepoResult<()> {
        let mut rows = conn
            .query(&format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT_MS), ())
            .await
            .map_err(RepoError::backend)?;
        // the pragma echoes the new value; step it so the statement runs
        rows.next().await.map_err(RepoError::backend)?;
        Ok(())
    }

    /// Open a fresh connection with the busy timeout applied. Every
    /// connection this crate opens goes through here.
    pub(crate) async fn connect(db: &Database) -> RepoResult<Connection> {
        let conn = db.connect().map_err(RepoError::backend)?;
        set_busy_timeout(&conn).await?;
        Ok(conn)
    }

    /// Prepared statement text for one entity type.
    pub(crate) struct RepoSql<T> {
        select_by_id: String,
        delete_by_id: String,
        insert: String,
        update_by_id: String,
        pub(crate) find_by_field_cache: Mutex<HashMap<String, String>>,
        _marker: PhantomData<T>,
    }

    impl<T> RepoSql<T>
    where
        T: Fetchable + Identifiable + Insertable + Updatable,
    {
        fn new() -> Self {
            Self {
                select_by_id: hilo_sql_builder::select_by_id::<T>(T::ID_COLUMN),
                delete_by_id: hilo_sql_builder::delete_by_id::<T>(T::ID_COLUMN),
                insert: hilo_sql_builder::insert::<T>(),
                update_by_id: hilo_sql_builder::update_by_id::<T>(T::ID_COLUMN),
                find_by_field_cache: Mutex::new(HashMap::new()),
                _marker: PhantomData,
            }
        }

        /// `field` must come from `T::FINDABLE_COLUMNS`, which bounds the cache.
        fn get_select_by_field(&self, field: &'static str) -> String {
            // A poisoned cache only ever holds complete entries; keep using it.
            let mut guard = self
                .find_by_field_cache
                .lock()
                .unwrap_or_else(|p| p.into_inner());
            if let Some(s) = guard.get(field) {
                return s.clone();
            }
            let built = hilo_sql_builder::select_by_field::<T>(field);
            guard.insert(field.to_string(), built.clone());
            built
        }
    }

    /// A fully asynchronous, `libsql`-backed repository.
    pub struct LibsqlRepository<T, A>
    where
        T: Identifiable + 'static,
        A: RowAdapter<T> + Send + Sync + 'static,
    {
        db: Arc<Database>,
        /// Optional pinned connection. When set, all operations use it
        /// instead of opening a new one.
        conn: Option<Connection>,
        adapter: A,
        pub(crate) sql: RepoSql<T>,
    }

    impl<T, A> LibsqlRepository<T, A>
    where
        T: Fetchable + Identifiable + Insertable + Updatable + 'static,
        A: RowAdapter<T, Row = Row> + Send + Sync + 'static,
    {
        /// Creates a new repository from an existing `libsql::Database` object.
        pub fn new(db: Arc<Database>, adapter: A) -> Self {
            Self {
                db,
                conn: None,
                adapter,
                sql: RepoSql::<T>::new(),
            }
        }

        /// Creates a new repository from an existing connection. All operations
        /// will execute on the provided connection, which gets the same busy
        /// timeout as connections opened by the repository itself.
        pub async fn from_conn(db: Arc<Database>, conn: Connection, adapter: A) -> RepoResult<Self> {
            set_busy_timeout(&conn).await?;
            Ok(Self {
                db,
                conn: Some(conn),
                adapter,
                sql: RepoSql::<T>::new(),
            })
        }

        async fn conn(&self) -> RepoResult<Connection> {
            match &self.conn {
                Some(c) => Ok(c.clone()),
                None => connect(&self.db).await,
            }
        }
    }

    #[async_trait]
    impl<T, A> Repository<T> for LibsqlRepository<T, A>
    where
        T: Fetchable + Identifiable + Insertable + Updatable + Send + Sync + Clone + 'static,
        A: RowAdapter<T, Row = Row> + Send + Sync + 'static,
        T::Key: Clone + Send + Sync + 'static + Into<ParamValue>,
    {
        async fn find_by_id(&self, id: &T::Key) -> RepoResult<Option<T>> {
            let __start = Instant::now();
            let conn = self.conn().await?;
            let key = to_libsql_value(id.clone().into())?;
            let mut rows = conn
                .query(&self.sql.select_by_id, params!(key))
                .await
                .map_err(RepoError::backend)?;

            if let Some(row) = rows.next().await.map_err(RepoError::backend)? {
                let entity = self.adapter.from_row(&row)?;
                obs_record("find_by_id", T::TABLE, __start, 1, true);
                Ok(Some(entity))
            } else {
                obs_record("find_by_id", T::TABLE, __start, 0, true);
                Ok(None)
            }
        }

        async fn find_by_field(&self, field_name: &str, value: ParamValue) -> RepoResult<Vec<T>> {
            let __start = Instant::now();
            let column = findable_column::<T>(field_name)?;
            let sql = self.sql.get_select_by_field(column);
            let value_param = to_libsql_value(value)?;
            let conn = self.conn().await?;
            let mut rows = conn
                .query(&sql, params!(value_param))
                .await
                .map_err(RepoError::backend)?;

            let mut entities = Vec::new();
            while let Some(row) = rows.next().await.map_err(RepoError::backend)? {
                entities.push(self.adapter.from_row(&row)?);
            }
            let len = entities.len();
            obs_record("find_by_field", T::TABLE, __start, len, true);
            Ok(entities)
        }

        async fn insert(&self, entity: &T) -> RepoResult<T> {
            let __start = Instant::now();
            let values = to_libsql_values(entity.insert_values())?;
            let conn = self.conn().await?;
            match conn.execute(&self.sql.insert, values).await {
                Ok(n) => {
                    obs_record("insert", T::TABLE, __start, n as usize, true);
                    Ok(entity.clone())
                }
                Err(e) if is_constraint_violation(&e) => {
                    obs_record("insert", T::TABLE, __start, 0, false);
                    Err(RepoError::Conflict)
                }
                Err(e) => {
                    obs_record("insert", T::TABLE, __start, 0, false);
                    Err(RepoError::backend(e))
                }
            }
        }

        async fn update(&self, entity: &T) -> RepoResult<T> {
            let __start = Instant::now();
            let values = to_libsql_values(entity.update_values())?;
            let conn = self.conn().await?;
            let n = conn
                .execute(&self.sql.update_by_id, values)
                .await
                .map_err(RepoError::backend)?;
            obs_record("update", T::TABLE, __start, n as usize, n > 0);
            if n == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(entity.clone())
        }

        async fn delete_by_id(&self, id: &T::Key) -> RepoResult<bool> {
            let __start = Instant::now();
            let key = to_libsql_value(id.clone().into())?;
            let conn = self.conn().await?;
            let n = conn
                .execute(&self.sql.delete_by_id, params!(key))
                .await
                .map_err(RepoError::backend)?;
            obs_record("delete_by_id", T::TABLE, __start, n as usize, true);
            Ok(n > 0)
        }
    }

    struct CounterSql {
        select: String,
        insert_if_absent: String,
        compare_and_swap: String,
        table: String,
    }

    impl CounterSql {
        fn new(t: &CounterTable) -> Self {
            Self {
                select: hilo_sql_builder::select_counter(t),
                insert_if_absent: hilo_sql_builder::insert_counter_if_absent(t),
                compare_and_swap: hilo_sql_builder::compare_and_swap_counter(t),
                table: t.table.clone(),
            }
        }
    }

    /// hi/lo counter rows kept in a libsql table.
    ///
    /// The swap is a single conditional `UPDATE`, so it stays atomic across
    /// processes sharing the database.
    pub struct LibsqlCounterStore {
        db: Arc<Database>,
        sql: CounterSql,
    }

    impl LibsqlCounterStore {
        /// Counter store over the default `hilo_counters` table.
        pub fn new(db: Arc<Database>) -> Self {
            Self::with_table(db, &CounterTable::default())
        }

        pub fn with_table(db: Arc<Database>, table: &CounterTable) -> Self {
            Self {
                db,
                sql: CounterSql::new(table),
            }
        }
    }

    #[async_trait]
    impl CounterStore for LibsqlCounterStore {
        async fn load(&self, block: &str) -> RepoResult<Option<i64>> {
            let __start = Instant::now();
            let conn = connect(&self.db).await?;
            let mut rows = conn
                .query(&self.sql.select, params!(block.to_string()))
                .await
                .map_err(RepoError::backend)?;
            let value = match rows.next().await.map_err(RepoError::backend)? {
                Some(row) => Some(row.get::<i64>(0).map_err(RepoError::mapping)?),
                None => None,
            };
            obs_record("counter_load", &self.sql.table, __start, value.iter().count(), true);
            Ok(value)
        }

        async fn insert_if_absent(&self, block: &str, value: i64) -> RepoResult<CasOutcome> {
            let __start = Instant::now();
            let conn = connect(&self.db).await?;
            let n = conn
                .execute(&self.sql.insert_if_absent, params!(block.to_string(), value))
                .await
                .map_err(RepoError::backend)?;
            obs_record("counter_insert", &self.sql.table, __start, n as usize, true);
            Ok(if n == 1 {
                CasOutcome::Swapped
            } else {
                CasOutcome::Conflict
            })
        }

        async fn compare_and_swap(
            &self,
            block: &str,
            expected: i64,
            new: i64,
        ) -> RepoResult<CasOutcome> {
            let __start = Instant::now();
            let conn = connect(&self.db).await?;
            let n = conn
                .execute(&self.sql.compare_and_swap, params!(new, block.to_string(), expected))
                .await
                .map_err(RepoError::backend)?;
            obs_record("counter_cas", &self.sql.table, __start, n as usize, true);
            Ok(if n == 1 {
                CasOutcome::Swapped
            } else {
                CasOutcome::Conflict
            })
        }
    }
}

#[cfg(feature = "libsql-backend")]
pub use backend::{LibsqlCounterStore, LibsqlRepository};
