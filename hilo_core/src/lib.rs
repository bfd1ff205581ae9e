#![forbid(unsafe_code)]
//! Core traits for the hilo identifier allocator and its record stores.
//! This crate is database-agnostic and should not contain any backend-specific logic.

// Re-export so implementors don't need a direct async-trait dependency.
pub use async_trait::async_trait;

pub mod counter;
pub mod memory;

pub use counter::{CasOutcome, CounterStore};

/// Compile-time table metadata for an entity.
///
/// Implemented by hand next to each entity; repository backends and the SQL
/// builder read it to produce statements.
pub trait Fetchable {
    const TABLE: &'static str;
    const SELECT_COLUMNS: &'static [&'static str];

    /// A list of (column_name, rust_type) tuples for fields that can be used
    /// as equality filters in `find_by_field`.
    const FINDABLE_COLUMNS: &'static [(&'static str, &'static str)];
}

/// A backend-agnostic representation of a database parameter value.
/// Entity field values travel to backend adapters in this form so that
/// `hilo_core` stays independent of any database driver.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    String(String),
    I64(i64),
    U64(u64),
    Null,
}

impl From<u64> for ParamValue {
    fn from(v: u64) -> Self {
        ParamValue::U64(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::I64(v)
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::String(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::String(v.to_string())
    }
}

/// Trait for entities that have an identifiable key.
pub trait Identifiable {
    /// The type of the primary key (e.g., `u64`).
    type Key;

    /// The name of the primary key column in the database.
    const ID_COLUMN: &'static str;

    /// Returns a copy of the entity's ID, if it has one.
    fn id(&self) -> Option<Self::Key>;
}

/// Entities whose key is issued by the application rather than the database.
///
/// The id is assigned exactly once, before the first insert.
pub trait AssignId: Identifiable {
    fn assign_id(&mut self, id: Self::Key);
}

/// Trait for types whose fields can be extracted for an INSERT statement.
pub trait Insertable {
    /// The columns to be used in an INSERT statement. Application-assigned
    /// keys are part of this list.
    const INSERT_COLUMNS: &'static [&'static str];

    /// The values of the fields corresponding to `INSERT_COLUMNS`.
    fn insert_values(&self) -> Vec<ParamValue>;
}

/// Trait for types whose fields can be extracted for an UPDATE statement.
pub trait Updatable {
    /// The columns to be used in an UPDATE statement's SET clause.
    const UPDATE_COLUMNS: &'static [&'static str];

    /// The values of the fields corresponding to `UPDATE_COLUMNS`, followed
    /// by the key used in the WHERE clause.
    fn update_values(&self) -> Vec<ParamValue>;
}

/// Lightweight, backend-agnostic error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// The entity was not found.
    #[error("entity not found")]
    NotFound,
    /// A row with the same key already exists.
    #[error("conflicting row already exists")]
    Conflict,
    /// Error while mapping a backend row into an entity.
    #[error("mapping error")]
    Mapping {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// The field is not one of the entity's findable columns.
    #[error("`{field}` is not a findable column")]
    UnknownField { field: String },
    /// Opaque backend error from the underlying driver or adapter.
    #[error("backend error")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl RepoError {
    /// Wrap a backend/driver error.
    pub fn backend<E>(e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        RepoError::Backend {
            source: Box::new(e),
        }
    }
    /// Wrap a row-mapping error.
    pub fn mapping<E>(e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        RepoError::Mapping {
            source: Box::new(e),
        }
    }
}

/// Convenience alias for results returned by store methods.
pub type RepoResult<T> = Result<T, RepoError>;

/// Accept `field` only if `T` lists it in `FINDABLE_COLUMNS`.
///
/// Every `find_by_field` implementation calls this before touching storage,
/// so unknown names fail the same way on every backend and never reach SQL.
pub fn findable_column<T: Fetchable>(field: &str) -> RepoResult<&'static str> {
    T::FINDABLE_COLUMNS
        .iter()
        .map(|(name, _)| *name)
        .find(|name| *name == field)
        .ok_or_else(|| RepoError::UnknownField {
            field: field.to_string(),
        })
}

/// A minimal, asynchronous repository interface for an entity `T`.
/// This is intentionally DB-agnostic. Concrete backends provide implementations.
#[async_trait]
pub trait Repository<T: Identifiable> {
    /// Fetch an entity by its primary key. Returns Ok(None) if not found.
    async fn find_by_id(&self, id: &T::Key) -> RepoResult<Option<T>>;

    /// A generic finder for a single field. Returns a (possibly empty) Vec of entities.
    /// Fails with [`RepoError::UnknownField`] unless `field_name` is findable.
    /// This is the low-level hook used by hand-written `find_by_<field>` functions.
    async fn find_by_field(&self, field_name: &str, value: ParamValue) -> RepoResult<Vec<T>>;

    /// Insert a new entity whose key has already been assigned.
    /// Fails with [`RepoError::Conflict`] if the key is taken.
    async fn insert(&self, entity: &T) -> RepoResult<T>;

    /// Update an existing entity. Fails with [`RepoError::NotFound`] if no
    /// row carries the entity's key.
    async fn update(&self, entity: &T) -> RepoResult<T>;

    /// Delete an entity by key. Returns true if a row was affected.
    async fn delete_by_id(&self, id: &T::Key) -> RepoResult<bool>;
}

#[async_trait]
impl<T, R> Repository<T> for std::sync::Arc<R>
where
    T: Identifiable + Send + Sync + 'static,
    T::Key: Sync,
    R: Repository<T> + Send + Sync + ?Sized,
{
    async fn find_by_id(&self, id: &T::Key) -> RepoResult<Option<T>> {
        (**self).find_by_id(id).await
    }

    async fn find_by_field(&self, field_name: &str, value: ParamValue) -> RepoResult<Vec<T>> {
        (**self).find_by_field(field_name, value).await
    }

    async fn insert(&self, entity: &T) -> RepoResult<T> {
        (**self).insert(entity).await
    }

    async fn update(&self, entity: &T) -> RepoResult<T> {
        (**self).update(entity).await
    }

    async fn delete_by_id(&self, id: &T::Key) -> RepoResult<bool> {
        (**self).delete_by_id(id).await
    }
}

/// A tiny adapter for mapping a backend-specific row type into an entity `T`.
#[allow(clippy::wrong_self_convention)]
pub trait RowAdapter<T> {
    type Row;
    fn from_row(&self, row: &Self::Row) -> RepoResult<T>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_error_display_messages() {
        let e1 = RepoError::NotFound;
        assert_eq!(format!("{}", e1), "entity not found");

        let e2 = RepoError::mapping(std::io::Error::new(std::io::ErrorKind::Other, "bad row"));
        // Display only carries the variant message; the cause is reachable via source().
        assert_eq!(format!("{}", e2), "mapping error");
        assert!(std::error::Error::source(&e2).is_some());

        let e3 = RepoError::backend(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert_eq!(format!("{}", e3), "backend error");

        assert_eq!(
            format!("{}", RepoError::Conflict),
            "conflicting row already exists"
        );
    }

    struct Findable;
    impl Fetchable for Findable {
        const TABLE: &'static str = "t";
        const SELECT_COLUMNS: &'static [&'static str] = &["id", "email"];
        const FINDABLE_COLUMNS: &'static [(&'static str, &'static str)] = &[("email", "String")];
    }

    #[test]
    fn only_declared_columns_are_findable() {
        assert_eq!(findable_column::<Findable>("email").unwrap(), "email");
        for bad in ["id", "email = email OR email", ""] {
            let err = findable_column::<Findable>(bad).unwrap_err();
            assert!(matches!(err, RepoError::UnknownField { ref field } if field == bad));
        }
        assert_eq!(
            RepoError::UnknownField { field: "x".into() }.to_string(),
            "`x` is not a findable column"
        );
    }

    #[test]
    fn param_value_conversions() {
        assert_eq!(ParamValue::from(7u64), ParamValue::U64(7));
        assert_eq!(ParamValue::from(-3i64), ParamValue::I64(-3));
        assert_eq!(ParamValue::from("a"), ParamValue::String("a".into()));
        assert_eq!(
            ParamValue::from(String::from("b")),
            ParamValue::String("b".into())
        );
        assert_ne!(ParamValue::I64(1), ParamValue::U64(1));
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct MiniEntity {
        id: Option<u64>,
    }

    impl Identifiable for MiniEntity {
        type Key = u64;
        const ID_COLUMN: &'static str = "id";
        fn id(&self) -> Option<Self::Key> {
            self.id
        }
    }

    impl AssignId for MiniEntity {
        fn assign_id(&mut self, id: u64) {
            self.id = Some(id);
        }
    }

    struct MiniAdapter;
    impl RowAdapter<MiniEntity> for MiniAdapter {
        type Row = u64; // pretend a row is just an id
        fn from_row(&self, row: &Self::Row) -> Result<MiniEntity, RepoError> {
            Ok(MiniEntity { id: Some(*row) })
        }
    }

    #[test]
    fn row_adapter_from_row_works() {
        let a = MiniAdapter;
        let ent = a.from_row(&7).unwrap();
        assert_eq!(ent, MiniEntity { id: Some(7) });
    }

    #[test]
    fn assign_id_sets_key() {
        let mut e = MiniEntity { id: None };
        assert_eq!(e.id(), None);
        e.assign_id(42);
        assert_eq!(e.id(), Some(42));
    }
}
