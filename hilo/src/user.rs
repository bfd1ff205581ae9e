use hilo_core::{
    AssignId, Fetchable, Identifiable, Insertable, ParamValue, RepoResult, Repository, Updatable,
};

/// Name of the id block users are allocated from.
pub const USERS_BLOCK: &str = "users";

/// A person known by email address.
///
/// `id` is `None` until the record is first saved; after that it never
/// changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Option<u64>,
    pub email: String,
    pub name: String,
}

/// A required field was empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{field} must not be empty")]
pub struct ValidationError {
    pub field: &'static str,
}

impl User {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            email: email.into(),
            name: name.into(),
        }
    }

    /// Checks required fields. Whitespace-only values count as empty.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.email.trim().is_empty() {
            return Err(ValidationError { field: "email" });
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError { field: "name" });
        }
        Ok(())
    }
}

impl Fetchable for User {
    const TABLE: &'static str = "users";
    const SELECT_COLUMNS: &'static [&'static str] = &["id", "email", "name"];
    const FINDABLE_COLUMNS: &'static [(&'static str, &'static str)] =
        &[("email", "String"), ("name", "String")];
}

impl Identifiable for User {
    type Key = u64;
    const ID_COLUMN: &'static str = "id";

    fn id(&self) -> Option<u64> {
        self.id
    }
}

impl AssignId for User {
    fn assign_id(&mut self, id: u64) {
        self.id = Some(id);
    }
}

impl Insertable for User {
    const INSERT_COLUMNS: &'static [&'static str] = &["id", "email", "name"];

    fn insert_values(&self) -> Vec<ParamValue> {
        vec![
            self.id.map_or(ParamValue::Null, ParamValue::U64),
            ParamValue::String(self.email.clone()),
            ParamValue::String(self.name.clone()),
        ]
    }
}

impl Updatable for User {
    const UPDATE_COLUMNS: &'static [&'static str] = &["email", "name"];

    fn update_values(&self) -> Vec<ParamValue> {
        vec![
            ParamValue::String(self.email.clone()),
            ParamValue::String(self.name.clone()),
            self.id.map_or(ParamValue::Null, ParamValue::U64),
        ]
    }
}

/// Look a user up by exact email.
///
/// Emails are not unique in storage; when several users share one, the one
/// with the lowest id wins.
pub async fn find_by_email<R>(repo: &R, email: &str) -> RepoResult<Option<User>>
where
    R: Repository<User> + ?Sized,
{
    let matches = repo.find_by_field("email", ParamValue::from(email)).await?;
    Ok(matches.into_iter().min_by_key(|u| u.id))
}

#[cfg(feature = "libsql-backend")]
pub use row::UserRowAdapter;

#[cfg(feature = "libsql-backend")]
mod row {
    use super::User;
    use hilo_core::{RepoError, RepoResult, RowAdapter};

    /// Maps `SELECT id, email, name` rows.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct UserRowAdapter;

    impl RowAdapter<User> for UserRowAdapter {
        type Row = libsql::Row;

        fn from_row(&self, row: &Self::Row) -> RepoResult<User> {
            let id: i64 = row.get(0).map_err(RepoError::mapping)?;
            Ok(User {
                id: Some(u64::try_from(id).map_err(RepoError::mapping)?),
                email: row.get(1).map_err(RepoError::mapping)?,
                name: row.get(2).map_err(RepoError::mapping)?,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hilo_core::memory::MemoryRepository;

    #[test]
    fn validation_names_the_offending_field() {
        assert!(User::new("a@x.com", "A").validate().is_ok());
        assert_eq!(
            User::new("", "A").validate(),
            Err(ValidationError { field: "email" })
        );
        assert_eq!(
            User::new("a@x.com", "  \t").validate(),
            Err(ValidationError { field: "name" })
        );
        assert_eq!(
            ValidationError { field: "email" }.to_string(),
            "email must not be empty"
        );
    }

    #[test]
    fn mapping_puts_the_key_last_for_updates() {
        let mut u = User::new("a@x.com", "A");
        assert_eq!(u.insert_values()[0], ParamValue::Null);
        u.assign_id(1000);
        assert_eq!(
            u.insert_values(),
            vec![
                ParamValue::U64(1000),
                ParamValue::from("a@x.com"),
                ParamValue::from("A")
            ]
        );
        assert_eq!(u.update_values().last(), Some(&ParamValue::U64(1000)));
        assert_eq!(u.update_values().len(), User::UPDATE_COLUMNS.len() + 1);
    }

    #[tokio::test]
    async fn find_by_email_prefers_the_lowest_id() {
        let repo = MemoryRepository::<User>::new();
        for (id, email) in [(30, "dup@x.com"), (7, "dup@x.com"), (9, "other@x.com")] {
            let mut u = User::new(email, "N");
            u.assign_id(id);
            repo.insert(&u).await.unwrap();
        }
        let found = find_by_email(&repo, "dup@x.com").await.unwrap().unwrap();
        assert_eq!(found.id, Some(7));
        assert!(find_by_email(&repo, "nobody@x.com").await.unwrap().is_none());
    }
}
