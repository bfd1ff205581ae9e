use hilo_core::RepoError;

use crate::allocator::AllocError;
use crate::user::ValidationError;

/// Failure of a [`UserService`](crate::service::UserService) operation.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid user: {0}")]
    Validation(#[from] ValidationError),
    /// No id could be allocated. The whole operation may be retried.
    #[error("could not allocate an id: {0}")]
    Allocation(#[from] AllocError),
    #[error("no user with id {id}")]
    UserNotFound { id: u64 },
    #[error("no user with email {email}")]
    EmailNotFound { email: String },
    #[error("record store unavailable: {0}")]
    StoreUnavailable(#[source] RepoError),
    /// The allocated id was already taken in the record store.
    #[error("user id {id} is already taken")]
    Conflict { id: u64 },
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ServiceError::UserNotFound { .. } | ServiceError::EmailNotFound { .. }
        )
    }

    /// True when retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ServiceError::Allocation(_) | ServiceError::StoreUnavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_and_classification() {
        let e = ServiceError::from(ValidationError { field: "email" });
        assert_eq!(e.to_string(), "invalid user: email must not be empty");
        assert!(!e.is_transient());

        let e = ServiceError::UserNotFound { id: 4 };
        assert!(e.is_not_found());
        assert_eq!(e.to_string(), "no user with id 4");

        let e = ServiceError::from(AllocError::Contended {
            block: "users".into(),
            attempts: 5,
        });
        assert!(e.is_transient());
        assert!(!e.is_not_found());

        assert!(ServiceError::StoreUnavailable(RepoError::NotFound).is_transient());
    }
}
