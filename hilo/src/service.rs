//! The user operations behind the HTTP endpoints.

use std::sync::Arc;

use hilo_core::{AssignId, CounterStore, RepoError, Repository};

#[cfg(feature = "tracing")]
use tracing::{debug, info};

use crate::allocator::HiLoAllocator;
use crate::error::ServiceError;
use crate::user::{self, User, USERS_BLOCK};

/// Creates, reads, updates and deletes users.
///
/// Holds its record store and a shared allocator; several services (or
/// several processes) may share one allocator's counter store.
pub struct UserService<R, C> {
    repo: R,
    allocator: Arc<HiLoAllocator<C>>,
    block: String,
}

impl<R, C> UserService<R, C>
where
    R: Repository<User> + Send + Sync,
    C: CounterStore + Send + Sync,
{
    pub fn new(repo: R, allocator: Arc<HiLoAllocator<C>>) -> Self {
        Self {
            repo,
            allocator,
            block: USERS_BLOCK.to_string(),
        }
    }

    /// Allocate ids from `block` instead of the default `"users"` block.
    pub fn with_block(mut self, block: impl Into<String>) -> Self {
        self.block = block.into();
        self
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn allocator(&self) -> &Arc<HiLoAllocator<C>> {
        &self.allocator
    }

    /// Validate, allocate an id and persist a new user. Returns the id.
    pub async fn create(&self, email: &str, name: &str) -> Result<u64, ServiceError> {
        let mut user = User::new(email, name);
        user.validate()?;
        let id = self.allocator.next_id(&self.block).await?;
        user.assign_id(id);
        match self.repo.insert(&user).await {
            Ok(_) => {
                #[cfg(feature = "tracing")]
                info!(id, "user created");
                Ok(id)
            }
            Err(RepoError::Conflict) => Err(ServiceError::Conflict { id }),
            Err(e) => Err(ServiceError::StoreUnavailable(e)),
        }
    }

    pub async fn get(&self, id: u64) -> Result<User, ServiceError> {
        self.repo
            .find_by_id(&id)
            .await
            .map_err(ServiceError::StoreUnavailable)?
            .ok_or(ServiceError::UserNotFound { id })
    }

    /// Id of the user registered under `email`.
    pub async fn get_by_email(&self, email: &str) -> Result<u64, ServiceError> {
        let found = user::find_by_email(&self.repo, email)
            .await
            .map_err(ServiceError::StoreUnavailable)?;
        found
            .and_then(|u| u.id)
            .ok_or_else(|| ServiceError::EmailNotFound {
                email: email.to_string(),
            })
    }

    /// Replace email and name of an existing user. The last write wins.
    pub async fn update(&self, id: u64, email: &str, name: &str) -> Result<(), ServiceError> {
        let mut user = self.get(id).await?;
        user.email = email.to_string();
        user.name = name.to_string();
        user.validate()?;
        match self.repo.update(&user).await {
            Ok(_) => {
                #[cfg(feature = "tracing")]
                debug!(id, "user updated");
                Ok(())
            }
            // deleted between read and write
            Err(RepoError::NotFound) => Err(ServiceError::UserNotFound { id }),
            Err(e) => Err(ServiceError::StoreUnavailable(e)),
        }
    }

    pub async fn delete(&self, id: u64) -> Result<(), ServiceError> {
        let removed = self
            .repo
            .delete_by_id(&id)
            .await
            .map_err(ServiceError::StoreUnavailable)?;
        if !removed {
            return Err(ServiceError::UserNotFound { id });
        }
        #[cfg(feature = "tracing")]
        info!(id, "user deleted");
        Ok(())
    }
}
