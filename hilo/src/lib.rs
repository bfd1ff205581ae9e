#![forbid(unsafe_code)]
//! Table-backed hi/lo identifier allocation and the `User` record service.
//!
//! This crate is the main public API. It re-exports the core store traits so
//! that applications only need this single crate as a dependency, and the
//! libsql backend when the `libsql-backend` feature is enabled.
//!
//! # Example: allocating ids
//!
//! ```
//! use hilo::allocator::{AllocatorConfig, HiLoAllocator};
//! use hilo::memory::MemoryCounterStore;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let alloc = HiLoAllocator::new(MemoryCounterStore::new(), AllocatorConfig::default())?;
//! assert_eq!(alloc.next_id("users").await?, 1);
//! assert_eq!(alloc.next_id("users").await?, 2);
//! # Ok::<_, hilo::allocator::AllocError>(())
//! # }).unwrap();
//! ```
//!
//! # Example: the user service
//!
//! ```
//! use std::sync::Arc;
//! use hilo::memory::{MemoryCounterStore, MemoryRepository};
//! use hilo::{AllocatorConfig, HiLoAllocator, UserService};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let alloc = HiLoAllocator::new(MemoryCounterStore::new(), AllocatorConfig::default())?;
//! let users = UserService::new(MemoryRepository::new(), Arc::new(alloc));
//!
//! let id = users.create("a@x.com", "A").await?;
//! assert_eq!(users.get_by_email("a@x.com").await?, id);
//! users.delete(id).await?;
//! assert!(users.get_by_email("a@x.com").await.unwrap_err().is_not_found());
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! ```

// Re-export all core traits.
pub use hilo_core::{
    AssignId, CasOutcome, CounterStore, Fetchable, Identifiable, Insertable, ParamValue,
    RepoError, RepoResult, Repository, RowAdapter, Updatable,
};

pub use hilo_core::memory;

pub mod allocator;
pub mod error;
pub mod service;
pub mod user;

pub use allocator::{AllocError, AllocatorConfig, BlockSnapshot, HiLoAllocator};
pub use error::ServiceError;
pub use service::UserService;
pub use user::{User, ValidationError, USERS_BLOCK};

// Backend stores re-exported under a neutral namespace, so end-users don't
// have to depend on backend crates directly. These are feature-gated.
pub mod backends {
    #[cfg(feature = "libsql-backend")]
    pub use crate::user::UserRowAdapter;
    #[cfg(feature = "libsql-backend")]
    pub use hilo_libsql::{migrations, LibsqlCounterStore, LibsqlRepository};

    /// Repository of users in a libsql database.
    #[cfg(feature = "libsql-backend")]
    pub type LibsqlUserRepository = LibsqlRepository<crate::User, UserRowAdapter>;
}
