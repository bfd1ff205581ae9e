//! Common integration testing utilities and generic tests reusable across backends.
//!
//! A backend crate implements [`RepoFactory`] and [`CounterFactory`] for its
//! stores and runs the `test_*` functions from its own `tests/` directory.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use hilo::{
    AllocatorConfig, AssignId, CasOutcome, CounterStore, HiLoAllocator, ParamValue, RepoError,
    RepoResult, Repository, User, UserService,
};

pub type DynUserRepo = Arc<dyn Repository<User> + Send + Sync>;
pub type DynCounterStore = Arc<dyn CounterStore + Send + Sync>;

#[async_trait]
pub trait RepoFactory {
    /// Construct a clean repository connected to a store with the required schema.
    async fn new_user_repo(&self) -> RepoResult<DynUserRepo>;
}

#[async_trait]
pub trait CounterFactory {
    /// Two independent handles onto one fresh counter table, standing in for
    /// two processes sharing a database.
    async fn new_counter_stores(&self) -> RepoResult<(DynCounterStore, DynCounterStore)>;
}

fn user(id: u64, email: &str, name: &str) -> User {
    let mut u = User::new(email, name);
    u.assign_id(id);
    u
}

/// Generic CRUD roundtrip test.
pub async fn test_crud_roundtrip<F: RepoFactory + Sync>(f: &F) -> RepoResult<()> {
    let repo = f.new_user_repo().await?;

    let created = repo.insert(&user(1000, "a@example.com", "Ada")).await?;
    assert_eq!(created.id, Some(1000));

    let fetched = repo.find_by_id(&1000).await?;
    assert_eq!(fetched.as_ref(), Some(&created));

    let mut updated = created.clone();
    updated.name = "Ada L.".into();
    repo.update(&updated).await?;
    assert_eq!(
        repo.find_by_id(&1000).await?.map(|u| u.name),
        Some("Ada L.".to_string())
    );

    assert!(repo.delete_by_id(&1000).await?);
    assert!(!repo.delete_by_id(&1000).await?);
    assert_eq!(repo.find_by_id(&1000).await?, None);
    Ok(())
}

/// Generic find_by_field test.
pub async fn test_find_by_field<F: RepoFactory + Sync>(f: &F) -> RepoResult<()> {
    let repo = f.new_user_repo().await?;
    repo.insert(&user(1, "b@example.com", "B")).await?;
    repo.insert(&user(2, "c@example.com", "B")).await?;

    let found = repo
        .find_by_field("email", ParamValue::String("b@example.com".into()))
        .await?;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, Some(1));

    let by_name = repo.find_by_field("name", ParamValue::from("B")).await?;
    assert_eq!(by_name.len(), 2);

    let via_finder = hilo::user::find_by_email(&*repo, "c@example.com").await?;
    assert_eq!(via_finder.and_then(|u| u.id), Some(2));
    Ok(())
}

/// Lookups only accept declared findable columns; anything else is refused
/// before it reaches storage, on every backend alike.
pub async fn test_unknown_field_is_rejected<F: RepoFactory + Sync>(f: &F) -> RepoResult<()> {
    let repo = f.new_user_repo().await?;
    repo.insert(&user(3, "g@example.com", "G")).await?;
    for field in ["email = email OR email", "id", "nickname", ""] {
        match repo.find_by_field(field, ParamValue::from("nobody")).await {
            Err(RepoError::UnknownField { field: got }) => assert_eq!(got, field),
            other => panic!("lookup on {field:?} was not refused: {other:?}"),
        }
    }
    Ok(())
}

/// Inserting a taken id is a conflict; updating a missing row is not found.
pub async fn test_key_violations<F: RepoFactory + Sync>(f: &F) -> RepoResult<()> {
    let repo = f.new_user_repo().await?;
    repo.insert(&user(5, "d@example.com", "D")).await?;
    assert!(matches!(
        repo.insert(&user(5, "e@example.com", "E")).await,
        Err(RepoError::Conflict)
    ));
    assert!(matches!(
        repo.update(&user(6, "f@example.com", "F")).await,
        Err(RepoError::NotFound)
    ));
    Ok(())
}

/// Counter rows: insert never overwrites, swaps apply only to the expected value.
pub async fn test_counter_cas<F: CounterFactory + Sync>(f: &F) -> RepoResult<()> {
    let (a, b) = f.new_counter_stores().await?;
    assert_eq!(a.load("users").await?, None);
    assert_eq!(a.insert_if_absent("users", 1).await?, CasOutcome::Swapped);
    assert_eq!(b.insert_if_absent("users", 1).await?, CasOutcome::Conflict);
    assert_eq!(b.compare_and_swap("users", 1, 2).await?, CasOutcome::Swapped);
    assert_eq!(a.compare_and_swap("users", 1, 2).await?, CasOutcome::Conflict);
    assert_eq!(a.load("users").await?, Some(2));
    assert_eq!(a.load("orders").await?, None);
    Ok(())
}

/// Two allocators sharing one counter table never issue the same id.
pub async fn test_shared_allocators<F: CounterFactory + Sync>(f: &F) -> RepoResult<()> {
    let (a, b) = f.new_counter_stores().await?;
    let config = AllocatorConfig::default().with_max_low(10);
    let a = HiLoAllocator::new(a, config.clone()).map_err(RepoError::backend)?;
    let b = HiLoAllocator::new(b, config).map_err(RepoError::backend)?;

    let mut seen = HashSet::new();
    for _ in 0..25 {
        for alloc in [&a, &b] {
            let id = alloc
                .next_id("users")
                .await
                .map_err(RepoError::backend)?;
            assert!(id > 0);
            assert!(seen.insert(id), "id {id} issued twice");
        }
    }
    Ok(())
}

/// create -> get-by-email -> delete -> not found, through the service.
pub async fn test_user_lifecycle<F>(f: &F) -> RepoResult<()>
where
    F: RepoFactory + CounterFactory + Sync,
{
    let repo = f.new_user_repo().await?;
    let (counters, _) = f.new_counter_stores().await?;
    let alloc = HiLoAllocator::new(counters, AllocatorConfig::default())
        .map_err(RepoError::backend)?;
    let svc = UserService::new(repo, Arc::new(alloc));

    let id = svc
        .create("a@x.com", "A")
        .await
        .map_err(RepoError::backend)?;
    assert_eq!(svc.get_by_email("a@x.com").await.ok(), Some(id));
    let stored = svc.get(id).await.map_err(RepoError::backend)?;
    assert_eq!((stored.email.as_str(), stored.name.as_str()), ("a@x.com", "A"));

    svc.delete(id).await.map_err(RepoError::backend)?;
    let err = svc.get_by_email("a@x.com").await.unwrap_err();
    assert!(err.is_not_found());
    Ok(())
}
