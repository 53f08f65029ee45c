//! Lazy relation loader behavior through the full runtime stack.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use quarry_client::memory::{record, MemoryClient};
use quarry_orm::prelude::*;
use quarry_orm::testing::{blog_manager, blog_registrations, seeded_client};
use serde_json::json;

#[tokio::test]
async fn accessor_state_reflects_loading() {
    let (manager, _client) = blog_manager();

    let users = manager.repository("User").unwrap();
    let user = users.find_one(FindOneOptions::by_id("1")).await.unwrap();

    assert!(!user.relation("posts").unwrap().is_loaded());
    user.load_many("posts").await.unwrap();
    assert!(user.relation("posts").unwrap().is_loaded());
}

#[tokio::test]
async fn loader_state_is_per_instance() {
    let (manager, client) = blog_manager();

    let users = manager.repository("User").unwrap();
    let first = users.find_one(FindOneOptions::by_id("1")).await.unwrap();
    let second = users.find_one(FindOneOptions::by_id("2")).await.unwrap();

    first.load_many("posts").await.unwrap();

    // resolving one instance's relation leaves the other untouched
    assert!(first.relation("posts").unwrap().is_loaded());
    assert!(!second.relation("posts").unwrap().is_loaded());
    assert_eq!(client.calls(), 3);
}

#[tokio::test]
async fn relation_lookup_errors() {
    let (manager, _client) = blog_manager();

    let users = manager.repository("User").unwrap();
    let user = users.find_one(FindOneOptions::by_id("1")).await.unwrap();

    assert!(matches!(
        user.relation("firstName"),
        Err(OrmError::NotARelation { field, .. }) if field == "firstName"
    ));
    assert!(matches!(
        user.relation("nope"),
        Err(OrmError::UnknownField { field, .. }) if field == "nope"
    ));
}

#[tokio::test]
async fn arity_mismatches_are_rejected() {
    let (manager, _client) = blog_manager();

    let user = manager
        .repository("User")
        .unwrap()
        .find_one(FindOneOptions::by_id("1"))
        .await
        .unwrap();
    let post = manager
        .repository("Post")
        .unwrap()
        .find_one(FindOneOptions::by_id("1"))
        .await
        .unwrap();

    assert!(matches!(
        user.load_one("posts").await,
        Err(OrmError::ExpectedSingular { field, .. }) if field == "posts"
    ));
    assert!(matches!(
        post.load_many("author").await,
        Err(OrmError::ExpectedList { field, .. }) if field == "author"
    ));
}

#[tokio::test]
async fn record_without_foreign_key_cannot_load() {
    let (manager, _client) = blog_manager();

    let posts = manager.repository("Post").unwrap();
    let orphan = record(json!({ "id": "9", "title": "title_9", "body": "body_9" }));
    let post = posts.record_to_entity(&orphan, None).unwrap();

    // scalars materialized fine; only the relation is unresolvable
    assert_eq!(post.scalar_str("title"), Some("title_9"));
    assert!(matches!(
        post.load_one("author").await,
        Err(OrmError::MissingForeignKey { model, field }) if model == "Post" && field == "author"
    ));
}

/// Client whose list fetches fail a configured number of times before
/// recovering; singles pass through untouched.
struct FlakyClient {
    inner: MemoryClient,
    failures: AtomicUsize,
    attempts: AtomicUsize,
}

impl FlakyClient {
    fn new(inner: MemoryClient, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
        }
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatastoreClient for FlakyClient {
    async fn fetch_one(
        &self,
        model: &str,
        opts: &FindOneOptions,
    ) -> anyhow::Result<Option<Record>> {
        self.inner.fetch_one(model, opts).await
    }

    async fn fetch_many(
        &self,
        model: &str,
        opts: &FindManyOptions,
    ) -> anyhow::Result<Vec<Record>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
        {
            // keep the failure pending long enough for waiters to pile up
            tokio::time::sleep(Duration::from_millis(10)).await;
            bail!("transient datastore outage");
        }

        self.inner.fetch_many(model, opts).await
    }

    fn datamodel(&self) -> Datamodel {
        self.inner.datamodel()
    }
}

#[tokio::test]
async fn failed_relation_load_is_retriable() {
    let client = Arc::new(FlakyClient::new(seeded_client(), 1));
    let manager = EntityManager::new(EntityManagerOptions::new(
        client.clone(),
        blog_registrations(),
    ));

    let users = manager.repository("User").unwrap();
    let user = users.find_one(FindOneOptions::by_id("1")).await.unwrap();

    let failed = user.load_many("posts").await;
    assert!(matches!(failed, Err(OrmError::Client(_))));
    assert!(!user.relation("posts").unwrap().is_loaded());

    // scalar fields remain valid and usable after a relation failure
    assert_eq!(user.scalar_str("firstName"), Some("firstName_1"));

    // the failure was not memoized; the next access starts a fresh fetch
    let posts = user.load_many("posts").await.unwrap();
    assert_eq!(posts.len(), 2);
    assert_eq!(client.attempts(), 2);
}

#[tokio::test]
async fn concurrent_waiters_share_a_failure() {
    let client = Arc::new(FlakyClient::new(seeded_client(), 1));
    let manager = EntityManager::new(EntityManagerOptions::new(
        client.clone(),
        blog_registrations(),
    ));

    let users = manager.repository("User").unwrap();
    let user = users.find_one(FindOneOptions::by_id("1")).await.unwrap();

    let (a, b) = tokio::join!(user.load_many("posts"), user.load_many("posts"));

    // both callers observe the rejection of the single in-flight fetch
    assert!(a.is_err());
    assert!(b.is_err());
    assert_eq!(client.attempts(), 1);

    assert_eq!(user.load_many("posts").await.unwrap().len(), 2);
    assert_eq!(client.attempts(), 2);
}
