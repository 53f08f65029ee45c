//! Test fixtures for the entity runtime.
//!
//! Provides a small blog datamodel (users with posts), a seeded in-memory
//! datastore client, and ready-made registrations, so integration tests can
//! focus on runtime behavior instead of setup.
//!
//! # Example
//! ```ignore
//! use quarry_orm::testing::blog_manager;
//!
//! #[tokio::test]
//! async fn my_test() {
//!     let (manager, client) = blog_manager();
//!     let users = manager.repository("User").unwrap();
//!
//!     // ... run your test, asserting round trips via client.calls() ...
//! }
//! ```

use std::ops::Deref;
use std::sync::Arc;

use quarry_client::memory::{record, MemoryClient};
use quarry_client::{FindManyOptions, Select};
use quarry_model::{Datamodel, ModelMetadata, ScalarType};
use serde_json::json;

use crate::entity::{Entity, EntityClass};
use crate::error::OrmResult;
use crate::manager::{EntityManager, EntityManagerOptions, EntityRegistrations};
use crate::repository::{CustomRepository, Repository};

/// Install a test log subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// `User` (id, firstName, lastName, posts → [Post]) and
/// `Post` (id, title, body, author → User).
pub fn blog_datamodel() -> Datamodel {
    Datamodel::new(vec![
        ModelMetadata::new("User")
            .with_scalar("id", ScalarType::Id)
            .with_scalar("firstName", ScalarType::String)
            .with_scalar("lastName", ScalarType::String)
            .with_relation("posts", "Post", true),
        ModelMetadata::new("Post")
            .with_scalar("id", ScalarType::Id)
            .with_scalar("title", ScalarType::String)
            .with_scalar("body", ScalarType::String)
            .with_relation("author", "User", false),
    ])
    .expect("blog datamodel is well-formed")
}

/// In-memory client seeded with three users and five posts.
pub fn seeded_client() -> MemoryClient {
    MemoryClient::new(blog_datamodel())
        .with_records(
            "User",
            (1..=3)
                .map(|i| {
                    record(json!({
                        "id": i.to_string(),
                        "firstName": format!("firstName_{i}"),
                        "lastName": format!("lastName_{i}"),
                    }))
                })
                .collect(),
        )
        .with_records(
            "Post",
            [(1, "1"), (2, "1"), (3, "2"), (4, "2"), (5, "3")]
                .into_iter()
                .map(|(i, author)| {
                    record(json!({
                        "id": i.to_string(),
                        "title": format!("title_{i}"),
                        "body": format!("body_{i}"),
                        "author_id": author,
                    }))
                })
                .collect(),
        )
}

/// Base registrations for the blog datamodel.
pub fn blog_registrations() -> EntityRegistrations {
    EntityRegistrations::new()
        .base(EntityClass::new("User").shared())
        .base(EntityClass::new("Post").shared())
}

/// An entity manager over a freshly seeded client, plus the client handle for
/// asserting fetch counts.
pub fn blog_manager() -> (EntityManager, Arc<MemoryClient>) {
    blog_manager_with(EntityManagerOptions::new)
}

/// Like [`blog_manager`], but lets the caller adjust the manager options
/// (swap the cache, add custom registrations) before construction.
pub fn blog_manager_with(
    configure: impl FnOnce(Arc<dyn quarry_client::DatastoreClient>, EntityRegistrations) -> EntityManagerOptions,
) -> (EntityManager, Arc<MemoryClient>) {
    let client = Arc::new(seeded_client());
    let options = configure(client.clone(), blog_registrations());

    (EntityManager::new(options), client)
}

/// A custom `User` class layering a derived `fullName` field over the base.
pub fn full_name_user_class() -> Arc<EntityClass> {
    EntityClass::new("User")
        .with_derived("fullName", |user: &Entity| {
            let first = user.scalar_str("firstName").unwrap_or_default();
            let last = user.scalar_str("lastName").unwrap_or_default();
            json!(format!("{first} {last}"))
        })
        .shared()
}

/// Example custom repository over the `User` model.
pub struct UserRepository {
    repository: Repository,
}

impl CustomRepository for UserRepository {
    fn model_name() -> &'static str {
        "User"
    }

    fn from_repository(repository: Repository) -> Self {
        Self { repository }
    }
}

impl Deref for UserRepository {
    type Target = Repository;

    fn deref(&self) -> &Repository {
        &self.repository
    }
}

impl UserRepository {
    /// All users with their posts eagerly inlined.
    pub async fn find_users_with_posts(&self) -> OrmResult<Vec<Entity>> {
        self.find_many(FindManyOptions::new().with_select(Select::new().field("posts")))
            .await
    }
}
