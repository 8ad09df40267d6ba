//! In-memory repository and secrets provider.
//!
//! Backs the test suites and the local CLI runner. Evaluates the same
//! branch predicates a SQL-backed store would express as one OR query.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::model::FunctionRecord;
use crate::repository::{FunctionRepository, RepoError};
use crate::resolver::{AccessQuery, AccessTier};
use crate::secrets::{OwnerSecrets, SecretsProvider};

/// An in-memory function store with subscriptions and collections.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    functions: Vec<FunctionRecord>,
    /// (user id, function id) direct subscriptions.
    subscriptions: HashSet<(String, Uuid)>,
    /// Collection id -> member function ids.
    collections: HashMap<Uuid, HashSet<Uuid>>,
    /// (user id, collection id) collection-level subscriptions.
    collection_subscriptions: HashSet<(String, Uuid)>,
}

impl MemoryRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a function record.
    pub fn add_function(&mut self, record: FunctionRecord) -> &mut Self {
        self.functions.push(record);
        self
    }

    /// Subscribe a user directly to a function.
    pub fn subscribe(&mut self, user_id: &str, function_id: Uuid) -> &mut Self {
        self.subscriptions.insert((user_id.to_string(), function_id));
        self
    }

    /// Create a collection containing the given functions.
    pub fn add_collection(&mut self, collection_id: Uuid, function_ids: &[Uuid]) -> &mut Self {
        self.collections
            .entry(collection_id)
            .or_default()
            .extend(function_ids.iter().copied());
        self
    }

    /// Subscribe a user to a collection.
    pub fn subscribe_collection(&mut self, user_id: &str, collection_id: Uuid) -> &mut Self {
        self.collection_subscriptions
            .insert((user_id.to_string(), collection_id));
        self
    }

    fn branch_matches(&self, caller: &str, record: &FunctionRecord, tier: AccessTier) -> bool {
        match tier {
            AccessTier::Owner => record.owner_user_id == caller,
            AccessTier::Subscriber => {
                record.is_published
                    && !record.is_private
                    && self
                        .subscriptions
                        .contains(&(caller.to_string(), record.id))
            }
            AccessTier::SubscribedCollection => {
                record.is_published
                    && !record.is_private
                    && self.collections.iter().any(|(collection_id, members)| {
                        members.contains(&record.id)
                            && self
                                .collection_subscriptions
                                .contains(&(caller.to_string(), *collection_id))
                    })
            }
        }
    }
}

#[async_trait::async_trait]
impl FunctionRepository for MemoryRepository {
    async fn find_accessible(
        &self,
        caller_user_id: &str,
        query: &AccessQuery,
    ) -> Result<Option<(FunctionRecord, AccessTier)>, RepoError> {
        // The identifier names at most one function per owner, so the scan
        // order cannot produce ties; branch order decides the tier.
        for record in self.functions.iter().filter(|r| query.ident.matches(r)) {
            for &tier in &query.branches {
                if self.branch_matches(caller_user_id, record, tier) {
                    return Ok(Some((record.clone(), tier)));
                }
            }
        }
        Ok(None)
    }
}

/// An in-memory secrets provider: one [`OwnerSecrets`] per owner id.
#[derive(Debug, Default)]
pub struct MemorySecrets {
    owners: HashMap<String, OwnerSecrets>,
}

impl MemorySecrets {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register secrets for an owner.
    pub fn insert(&mut self, owner_user_id: &str, secrets: OwnerSecrets) -> &mut Self {
        self.owners.insert(owner_user_id.to_string(), secrets);
        self
    }
}

#[async_trait::async_trait]
impl SecretsProvider for MemorySecrets {
    async fn owner_secrets(&self, owner_user_id: &str) -> Result<OwnerSecrets, RepoError> {
        Ok(self.owners.get(owner_user_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{resolve, AccessTier};

    fn function(owner: &str, slug: &str, private: bool, published: bool) -> FunctionRecord {
        FunctionRecord {
            id: Uuid::new_v4(),
            slug: slug.into(),
            owner_user_id: owner.into(),
            code: "async function handler(ctx) { return 1; }".into(),
            is_private: private,
            is_published: published,
            arguments: vec![],
            tags: vec![],
        }
    }

    #[tokio::test]
    async fn owner_resolves_private_function_by_id() {
        let f = function("user-a", "secret-fn", true, false);
        let id = f.id;
        let mut repo = MemoryRepository::new();
        repo.add_function(f);

        let grant = resolve(&repo, "user-a", &id.to_string(), &AccessTier::ALL)
            .await
            .unwrap();
        assert_eq!(grant.tier, AccessTier::Owner);
        assert_eq!(grant.function.id, id);
    }

    #[tokio::test]
    async fn owner_resolves_by_slug() {
        let f = function("user-a", "my-fn", false, true);
        let mut repo = MemoryRepository::new();
        repo.add_function(f);

        let grant = resolve(&repo, "user-a", "my-fn", &AccessTier::ALL)
            .await
            .unwrap();
        assert_eq!(grant.tier, AccessTier::Owner);
    }

    #[tokio::test]
    async fn private_function_is_not_found_for_non_owner_even_by_exact_id() {
        let f = function("user-a", "secret-fn", true, false);
        let id = f.id;
        let mut repo = MemoryRepository::new();
        repo.add_function(f);
        // B even subscribes — a private function stays invisible.
        repo.subscribe("user-b", id);

        let err = resolve(
            &repo,
            "user-b",
            &id.to_string(),
            &[AccessTier::Subscriber, AccessTier::SubscribedCollection],
        )
        .await
        .unwrap_err();
        // NotFound, not Forbidden: existence must not leak.
        assert_eq!(err.code(), "NOT_FOUND");
        assert_eq!(err.status(), 404);
    }

    #[tokio::test]
    async fn published_function_resolves_for_direct_subscriber() {
        let f = function("user-a", "shared-fn", false, true);
        let id = f.id;
        let mut repo = MemoryRepository::new();
        repo.add_function(f);
        repo.subscribe("user-b", id);

        let grant = resolve(
            &repo,
            "user-b",
            &id.to_string(),
            &[AccessTier::Subscriber, AccessTier::SubscribedCollection],
        )
        .await
        .unwrap();
        assert_eq!(grant.tier, AccessTier::Subscriber);
    }

    #[tokio::test]
    async fn unpublished_function_is_invisible_to_subscribers() {
        let f = function("user-a", "draft-fn", false, false);
        let id = f.id;
        let mut repo = MemoryRepository::new();
        repo.add_function(f);
        repo.subscribe("user-b", id);

        let err = resolve(&repo, "user-b", &id.to_string(), &[AccessTier::Subscriber])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn collection_subscription_grants_access() {
        let f = function("user-a", "collected-fn", false, true);
        let fid = f.id;
        let cid = Uuid::new_v4();
        let mut repo = MemoryRepository::new();
        repo.add_function(f);
        repo.add_collection(cid, &[fid]);
        repo.subscribe_collection("user-b", cid);

        let grant = resolve(&repo, "user-b", "collected-fn", &AccessTier::ALL)
            .await
            .unwrap();
        assert_eq!(grant.tier, AccessTier::SubscribedCollection);
    }

    #[tokio::test]
    async fn owner_tier_wins_over_subscriber() {
        // An owner who also subscribes to their own published function
        // still resolves as owner: precedence is evaluation order.
        let f = function("user-a", "mine", false, true);
        let id = f.id;
        let mut repo = MemoryRepository::new();
        repo.add_function(f);
        repo.subscribe("user-a", id);

        let grant = resolve(&repo, "user-a", &id.to_string(), &AccessTier::ALL)
            .await
            .unwrap();
        assert_eq!(grant.tier, AccessTier::Owner);
    }

    #[tokio::test]
    async fn subscriber_tier_wins_over_collection() {
        let f = function("user-a", "both-paths", false, true);
        let fid = f.id;
        let cid = Uuid::new_v4();
        let mut repo = MemoryRepository::new();
        repo.add_function(f);
        repo.subscribe("user-b", fid);
        repo.add_collection(cid, &[fid]);
        repo.subscribe_collection("user-b", cid);

        let grant = resolve(
            &repo,
            "user-b",
            &fid.to_string(),
            &[AccessTier::Subscriber, AccessTier::SubscribedCollection],
        )
        .await
        .unwrap();
        assert_eq!(grant.tier, AccessTier::Subscriber);
    }

    #[tokio::test]
    async fn empty_allowed_tiers_is_not_found() {
        let f = function("user-a", "fn", false, true);
        let id = f.id;
        let mut repo = MemoryRepository::new();
        repo.add_function(f);

        let err = resolve(&repo, "user-a", &id.to_string(), &[])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn unknown_identifier_is_not_found() {
        let repo = MemoryRepository::new();
        let err = resolve(&repo, "user-a", "no-such-fn", &AccessTier::ALL)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn memory_secrets_returns_empty_for_unknown_owner() {
        let secrets = MemorySecrets::new();
        let owner = secrets.owner_secrets("nobody").await.unwrap();
        assert!(owner.credentials.is_empty());
        assert!(owner.variables.is_empty());
    }
}
