//! Multi-tier access resolution.
//!
//! Decides, per invocation, which of three trust tiers a caller occupies
//! for a given function — owner, direct subscriber, or member of a
//! subscribed collection — and returns the function record needed for
//! execution. Exactly one repository query runs per resolution: the
//! applicable tier predicates are OR-ed into a single [`AccessQuery`].

use runlet_error::EngineError;
use uuid::Uuid;

use crate::model::FunctionRecord;
use crate::repository::FunctionRepository;

/// The access tier under which a caller may read or execute a function.
///
/// When a function is reachable through more than one tier, the first
/// satisfied tier in the fixed precedence order
/// owner > subscriber > subscribedCollection is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessTier {
    /// The caller owns the function. Private and unpublished functions are
    /// reachable only through this tier.
    Owner,
    /// The caller directly subscribes to a published, non-private function.
    Subscriber,
    /// The function belongs to at least one collection the caller holds a
    /// collection-level subscription for; published and non-private only.
    SubscribedCollection,
}

impl AccessTier {
    /// All tiers, in precedence order.
    pub const ALL: [AccessTier; 3] = [
        AccessTier::Owner,
        AccessTier::Subscriber,
        AccessTier::SubscribedCollection,
    ];
}

/// A function reference as supplied by the caller: either an opaque unique
/// id or a human slug, detected by format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionIdent {
    /// A well-formed UUID.
    Id(Uuid),
    /// Anything that is not a UUID.
    Slug(String),
}

impl FunctionIdent {
    /// Classify a raw identifier string.
    pub fn classify(raw: &str) -> Self {
        match Uuid::parse_str(raw) {
            Ok(id) => FunctionIdent::Id(id),
            Err(_) => FunctionIdent::Slug(raw.to_string()),
        }
    }

    /// Whether `record` is the function this identifier names.
    pub fn matches(&self, record: &FunctionRecord) -> bool {
        match self {
            FunctionIdent::Id(id) => record.id == *id,
            FunctionIdent::Slug(slug) => record.slug == *slug,
        }
    }
}

/// The single query handed to the repository: an identifier plus the
/// OR-ed tier branches, in precedence order.
///
/// The repository must evaluate branches in the given order and report the
/// tier of the first branch the matched record satisfies.
#[derive(Debug, Clone)]
pub struct AccessQuery {
    /// The classified function reference.
    pub ident: FunctionIdent,
    /// Tier branches to OR together, already in precedence order.
    pub branches: Vec<AccessTier>,
}

/// A resolved, ephemeral access grant.
///
/// Computed fresh per request and never cached beyond it — the secrets
/// injected downstream may rotate between requests.
#[derive(Debug, Clone)]
pub struct AccessGrant {
    /// The tier that granted access.
    pub tier: AccessTier,
    /// The resolved function record, with arguments and tags attached.
    pub function: FunctionRecord,
}

/// Resolve the function a caller may execute, under the allowed tiers.
///
/// Composes one [`AccessQuery`] from the tiers in `allowed` (re-ordered
/// into precedence order regardless of input order) and runs it through
/// the repository. Returns [`EngineError::NotFound`] when no branch
/// matches — deliberately not a "forbidden" error, so the existence of
/// private functions does not leak to non-owners.
pub async fn resolve(
    repo: &dyn FunctionRepository,
    caller_user_id: &str,
    function_id_or_slug: &str,
    allowed: &[AccessTier],
) -> Result<AccessGrant, EngineError> {
    let branches: Vec<AccessTier> = AccessTier::ALL
        .iter()
        .copied()
        .filter(|t| allowed.contains(t))
        .collect();

    if branches.is_empty() {
        return Err(EngineError::NotFound);
    }

    let query = AccessQuery {
        ident: FunctionIdent::classify(function_id_or_slug),
        branches,
    };

    tracing::debug!(
        caller = %caller_user_id,
        ident = ?query.ident,
        branches = query.branches.len(),
        "resolving function access"
    );

    let found = repo
        .find_accessible(caller_user_id, &query)
        .await
        .map_err(|e| EngineError::Internal(e.into()))?;

    match found {
        Some((function, tier)) => {
            tracing::debug!(function_id = %function.id, tier = ?tier, "access resolved");
            Ok(AccessGrant { tier, function })
        }
        None => Err(EngineError::NotFound),
    }
}
