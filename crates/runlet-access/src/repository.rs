//! The repository query contract.
//!
//! Persistence of function, subscription, and collection records is an
//! external collaborator's concern; the engine consumes it through this
//! single query primitive.

use thiserror::Error;

use crate::model::FunctionRecord;
use crate::resolver::{AccessQuery, AccessTier};

/// Errors from repository implementations.
#[derive(Debug, Error)]
pub enum RepoError {
    /// The backing store rejected or failed the query.
    #[error("repository query failed: {0}")]
    Query(String),

    /// An internal error (catch-all for unexpected failures).
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// A store of function records queryable by OR-ed access-tier branches.
///
/// Implementations must execute the whole [`AccessQuery`] as one lookup
/// (never one query per branch) and must evaluate the branches in the
/// order given, reporting the tier of the first branch the record
/// satisfies. Branch predicates:
///
/// - [`AccessTier::Owner`]: identifier matches and the function's owner is
///   the caller.
/// - [`AccessTier::Subscriber`]: identifier matches, the function is
///   published and not private, and the caller is a direct subscriber.
/// - [`AccessTier::SubscribedCollection`]: identifier matches, the
///   function is published and not private, and it belongs to at least one
///   collection the caller subscribes to.
#[async_trait::async_trait]
pub trait FunctionRepository: Send + Sync {
    /// Find the single function the caller can access under the query, with
    /// argument specs and tags eagerly attached.
    ///
    /// Returns `None` when no branch matches.
    async fn find_accessible(
        &self,
        caller_user_id: &str,
        query: &AccessQuery,
    ) -> Result<Option<(FunctionRecord, AccessTier)>, RepoError>;
}
