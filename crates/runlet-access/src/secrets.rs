//! The secrets contract consumed by the context builder.
//!
//! Values crossing this boundary are already decrypted; encryption at rest
//! belongs to the external store. Everything here is live credential
//! material — callers must never persist or log it verbatim.

use serde::{Deserialize, Serialize};

use crate::repository::RepoError;

/// The safe echo-subset of one stored external-service credential.
///
/// This is deliberately not the full stored record: refresh tokens,
/// client secrets, and store bookkeeping never cross this boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCredential {
    /// Service name, e.g. `google-oauth`. Drives the variable prefix.
    pub service: String,
    /// Whether this is the owner's default credential for the service.
    pub is_default: bool,
    /// Bearer/access token.
    pub access_token: String,
    /// Optional id token.
    #[serde(default)]
    pub id_token: Option<String>,
    /// Primary email address on the credential.
    #[serde(default)]
    pub primary_email: Option<String>,
    /// Granted scope string.
    #[serde(default)]
    pub scope: Option<String>,
    /// Token type, e.g. `Bearer`.
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Static profile data injected into every invocation context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// The owner's public user name.
    #[serde(default)]
    pub user_name: Option<String>,
    /// IANA time zone; the context builder defaults unset zones to
    /// `America/New_York`.
    #[serde(default)]
    pub time_zone: Option<String>,
}

/// Everything the context builder needs about one owner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerSecrets {
    /// External-service credentials, reduced to their echo subsets.
    pub credentials: Vec<ServiceCredential>,
    /// Profile data.
    pub profile: Profile,
    /// Free-form key/value variables, flattened into `userVars` verbatim.
    pub variables: Vec<(String, String)>,
}

/// Provider of per-owner secrets, fetched by owner id.
#[async_trait::async_trait]
pub trait SecretsProvider: Send + Sync {
    /// Fetch the owner's credential list, profile, and variables.
    async fn owner_secrets(&self, owner_user_id: &str) -> Result<OwnerSecrets, RepoError>;
}
