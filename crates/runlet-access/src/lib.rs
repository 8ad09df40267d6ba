#![warn(missing_docs)]

//! # runlet-access
//!
//! Function records, access tiers, and the multi-tier access resolver for
//! the Runlet function engine.
//!
//! A caller may reach a function under exactly one of three trust tiers:
//! as its **owner**, as a direct **subscriber**, or through a
//! **subscribed collection**. Resolution composes the permitted tier
//! predicates into one OR query against the repository and reports the
//! first satisfied tier, in the fixed precedence order
//! owner > subscriber > subscribedCollection.
//!
//! Persistence and the secrets store are external collaborators, consumed
//! through the [`FunctionRepository`] and [`SecretsProvider`] traits; the
//! in-memory implementations here back the tests and the CLI runner.

pub mod memory;
pub mod model;
pub mod repository;
pub mod resolver;
pub mod secrets;

pub use memory::{MemoryRepository, MemorySecrets};
pub use model::{ArgType, ArgumentSpec, FunctionRecord};
pub use repository::{FunctionRepository, RepoError};
pub use resolver::{resolve, AccessGrant, AccessQuery, AccessTier, FunctionIdent};
pub use secrets::{OwnerSecrets, Profile, SecretsProvider, ServiceCredential};
