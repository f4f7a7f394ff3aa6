//! Versioned Record Store
//!
//! Append-only, multi-tenant and branch-aware:
//! - Every write is a new immutable row with a fresh `VersionId`
//! - All versions of one entity share a `LogicalId`
//! - Which version a caller sees is decided by `tenancy::VisibilityResolver`
//! - Change sets and edit sessions are recorded next to the rows they scope

mod authority;
mod branch;
mod chain;
pub mod contract;
mod errors;
mod row;
#[allow(clippy::module_inception)]
mod store;
mod txn;

pub use authority::VersionAuthority;
pub use branch::{BranchRegistry, ChangeSet, ChangeSetStatus, EditSession, EditSessionStatus};
pub use chain::VersionChain;
pub use errors::{StoreError, StoreResult};
pub use row::{RequestContext, VersionedRow};
pub use store::{ListOptions, RowListing, Store, StoreSnapshot};
pub use txn::WriteTxn;
