//! Tenancy & Visibility
//!
//! Pure selection logic over versioned rows:
//! - `Tenancy` / `TenancyContext` - which tenants a row belongs to
//! - `Visibility` / `VisibilityContext` - which branch a row belongs to
//! - `VisibilityResolver` - which version of a logical entity is current
//!
//! Nothing here touches storage. Every query against the store goes through
//! these rules.

mod errors;
mod resolver;
#[allow(clippy::module_inception)]
mod tenancy;
mod visibility;

pub use errors::{TenancyError, TenancyResult};
pub use resolver::{in_tenancy, in_tenancy_and_visible, InertBranches, Versioned, VisibilityResolver};
pub use tenancy::{Tenancy, TenancyContext};
pub use visibility::{BranchLevel, Visibility, VisibilityContext};
