//! Change-Set / Edit-Session Lifecycle
//!
//! Opening, saving, applying and canceling branches. Each operation is one
//! atomic store transaction followed by its event.

mod errors;
mod manager;
mod state;

pub use errors::{LifecycleError, LifecycleResult};
pub use manager::LifecycleManager;
pub use state::{change_set_transition, edit_session_transition, ChangeSetAction, EditSessionAction};
