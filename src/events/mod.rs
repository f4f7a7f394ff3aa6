//! Event Emitter
//!
//! Every state transition the core performs is published here, after the
//! transition has committed. Each `(tenant, change set)` scope gets its own
//! bounded ordered channel; a ring-buffer log supports replay.

mod emitter;
mod errors;
mod event;
mod log;

pub use emitter::{EventEmitter, EventReceiver, EventsConfig};
pub use errors::{EventError, EventResult};
pub use event::{Event, EventLevel, EventPayload, EventScope};
pub use log::EventLog;
