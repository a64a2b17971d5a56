//! Domain model module declarations.

pub mod event;
pub mod session;

pub use event::{DomainEvent, NodeHighlight, StreamEvent};
pub use session::{SessionState, SessionStatus};
