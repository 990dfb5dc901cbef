//! In-process coordination service.
//!
//! [`MemoryNamespace`] holds the node tree, the per-session one-shot watch
//! tables and the session registry behind a single `parking_lot::Mutex`, so
//! every mutation and the notifications it fires are totally ordered.
//! [`MemorySession`] is the per-connection handle implementing
//! [`CoordinationClient`](super::CoordinationClient).

mod namespace;
mod session;

pub use namespace::*;
pub use session::*;
