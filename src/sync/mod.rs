//! Watch-driven synchronization of the local mirror.
//!
//! [`MirrorEngine`] is the public facade. Its `watch()` performs the initial
//! load and then hands the session's notification stream to a dispatcher
//! task, the only writer of the mirror. Listener callbacks run on that task,
//! so every listener observes the same global event order:
//! - a node's `add` precedes the `add` of any of its descendants
//! - a node's `delete` follows the `delete` of all of its descendants
//! - events for one path follow the order the service applied its changes

mod dispatcher;
mod engine;

pub use engine::*;
