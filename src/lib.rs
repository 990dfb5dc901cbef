//! Watch-driven, eventually consistent in-memory mirror of a hierarchical
//! coordination namespace.
//!
//! A [`MirrorEngine`] loads the whole remote tree once, keeps it current by
//! re-arming one-shot watches after every notification, and reports each
//! change to registered [`Listener`]s as an ordered `add`, `update` or `delete`
//! [`Event`]. Mutations are issued against the remote service and come back
//! through the same watch path.

mod client;
mod config;
mod errors;
mod event;
mod mirror;
mod sync;
mod utils;

pub mod constants;
pub mod path;

pub use client::*;
pub use self::config::*;
pub use errors::*;
pub use event::Event;
pub use event::EventType;
pub use event::Listener;
pub use mirror::*;
pub use sync::*;


//-----------------------------------------------------------
// Test utils
