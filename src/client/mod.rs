//! Boundary to the remote coordination service.
//!
//! The mirror engine consumes the service exclusively through
//! [`CoordinationClient`] plus a per-session stream of [`Notification`]s.
//! Watches are one-shot: a notification is delivered once, after which the
//! watch must be registered again by the next read that asks for it.
//!
//! [`MemoryNamespace`] is an in-process implementation of the same contract,
//! used by the engine's tests and available to embedders for theirs.
//!
//! # Basic Usage
//! ```ignore
//! use znode_mirror::{CoordinationClient, CreateMode, MemoryNamespace};
//!
//! let namespace = MemoryNamespace::new();
//! let (session, _notifications) = namespace.connect();
//!
//! let realized = session.create("/jobs/job-", b"", CreateMode::PersistentSequential).await?;
//! assert_eq!(realized, "/jobs/job-0000000000");
//! ```

mod mem;
mod types;

pub use mem::*;
pub use types::*;

#[cfg(test)]
use mockall::automock;

use async_trait::async_trait;
use bytes::Bytes;

use crate::RemoteError;

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CoordinationClient: Send + Sync + 'static {
    /// Identifier of the session backing this client; owner id of its
    /// ephemeral nodes
    fn session_id(&self) -> i64;

    /// Existence check. With `watch`, arms a one-shot watch that fires on
    /// creation, data change or deletion of `path`.
    async fn exists(
        &self,
        path: &str,
        watch: bool,
    ) -> RemoteResult<Option<Stat>>;

    /// Lists child segment names in lexicographic order. With `watch`, arms a
    /// one-shot watch that fires when a child is added or removed, or when
    /// `path` itself is deleted.
    ///
    /// # Errors
    /// - [`RemoteError::NoNode`] if `path` does not exist (no watch is armed)
    async fn get_children(
        &self,
        path: &str,
        watch: bool,
    ) -> RemoteResult<Vec<String>>;

    /// Reads payload and stat. With `watch`, arms a one-shot data watch.
    ///
    /// # Errors
    /// - [`RemoteError::NoNode`] if `path` does not exist (no watch is armed)
    async fn get_data(
        &self,
        path: &str,
        watch: bool,
    ) -> RemoteResult<(Bytes, Stat)>;

    /// Creates a node and returns its realized path, which differs from
    /// `path` for sequential modes.
    ///
    /// # Errors
    /// - [`RemoteError::NodeExists`] for a non-sequential path already present
    /// - [`RemoteError::NoNode`] if the parent is missing
    /// - [`RemoteError::NoChildrenForEphemerals`] if the parent is ephemeral
    async fn create(
        &self,
        path: &str,
        data: &[u8],
        mode: CreateMode,
    ) -> RemoteResult<String>;

    /// Conditional write; `version == -1` matches any version.
    ///
    /// # Errors
    /// - [`RemoteError::BadVersion`] if `version` does not match
    async fn set_data(
        &self,
        path: &str,
        data: &[u8],
        version: i32,
    ) -> RemoteResult<Stat>;

    /// Deletes a childless node; `None` matches any version.
    ///
    /// # Errors
    /// - [`RemoteError::NotEmpty`] if the node still has children
    async fn delete(
        &self,
        path: &str,
        version: Option<i32>,
    ) -> RemoteResult<()>;
}
