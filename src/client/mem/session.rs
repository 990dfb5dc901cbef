use async_trait::async_trait;
use bytes::Bytes;

use super::MemoryNamespace;
use crate::client::CoordinationClient;
use crate::client::CreateMode;
use crate::client::RemoteResult;
use crate::client::Stat;

/// Client handle bound to one session of a [`MemoryNamespace`]
#[derive(Debug, Clone)]
pub struct MemorySession {
    id: i64,
    namespace: MemoryNamespace,
}

impl MemorySession {
    pub(super) fn new(
        id: i64,
        namespace: MemoryNamespace,
    ) -> Self {
        Self { id, namespace }
    }

    pub fn namespace(&self) -> &MemoryNamespace {
        &self.namespace
    }
}

#[async_trait]
impl CoordinationClient for MemorySession {
    fn session_id(&self) -> i64 {
        self.id
    }

    async fn exists(
        &self,
        path: &str,
        watch: bool,
    ) -> RemoteResult<Option<Stat>> {
        self.namespace.with_session(self.id, |s| s.exists(self.id, path, watch))
    }

    async fn get_children(
        &self,
        path: &str,
        watch: bool,
    ) -> RemoteResult<Vec<String>> {
        self.namespace.with_session(self.id, |s| s.get_children(self.id, path, watch))
    }

    async fn get_data(
        &self,
        path: &str,
        watch: bool,
    ) -> RemoteResult<(Bytes, Stat)> {
        self.namespace.with_session(self.id, |s| s.get_data(self.id, path, watch))
    }

    async fn create(
        &self,
        path: &str,
        data: &[u8],
        mode: CreateMode,
    ) -> RemoteResult<String> {
        self.namespace.with_session(self.id, |s| s.create_node(path, data, mode, self.id))
    }

    async fn set_data(
        &self,
        path: &str,
        data: &[u8],
        version: i32,
    ) -> RemoteResult<Stat> {
        self.namespace.with_session(self.id, |s| s.set_data(path, data, version))
    }

    async fn delete(
        &self,
        path: &str,
        version: Option<i32>,
    ) -> RemoteResult<()> {
        self.namespace.with_session(self.id, |s| s.delete_node(path, version))
    }
}
