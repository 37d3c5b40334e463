// Not every test binary uses every helper
#![allow(dead_code)]

use std::path::PathBuf;

use k8s_plugin::connector::ClusterConnector;
use k8s_plugin_mock::MockKubernetes;
use tempfile::TempDir;

pub const INSTANCE_ID: &str = "instance-1";
pub const LABEL_KEY: &str = "k8splugin.io/rb-instance-id";

/// A running mock API server plus a directory to write manifests to.
pub struct TestCluster {
    pub mock: MockKubernetes,
    pub connector: ClusterConnector,
    manifests: TempDir,
}

impl TestCluster {
    pub async fn start() -> Self {
        Self::start_as(INSTANCE_ID).await
    }

    pub async fn start_as(instance_id: &str) -> Self {
        let mock = MockKubernetes::start().await;
        let connector = ClusterConnector::new(mock.client().unwrap(), instance_id);

        Self {
            mock,
            connector,
            manifests: tempfile::tempdir().unwrap(),
        }
    }

    /// Connects another instance to the same server.
    pub fn connector_for(&self, instance_id: &str) -> ClusterConnector {
        ClusterConnector::new(self.mock.client().unwrap(), instance_id)
    }

    pub fn manifest(&self, file_name: &str, contents: &str) -> PathBuf {
        let path = self.manifests.path().join(file_name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    pub fn service(&self, namespace: &str, name: &str) -> serde_json::Value {
        self.mock
            .object("v1", "Service", namespace, name)
            .unwrap_or_else(|| panic!("Service {namespace}/{name} should exist"))
    }
}
