use kube::Client;
use snafu::{ResultExt, Snafu};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to create Kubernetes client from the default configuration"))]
    CreateClient { source: kube::Error },
}

/// Supplies everything a plugin needs to talk to one cluster on behalf of one
/// owning instance.
pub trait KubernetesConnector: Send + Sync {
    /// Returns a client for the cluster. Plugins scope it to a namespace
    /// themselves.
    fn client(&self) -> Client;

    /// Returns the opaque identifier of the owning instance, which is stored as
    /// the value of the ownership label.
    fn instance_id(&self) -> &str;
}

/// A [`KubernetesConnector`] backed by a [`kube::Client`].
#[derive(Clone)]
pub struct ClusterConnector {
    client: Client,
    instance_id: String,
}

impl ClusterConnector {
    pub fn new(client: Client, instance_id: impl Into<String>) -> Self {
        Self {
            client,
            instance_id: instance_id.into(),
        }
    }

    /// Creates a connector using the client configuration inferred from the
    /// environment, i.e. the in-cluster configuration or the local kubeconfig.
    pub async fn try_default(instance_id: impl Into<String>) -> Result<Self, Error> {
        let client = Client::try_default().await.context(CreateClientSnafu)?;
        Ok(Self::new(client, instance_id))
    }
}

impl KubernetesConnector for ClusterConnector {
    fn client(&self) -> Client {
        self.client.clone()
    }

    fn instance_id(&self) -> &str {
        &self.instance_id
    }
}
