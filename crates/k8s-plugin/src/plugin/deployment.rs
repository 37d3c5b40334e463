use k8s_openapi::api::apps::v1::Deployment;

use crate::plugin::{ManagedKind, TypedPlugin};

/// Manages `Deployment` objects. Unlike the other plugins this one can wait
/// for the objects to become ready.
pub type DeploymentPlugin = TypedPlugin<Deployment>;

impl ManagedKind for Deployment {
    const SUPPORTS_READINESS: bool = true;

    /// A Deployment is ready once its latest generation has been observed and
    /// the updated, ready and available replicas all match the desired count,
    /// with no replicas of older revisions left over.
    fn is_ready(&self) -> bool {
        let Some(status) = &self.status else {
            return false;
        };

        let generation = self.metadata.generation.unwrap_or_default();
        let observed_generation = status.observed_generation.unwrap_or_default();
        // The API server defaults the replica count to 1
        let desired_replicas = self
            .spec
            .as_ref()
            .and_then(|spec| spec.replicas)
            .unwrap_or(1);

        observed_generation >= generation
            && [
                status.replicas,
                status.updated_replicas,
                status.ready_replicas,
                status.available_replicas,
            ]
            .into_iter()
            .all(|replicas| replicas.unwrap_or_default() == desired_replicas)
    }
}
