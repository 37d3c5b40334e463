use k8s_openapi::api::core::v1::{Service, ServiceSpec};

use crate::plugin::{ManagedKind, TypedPlugin};

/// Manages `Service` objects.
pub type ServicePlugin = TypedPlugin<Service>;

impl ManagedKind for Service {
    /// The cluster IP is allocated by the API server on creation and is
    /// immutable afterwards, so it is carried over from the existing object.
    fn preserve_server_fields(&mut self, existing: &Self) {
        let Some(existing_spec) = &existing.spec else {
            return;
        };

        let spec = self.spec.get_or_insert_with(ServiceSpec::default);
        spec.cluster_ip.clone_from(&existing_spec.cluster_ip);
        spec.cluster_ips.clone_from(&existing_spec.cluster_ips);
    }
}
