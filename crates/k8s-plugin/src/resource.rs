use k8s_openapi::Resource;
use kube::core::GroupVersionKind;
use serde::{Deserialize, Serialize};

/// Identifies a Kubernetes object by group, version, kind and name, without
/// carrying any spec or status.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct KubernetesResource {
    #[serde(rename = "GVK")]
    pub gvk: GroupVersionKind,
    pub name: String,
}

impl KubernetesResource {
    pub fn new(gvk: GroupVersionKind, name: impl Into<String>) -> Self {
        Self {
            gvk,
            name: name.into(),
        }
    }

    /// Builds a descriptor for an object of the statically known kind `K`.
    pub fn of<K>(name: impl Into<String>) -> Self
    where
        K: Resource,
    {
        Self::new(gvk_of::<K>(), name)
    }
}

/// Returns the [`GroupVersionKind`] of `K`.
pub fn gvk_of<K>() -> GroupVersionKind
where
    K: Resource,
{
    GroupVersionKind::gvk(K::GROUP, K::VERSION, K::KIND)
}
