//! Ownership labels mark a Kubernetes object as managed by one logical
//! instance of the orchestration service.
//!
//! The label key is configured per deployment (see
//! [`PluginOptions`](crate::config::PluginOptions)), the value is the instance
//! identifier provided by the [`KubernetesConnector`](crate::connector::KubernetesConnector).
//! Owners use the label to find their objects again, e.g. to reconcile or to
//! garbage-collect them.
use std::fmt::{self, Display};

use kube::{Resource, ResourceExt};

/// The label key used when none is configured.
pub const DEFAULT_LABEL_NAME: &str = "k8splugin.io/rb-instance-id";

/// A single ownership label, consisting of the configured label key and the
/// identifier of the owning instance.
///
/// ```
/// # use k8s_plugin::ownership::OwnershipLabel;
/// let label = OwnershipLabel::new("k8splugin.io/rb-instance-id", "instance-1");
/// assert_eq!(label.to_string(), "k8splugin.io/rb-instance-id=instance-1");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnershipLabel {
    pub key: String,
    pub value: String,
}

impl OwnershipLabel {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Inserts this label into the labels of `resource`. See [`apply_ownership`].
    pub fn apply<K>(&self, resource: &mut K)
    where
        K: Resource,
    {
        apply_ownership(resource, &self.value, &self.key);
    }

    /// Returns an equality-based label selector matching all objects owned by
    /// this instance.
    pub fn selector(&self) -> String {
        self.to_string()
    }
}

impl Display for OwnershipLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{key}={value}", key = self.key, value = self.value)
    }
}

/// Sets `labels[label_key] = instance_id` on `resource`.
///
/// A missing label map is initialized first. An existing value under
/// `label_key` is overwritten, all other labels are kept as they are.
pub fn apply_ownership<K>(resource: &mut K, instance_id: &str, label_key: &str)
where
    K: Resource,
{
    resource
        .labels_mut()
        .insert(label_key.to_owned(), instance_id.to_owned());
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::{api::core::v1::Service, apimachinery::pkg::apis::meta::v1::ObjectMeta};

    use super::*;

    fn service(labels: Option<BTreeMap<String, String>>) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some("web".to_owned()),
                labels,
                ..ObjectMeta::default()
            },
            ..Service::default()
        }
    }

    #[test]
    fn initializes_missing_labels() {
        let mut service = service(None);

        apply_ownership(&mut service, "instance-1", DEFAULT_LABEL_NAME);

        assert_eq!(
            service.metadata.labels,
            Some(BTreeMap::from([(
                DEFAULT_LABEL_NAME.to_owned(),
                "instance-1".to_owned()
            )]))
        );
    }

    #[test]
    fn preserves_other_labels() {
        let mut service = service(Some(BTreeMap::from([
            ("app".to_owned(), "web".to_owned()),
            ("tier".to_owned(), "frontend".to_owned()),
        ])));

        apply_ownership(&mut service, "instance-1", DEFAULT_LABEL_NAME);

        let labels = service.labels();
        assert_eq!(labels.len(), 3);
        assert_eq!(labels["app"], "web");
        assert_eq!(labels["tier"], "frontend");
        assert_eq!(labels[DEFAULT_LABEL_NAME], "instance-1");
    }

    #[test]
    fn last_instance_wins() {
        let mut service = service(Some(BTreeMap::from([(
            "owner".to_owned(),
            "someone-else".to_owned(),
        )])));

        apply_ownership(&mut service, "instance-1", "owner");
        apply_ownership(&mut service, "instance-2", "owner");

        assert_eq!(
            service.labels(),
            &BTreeMap::from([("owner".to_owned(), "instance-2".to_owned())])
        );
    }

    #[test]
    fn label_apply_and_selector() {
        let label = OwnershipLabel::new("example.com/owner", "abc");
        let mut service = service(None);

        label.apply(&mut service);

        assert_eq!(service.labels()["example.com/owner"], "abc");
        assert_eq!(label.selector(), "example.com/owner=abc");
    }
}
