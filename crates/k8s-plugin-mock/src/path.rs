use k8s_openapi::{Resource, api::core::v1::Service};
use serde_json::Value;
use snafu::OptionExt;

use crate::{Error, MissingFieldSnafu};

/// The location of a namespaced collection, and optionally of one named object
/// within it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ResourcePath {
    /// E.g. `/api/v1/namespaces/default/services`
    pub collection: String,
    pub namespace: String,
    pub plural: String,
    pub name: Option<String>,
}

impl ResourcePath {
    /// Builds the path for `kind` in `api_version`. The plural is derived by
    /// appending an `s` to the lower-cased kind, which holds for the kinds the
    /// plugins manage.
    pub fn new(api_version: &str, kind: &str, namespace: &str, name: Option<&str>) -> Self {
        let plural = format!("{kind}s", kind = kind.to_lowercase());
        let prefix = if api_version.contains('/') {
            format!("/apis/{api_version}")
        } else {
            format!("/api/{api_version}")
        };

        Self {
            collection: format!("{prefix}/namespaces/{namespace}/{plural}"),
            namespace: namespace.to_owned(),
            plural,
            name: name.map(ToOwned::to_owned),
        }
    }

    /// Parses the path of a request URL. Returns `None` for anything but
    /// namespaced collections and objects.
    pub fn parse(url_path: &str) -> Option<Self> {
        let segments: Vec<&str> = url_path.trim_matches('/').split('/').collect();

        let (prefix, namespace, plural, rest) = match segments.as_slice() {
            ["api", version, "namespaces", namespace, plural, rest @ ..] => {
                (format!("/api/{version}"), *namespace, *plural, rest)
            }
            ["apis", group, version, "namespaces", namespace, plural, rest @ ..] => {
                (format!("/apis/{group}/{version}"), *namespace, *plural, rest)
            }
            _ => return None,
        };

        let name = match rest {
            [] => None,
            [name] => Some((*name).to_owned()),
            _ => return None,
        };

        Some(Self {
            collection: format!("{prefix}/namespaces/{namespace}/{plural}"),
            namespace: namespace.to_owned(),
            plural: plural.to_owned(),
            name,
        })
    }

    /// Derives the path of the object described by `manifest`.
    pub fn for_manifest(manifest: &Value) -> Result<Self, Error> {
        let api_version = manifest["apiVersion"]
            .as_str()
            .context(MissingFieldSnafu {
                field: "apiVersion",
            })?;
        let kind = manifest["kind"]
            .as_str()
            .context(MissingFieldSnafu { field: "kind" })?;
        let name = manifest["metadata"]["name"]
            .as_str()
            .context(MissingFieldSnafu {
                field: "metadata.name",
            })?;
        let namespace = manifest["metadata"]["namespace"]
            .as_str()
            .unwrap_or("default");

        Ok(Self::new(api_version, kind, namespace, Some(name)))
    }

    /// Returns `true` for paths of the core `Service` kind, whose cluster IP
    /// the mock allocates.
    pub fn is_core_service(&self) -> bool {
        self.plural == Service::URL_PATH_SEGMENT
            && self
                .collection
                .starts_with(&format!("/api/{}/", Service::API_VERSION))
    }
}
