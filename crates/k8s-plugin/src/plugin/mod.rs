//! Resource lifecycle plugins.
//!
//! A plugin creates, reads, lists, updates and deletes objects of one fixed
//! resource kind. All plugins share the object-safe [`ResourcePlugin`]
//! contract, so callers can dispatch by capability instead of by concrete
//! kind (see [`PluginRegistry`](crate::registry::PluginRegistry)). The kinds
//! shipped with this crate are implemented by [`TypedPlugin`], which is
//! generic over the [`ManagedKind`] it manages.
//!
//! Plugins are stateless: every operation is an independent request/response
//! cycle against the Kubernetes API server and may be retried by the caller.
use std::{fmt::Debug, marker::PhantomData, path::Path, time::Duration};

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::{
    Api, ResourceExt,
    api::{DeleteParams, ListParams, PostParams},
    core::GroupVersionKind,
    runtime::wait::await_condition,
};
use serde::{Serialize, de::DeserializeOwned};
use snafu::{ResultExt, Snafu};
use tracing::{debug, info, warn};

use crate::{
    codec,
    connector::KubernetesConnector,
    namespace,
    ownership::OwnershipLabel,
    resource::{KubernetesResource, gvk_of},
};

mod config_map;
mod deployment;
mod service;

pub use config_map::ConfigMapPlugin;
pub use deployment::DeploymentPlugin;
pub use service::ServicePlugin;

/// The maximum number of objects returned by a single list call.
///
/// Namespaces holding more objects are truncated.
pub const RESOURCES_LIST_LIMIT: u32 = 100;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("failed to decode {kind} manifest {path:?}"))]
    DecodeManifest {
        source: codec::Error,
        kind: &'static str,
        path: std::path::PathBuf,
    },

    #[snafu(display("failed to create {kind} {name:?} in namespace {namespace:?}"))]
    CreateResource {
        source: kube::Error,
        kind: &'static str,
        name: String,
        namespace: String,
    },

    #[snafu(display("failed to get {kind} {name:?} in namespace {namespace:?}"))]
    GetResource {
        source: kube::Error,
        kind: &'static str,
        name: String,
        namespace: String,
    },

    #[snafu(display("failed to list {kind} objects in namespace {namespace:?}"))]
    ListResources {
        source: kube::Error,
        kind: &'static str,
        namespace: String,
    },

    #[snafu(display("failed to update {kind} {name:?} in namespace {namespace:?}"))]
    UpdateResource {
        source: kube::Error,
        kind: &'static str,
        name: String,
        namespace: String,
    },

    #[snafu(display("failed to delete {kind} {name:?} in namespace {namespace:?}"))]
    DeleteResource {
        source: kube::Error,
        kind: &'static str,
        name: String,
        namespace: String,
    },

    #[snafu(display("waiting for readiness is not implemented for {kind}"))]
    WatchNotImplemented { kind: &'static str },

    #[snafu(display("failed to watch {kind} {name:?} in namespace {namespace:?}"))]
    WaitForReadiness {
        source: kube::runtime::wait::Error,
        kind: &'static str,
        name: String,
        namespace: String,
    },

    #[snafu(display("{kind} {name:?} in namespace {namespace:?} did not become ready within {timeout:?}"))]
    ReadinessTimeout {
        source: tokio::time::error::Elapsed,
        kind: &'static str,
        name: String,
        namespace: String,
        timeout: Duration,
    },
}

impl Error {
    /// Returns `true` if the manifest handed to the plugin was unusable. No
    /// API call has been made in that case.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::DecodeManifest { .. })
    }

    /// Returns `true` if the Kubernetes API server rejected or failed a call.
    pub fn is_api_error(&self) -> bool {
        matches!(
            self,
            Self::CreateResource { .. }
                | Self::GetResource { .. }
                | Self::ListResources { .. }
                | Self::UpdateResource { .. }
                | Self::DeleteResource { .. }
                | Self::WaitForReadiness { .. }
        )
    }
}

/// The lifecycle operations every resource kind plugin offers.
///
/// An empty `namespace` always means [`namespace::DEFAULT_NAMESPACE`].
/// Kinds that cannot support a capability still implement the method and fail
/// with a fixed error, e.g. [`Error::WatchNotImplemented`].
#[async_trait]
pub trait ResourcePlugin: Send + Sync {
    /// The group, version and kind this plugin manages.
    fn gvk(&self) -> GroupVersionKind;

    /// Creates the object described by the manifest at `manifest_path` and
    /// returns the name confirmed by the API server.
    ///
    /// Any namespace embedded in the manifest is overridden by `namespace`.
    async fn create(
        &self,
        manifest_path: &Path,
        namespace: &str,
        connector: &dyn KubernetesConnector,
    ) -> Result<String>;

    /// Fetches the object identified by `resource` and returns its name.
    async fn get(
        &self,
        resource: &KubernetesResource,
        namespace: &str,
        connector: &dyn KubernetesConnector,
    ) -> Result<String>;

    /// Lists up to [`RESOURCES_LIST_LIMIT`] objects in the namespace.
    ///
    /// `gvk` is accepted for uniformity across plugins, a plugin always lists
    /// its own kind.
    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        connector: &dyn KubernetesConnector,
    ) -> Result<Vec<KubernetesResource>>;

    /// Lists up to [`RESOURCES_LIST_LIMIT`] objects in the namespace which
    /// carry the ownership label of the connector's instance.
    async fn list_owned(
        &self,
        namespace: &str,
        connector: &dyn KubernetesConnector,
    ) -> Result<Vec<KubernetesResource>>;

    /// Updates the object described by the manifest and returns its name.
    ///
    /// The `resourceVersion` and other server-assigned fields are carried over
    /// from the current object. If fetching the current object fails, the
    /// object is created instead.
    async fn update(
        &self,
        manifest_path: &Path,
        namespace: &str,
        connector: &dyn KubernetesConnector,
    ) -> Result<String>;

    /// Deletes the object identified by `resource`, letting the garbage
    /// collector remove dependents in the background.
    async fn delete(
        &self,
        resource: &KubernetesResource,
        namespace: &str,
        connector: &dyn KubernetesConnector,
    ) -> Result<()>;

    /// Waits until the object identified by `resource` is ready, or `timeout`
    /// elapses.
    async fn watch_until_ready(
        &self,
        timeout: Duration,
        namespace: &str,
        resource: &KubernetesResource,
        connector: &dyn KubernetesConnector,
    ) -> Result<()>;
}

/// A namespaced Kubernetes resource kind that can be managed by a
/// [`TypedPlugin`].
pub trait ManagedKind:
    kube::Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + k8s_openapi::Resource
    + Clone
    + Debug
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + 'static
{
    /// Whether [`ManagedKind::is_ready`] is meaningful for this kind.
    const SUPPORTS_READINESS: bool = false;

    /// Copies fields the API server assigned to `existing` which must not
    /// change on update. The `resourceVersion` is always copied by the plugin
    /// and does not need to be handled here.
    fn preserve_server_fields(&mut self, existing: &Self) {
        let _ = existing;
    }

    /// Returns `true` once the object is ready to serve.
    fn is_ready(&self) -> bool {
        false
    }
}

/// A [`ResourcePlugin`] for the resource kind `K`.
pub struct TypedPlugin<K> {
    ownership_label_key: String,
    kind: PhantomData<fn() -> K>,
}

impl<K> Debug for TypedPlugin<K>
where
    K: k8s_openapi::Resource,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedPlugin")
            .field("kind", &K::KIND)
            .field("ownership_label_key", &self.ownership_label_key)
            .finish()
    }
}

impl<K> TypedPlugin<K>
where
    K: ManagedKind,
{
    /// Creates a plugin which stores the owning instance under the label key
    /// `ownership_label_key`.
    pub fn new(ownership_label_key: impl Into<String>) -> Self {
        Self {
            ownership_label_key: ownership_label_key.into(),
            kind: PhantomData,
        }
    }

    pub fn ownership_label_key(&self) -> &str {
        &self.ownership_label_key
    }

    fn ownership_label(&self, connector: &dyn KubernetesConnector) -> OwnershipLabel {
        OwnershipLabel::new(&self.ownership_label_key, connector.instance_id())
    }

    fn api(connector: &dyn KubernetesConnector, namespace: &str) -> Api<K> {
        Api::namespaced(connector.client(), namespace)
    }

    async fn decode(manifest_path: &Path, namespace: &str) -> Result<K> {
        let mut resource: K = codec::decode_file(manifest_path)
            .await
            .context(DecodeManifestSnafu {
                kind: K::KIND,
                path: manifest_path,
            })?;
        resource.meta_mut().namespace = Some(namespace.to_owned());

        Ok(resource)
    }

    async fn create_resource(
        &self,
        mut resource: K,
        namespace: &str,
        connector: &dyn KubernetesConnector,
    ) -> Result<String> {
        self.ownership_label(connector).apply(&mut resource);

        let created = Self::api(connector, namespace)
            .create(&PostParams::default(), &resource)
            .await
            .context(CreateResourceSnafu {
                kind: K::KIND,
                name: resource.name_any(),
                namespace,
            })?;

        let name = created.name_any();
        info!(kind = K::KIND, namespace, %name, "created resource");

        Ok(name)
    }

    async fn list_with_params(
        namespace: &str,
        list_params: &ListParams,
        connector: &dyn KubernetesConnector,
    ) -> Result<Vec<KubernetesResource>> {
        let list = Self::api(connector, namespace)
            .list(list_params)
            .await
            .context(ListResourcesSnafu {
                kind: K::KIND,
                namespace,
            })?;

        // The API server is free to ignore the limit, e.g. when served from
        // the watch cache.
        let resources = list
            .items
            .iter()
            .take(RESOURCES_LIST_LIMIT as usize)
            .map(|item| {
                let name = item.name_any();
                debug!(kind = K::KIND, namespace, %name, "listed resource");
                KubernetesResource::of::<K>(name)
            })
            .collect();

        Ok(resources)
    }
}

#[async_trait]
impl<K> ResourcePlugin for TypedPlugin<K>
where
    K: ManagedKind,
{
    fn gvk(&self) -> GroupVersionKind {
        gvk_of::<K>()
    }

    #[tracing::instrument(skip(self, connector), fields(kind = K::KIND))]
    async fn create(
        &self,
        manifest_path: &Path,
        namespace: &str,
        connector: &dyn KubernetesConnector,
    ) -> Result<String> {
        let namespace = namespace::resolve(namespace);
        let resource = Self::decode(manifest_path, namespace).await?;

        self.create_resource(resource, namespace, connector).await
    }

    #[tracing::instrument(skip(self, connector), fields(kind = K::KIND))]
    async fn get(
        &self,
        resource: &KubernetesResource,
        namespace: &str,
        connector: &dyn KubernetesConnector,
    ) -> Result<String> {
        let namespace = namespace::resolve(namespace);

        let fetched = Self::api(connector, namespace)
            .get(&resource.name)
            .await
            .context(GetResourceSnafu {
                kind: K::KIND,
                name: &resource.name,
                namespace,
            })?;

        Ok(fetched.name_any())
    }

    #[tracing::instrument(skip(self, connector), fields(kind = K::KIND))]
    async fn list(
        &self,
        _gvk: &GroupVersionKind,
        namespace: &str,
        connector: &dyn KubernetesConnector,
    ) -> Result<Vec<KubernetesResource>> {
        let namespace = namespace::resolve(namespace);
        let list_params = ListParams::default().limit(RESOURCES_LIST_LIMIT);

        Self::list_with_params(namespace, &list_params, connector).await
    }

    #[tracing::instrument(skip(self, connector), fields(kind = K::KIND))]
    async fn list_owned(
        &self,
        namespace: &str,
        connector: &dyn KubernetesConnector,
    ) -> Result<Vec<KubernetesResource>> {
        let namespace = namespace::resolve(namespace);
        let list_params = ListParams::default()
            .labels(&self.ownership_label(connector).selector())
            .limit(RESOURCES_LIST_LIMIT);

        Self::list_with_params(namespace, &list_params, connector).await
    }

    #[tracing::instrument(skip(self, connector), fields(kind = K::KIND))]
    async fn update(
        &self,
        manifest_path: &Path,
        namespace: &str,
        connector: &dyn KubernetesConnector,
    ) -> Result<String> {
        let namespace = namespace::resolve(namespace);
        let mut resource = Self::decode(manifest_path, namespace).await?;
        let name = resource.name_any();
        let api = Self::api(connector, namespace);

        // Any failure counts as absence, not just NotFound. Transient or
        // authorization failures therefore also end up in a create attempt.
        let existing = match api.get(&name).await {
            Ok(existing) => existing,
            Err(error) => {
                warn!(
                    kind = K::KIND,
                    namespace,
                    %name,
                    %error,
                    "failed to fetch existing resource, creating it instead"
                );
                return self.create_resource(resource, namespace, connector).await;
            }
        };

        resource.meta_mut().resource_version = existing.meta().resource_version.clone();
        resource.preserve_server_fields(&existing);
        self.ownership_label(connector).apply(&mut resource);

        let replaced = api
            .replace(&name, &PostParams::default(), &resource)
            .await
            .context(UpdateResourceSnafu {
                kind: K::KIND,
                name: &name,
                namespace,
            })?;

        let name = replaced.name_any();
        info!(kind = K::KIND, namespace, %name, "updated resource");
        Ok(name)
    }

    #[tracing::instrument(skip(self, connector), fields(kind = K::KIND))]
    async fn delete(
        &self,
        resource: &KubernetesResource,
        namespace: &str,
        connector: &dyn KubernetesConnector,
    ) -> Result<()> {
        let namespace = namespace::resolve(namespace);

        Self::api(connector, namespace)
            .delete(&resource.name, &DeleteParams::background())
            .await
            .context(DeleteResourceSnafu {
                kind: K::KIND,
                name: &resource.name,
                namespace,
            })?;

        info!(kind = K::KIND, namespace, name = %resource.name, "deleted resource");
        Ok(())
    }

    #[tracing::instrument(skip(self, connector), fields(kind = K::KIND))]
    async fn watch_until_ready(
        &self,
        timeout: Duration,
        namespace: &str,
        resource: &KubernetesResource,
        connector: &dyn KubernetesConnector,
    ) -> Result<()> {
        if !K::SUPPORTS_READINESS {
            return WatchNotImplementedSnafu { kind: K::KIND }.fail();
        }

        let namespace = namespace::resolve(namespace);
        let ready = await_condition(
            Self::api(connector, namespace),
            &resource.name,
            |object: Option<&K>| object.is_some_and(K::is_ready),
        );

        tokio::time::timeout(timeout, ready)
            .await
            .context(ReadinessTimeoutSnafu {
                kind: K::KIND,
                name: &resource.name,
                namespace,
                timeout,
            })?
            .context(WaitForReadinessSnafu {
                kind: K::KIND,
                name: &resource.name,
                namespace,
            })?;

        info!(kind = K::KIND, namespace, name = %resource.name, "resource is ready");
        Ok(())
    }
}
