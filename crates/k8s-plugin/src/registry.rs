//! Lookup of plugins by resource kind.
use std::collections::BTreeMap;

use snafu::{OptionExt, Snafu};

use crate::plugin::{ConfigMapPlugin, DeploymentPlugin, ResourcePlugin, ServicePlugin};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("no plugin is registered for resource kind {kind:?}"))]
    UnsupportedKind { kind: String },
}

/// Holds one plugin per supported resource kind, keyed by the lower-cased kind
/// name.
pub struct PluginRegistry {
    plugins: BTreeMap<String, Box<dyn ResourcePlugin>>,
}

impl PluginRegistry {
    /// Creates a registry with the `Service`, `ConfigMap` and `Deployment`
    /// plugins, all using `ownership_label_key`.
    pub fn new(ownership_label_key: &str) -> Self {
        let mut registry = Self::empty();
        registry.register(ServicePlugin::new(ownership_label_key));
        registry.register(ConfigMapPlugin::new(ownership_label_key));
        registry.register(DeploymentPlugin::new(ownership_label_key));
        registry
    }

    pub fn empty() -> Self {
        Self {
            plugins: BTreeMap::new(),
        }
    }

    /// Registers `plugin` under the kind it manages, replacing any plugin
    /// previously registered for that kind.
    pub fn register(&mut self, plugin: impl ResourcePlugin + 'static) {
        let kind = plugin.gvk().kind.to_lowercase();
        self.plugins.insert(kind, Box::new(plugin));
    }

    /// Returns the plugin for `kind`, compared case-insensitively.
    pub fn get(&self, kind: &str) -> Result<&dyn ResourcePlugin, Error> {
        self.plugins
            .get(&kind.to_lowercase())
            .map(|plugin| &**plugin)
            .context(UnsupportedKindSnafu { kind })
    }

    /// Returns the lower-cased names of all registered kinds.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }
}
