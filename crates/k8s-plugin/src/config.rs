//! Process-wide plugin configuration.
use crate::{ownership::DEFAULT_LABEL_NAME, registry::PluginRegistry};

/// Options shared by every plugin of a deployment.
#[cfg_attr(
    feature = "clap",
    derive(clap::Args),
    command(next_help_heading = "Plugin Options")
)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PluginOptions {
    /// Label key under which the identifier of the owning instance is stored
    /// on every managed object.
    #[cfg_attr(feature = "clap", arg(long, env, default_value = DEFAULT_LABEL_NAME))]
    pub kubernetes_label_name: String,
}

impl Default for PluginOptions {
    fn default() -> Self {
        Self {
            kubernetes_label_name: DEFAULT_LABEL_NAME.to_owned(),
        }
    }
}

impl PluginOptions {
    /// Builds a [`PluginRegistry`] whose plugins use the configured label key.
    pub fn registry(&self) -> PluginRegistry {
        PluginRegistry::new(&self.kubernetes_label_name)
    }
}
