use k8s_openapi::api::core::v1::ConfigMap;

use crate::plugin::{ManagedKind, TypedPlugin};

/// Manages `ConfigMap` objects.
pub type ConfigMapPlugin = TypedPlugin<ConfigMap>;

impl ManagedKind for ConfigMap {}
