//! Resource lifecycle plugins for Kubernetes objects managed on behalf of an
//! orchestration service.
//!
//! Every plugin manages exactly one resource kind. It decodes YAML manifests
//! with the [`codec`], tags the decoded objects with an ownership label (see
//! [`ownership`]) and translates the intent into calls against the Kubernetes
//! API server reachable through a [`connector::KubernetesConnector`].
//!
//! ## Crate Features
//!
//! - `default` enables `clap`.
//! - `clap` enables parsing [`config::PluginOptions`] from CLI arguments and
//!   environment variables.

pub mod codec;
pub mod config;
pub mod connector;
pub mod logging;
pub mod namespace;
pub mod ownership;
pub mod plugin;
pub mod registry;
pub mod resource;

// External re-exports
pub use k8s_openapi;
pub use kube;
