//! Decoding of YAML manifests into typed Kubernetes objects.
//!
//! The typed structs of [`k8s_openapi`] act as the schema registry: the
//! `apiVersion` and `kind` of a manifest are checked against the constants of
//! the requested type before the full object is decoded.
use std::path::{Path, PathBuf};

use k8s_openapi::Resource;
use kube::core::TypeMeta;
use serde::de::DeserializeOwned;
use snafu::{ResultExt, Snafu, ensure};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("the manifest is empty"))]
    EmptyManifest,

    #[snafu(display("failed to read manifest from {path:?}"))]
    ReadManifest {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to parse manifest"))]
    ParseManifest { source: serde_yaml::Error },

    #[snafu(display(
        "decoded object is a {found_api_version}/{found_kind}, expected a {expected_api_version}/{expected_kind}"
    ))]
    UnexpectedKind {
        expected_api_version: &'static str,
        expected_kind: &'static str,
        found_api_version: String,
        found_kind: String,
    },
}

/// Decodes a single-document YAML `manifest` into an object of type `K`.
///
/// The manifest must declare the `apiVersion` and `kind` of `K`. Manifests
/// describing any other kind are rejected with [`Error::UnexpectedKind`]
/// instead of being coerced.
pub fn decode<K>(manifest: &str) -> Result<K>
where
    K: Resource + DeserializeOwned,
{
    ensure!(!manifest.trim().is_empty(), EmptyManifestSnafu);

    let type_meta: TypeMeta = serde_yaml::from_str(manifest).context(ParseManifestSnafu)?;
    ensure!(
        type_meta.api_version == K::API_VERSION && type_meta.kind == K::KIND,
        UnexpectedKindSnafu {
            expected_api_version: K::API_VERSION,
            expected_kind: K::KIND,
            found_api_version: type_meta.api_version,
            found_kind: type_meta.kind,
        }
    );

    serde_yaml::from_str(manifest).context(ParseManifestSnafu)
}

/// Reads the manifest at `path` and [decodes](decode) it.
pub async fn decode_file<K>(path: impl AsRef<Path>) -> Result<K>
where
    K: Resource + DeserializeOwned,
{
    let path = path.as_ref();
    let manifest = tokio::fs::read_to_string(path)
        .await
        .context(ReadManifestSnafu { path })?;

    decode(&manifest)
}
