//! An in-process mock of the Kubernetes API server.
//!
//! The mock serves the namespaced create, get, list, replace and delete
//! endpoints of all resource kinds from an in-memory object store, so
//! [`kube::Api`] calls made by the plugins behave the way they would against a
//! real cluster:
//!
//! - every write assigns a new `metadata.resourceVersion`, and replacing an
//!   object with a stale or missing `resourceVersion` is rejected,
//! - `Service` objects get a `spec.clusterIP` allocated on creation, which is
//!   immutable afterwards,
//! - list calls honor `limit`, equality-based `labelSelector`s and the
//!   `metadata.name` and `metadata.namespace` `fieldSelector`s,
//! - watch calls stream an `ADDED` event for every matching object changed
//!   after the requested `resourceVersion`, then end,
//! - unknown objects are answered with a `NotFound` status.
//!
//! No discovery or patch endpoints are served.
use std::sync::Arc;

use kube::{Client, Config};
use serde_json::Value;
use snafu::{ResultExt, Snafu};
use tracing::debug;
use wiremock::{Mock, MockServer, matchers::path_regex};

mod api;
mod path;

use crate::{api::ApiServer, path::ResourcePath};

pub use crate::api::State;

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to parse mock server URI {uri:?}"))]
    ParseUri {
        source: http::uri::InvalidUri,
        uri: String,
    },

    #[snafu(display("failed to create Kubernetes client for the mock server"))]
    CreateClient { source: kube::Error },

    #[snafu(display("manifest is missing {field}"))]
    MissingField { field: &'static str },
}

/// A running mock Kubernetes API server.
pub struct MockKubernetes {
    server: MockServer,
    state: Arc<State>,
}

impl MockKubernetes {
    /// Starts a mock server with an empty object store.
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let state = Arc::new(State::default());

        Mock::given(path_regex(r"^/apis?/"))
            .respond_with(ApiServer::new(Arc::clone(&state)))
            .mount(&server)
            .await;

        debug!(uri = %server.uri(), "started mock Kubernetes API server");
        Self { server, state }
    }

    /// Returns the server's URI, e.g. `http://127.0.0.1:12345`.
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Creates a [`Client`] talking to this server.
    ///
    /// This has to be called from within a Tokio runtime.
    pub fn client(&self) -> Result<Client> {
        let uri = self.uri();
        let cluster_url = uri.parse().context(ParseUriSnafu { uri })?;
        Client::try_from(Config::new(cluster_url)).context(CreateClientSnafu)
    }

    /// Stores `manifest` as if it had been created through the API. The
    /// namespace defaults to `default` and a `resourceVersion` is assigned.
    pub fn insert(&self, mut manifest: Value) -> Result<()> {
        let path = ResourcePath::for_manifest(&manifest)?;
        self.state.insert(&path, &mut manifest);
        Ok(())
    }

    /// Returns the stored object, if any.
    pub fn object(
        &self,
        api_version: &str,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Option<Value> {
        let path = ResourcePath::new(api_version, kind, namespace, Some(name));
        self.state.get(&path)
    }

    /// Answers all requests for single objects with the HTTP status `code`
    /// until set back to `None`. Creates, lists and deletes are not affected.
    pub fn fail_gets_with(&self, code: Option<u16>) {
        self.state.fail_gets_with(code);
    }

    /// Answers all watch requests with the HTTP status `code` until set back
    /// to `None`. Plain lists are not affected.
    pub fn fail_watches_with(&self, code: Option<u16>) {
        self.state.fail_watches_with(code);
    }

    /// Returns the number of requests the server has received so far.
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map_or(0, |requests| requests.len())
    }
}
