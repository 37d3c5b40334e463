use std::{
    collections::BTreeMap,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use serde_json::{Value, json};
use tracing::trace;
use wiremock::{Request, Respond, ResponseTemplate};

use crate::path::ResourcePath;

/// How long a watch request is held open before it is answered.
const WATCH_POLL_INTERVAL: Duration = Duration::from_millis(50);

type Collection = BTreeMap<String, Value>;

/// The object store behind a [`MockKubernetes`](crate::MockKubernetes).
#[derive(Debug, Default)]
pub struct State {
    collections: RwLock<BTreeMap<String, Collection>>,
    revision: AtomicU64,
    allocated_ips: AtomicU64,
    get_failure: RwLock<Option<u16>>,
    watch_failure: RwLock<Option<u16>>,
}

impl State {
    fn next_revision(&self) -> String {
        (self.revision.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn allocate_cluster_ip(&self) -> String {
        let n = self.allocated_ips.fetch_add(1, Ordering::SeqCst) + 1;
        format!("10.96.{}.{}", n / 250, n % 250 + 1)
    }

    pub(crate) fn get(&self, path: &ResourcePath) -> Option<Value> {
        let name = path.name.as_ref()?;
        self.collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&path.collection)?
            .get(name)
            .cloned()
    }

    /// Stores `object` under `path`, filling in the fields the API server is
    /// responsible for.
    pub(crate) fn insert(&self, path: &ResourcePath, object: &mut Value) {
        let name = path.name.clone().unwrap_or_default();

        object["metadata"]["name"] = json!(name);
        object["metadata"]["namespace"] = json!(path.namespace);
        object["metadata"]["resourceVersion"] = json!(self.next_revision());
        if object["metadata"]["uid"].is_null() {
            object["metadata"]["uid"] = json!(format!("uid-{name}"));
        }

        if path.is_core_service() {
            let cluster_ip = object["spec"]["clusterIP"].as_str().unwrap_or_default();
            if cluster_ip.is_empty() {
                let cluster_ip = self.allocate_cluster_ip();
                object["spec"]["clusterIP"] = json!(cluster_ip);
                object["spec"]["clusterIPs"] = json!([cluster_ip]);
            }
        }

        self.collections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(path.collection.clone())
            .or_default()
            .insert(name, object.clone());
    }

    fn remove(&self, path: &ResourcePath) -> Option<Value> {
        let name = path.name.as_ref()?;
        self.collections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&path.collection)?
            .remove(name)
    }

    fn list(&self, path: &ResourcePath) -> Vec<Value> {
        self.collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&path.collection)
            .map(|collection| collection.values().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn fail_gets_with(&self, code: Option<u16>) {
        *self
            .get_failure
            .write()
            .unwrap_or_else(PoisonError::into_inner) = code;
    }

    fn get_failure(&self) -> Option<u16> {
        *self
            .get_failure
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn fail_watches_with(&self, code: Option<u16>) {
        *self
            .watch_failure
            .write()
            .unwrap_or_else(PoisonError::into_inner) = code;
    }

    fn watch_failure(&self) -> Option<u16> {
        *self
            .watch_failure
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// The query parameters of a collection request the mock understands.
#[derive(Debug, Default)]
struct CollectionQuery {
    watch: bool,
    limit: Option<usize>,
    since_revision: u64,
    labels: Vec<(String, String)>,
    fields: Vec<(String, String)>,
}

impl CollectionQuery {
    fn parse(request: &Request) -> Self {
        let mut query = Self::default();
        for (key, value) in request.url.query_pairs() {
            match key.as_ref() {
                "watch" => query.watch = value == "true" || value == "1",
                "limit" => query.limit = value.parse().ok().filter(|limit| *limit > 0),
                "resourceVersion" => query.since_revision = value.parse().unwrap_or_default(),
                "labelSelector" => query.labels = equality_requirements(&value),
                "fieldSelector" => query.fields = equality_requirements(&value),
                _ => {}
            }
        }
        query
    }

    fn matches(&self, object: &Value) -> bool {
        let labels_match = self.labels.iter().all(|(key, value)| {
            object["metadata"]["labels"][key].as_str() == Some(value.as_str())
        });
        // Only the metadata fields are supported, other selectors match everything
        let fields_match = self.fields.iter().all(|(field, value)| {
            match field.strip_prefix("metadata.") {
                Some(key @ ("name" | "namespace")) => {
                    object["metadata"][key].as_str() == Some(value.as_str())
                }
                _ => true,
            }
        });

        labels_match && fields_match
    }
}

/// Splits a selector like `a=b,c=d` into its requirements. Set-based and
/// inequality requirements are ignored.
fn equality_requirements(selector: &str) -> Vec<(String, String)> {
    selector
        .split(',')
        .filter(|requirement| !requirement.contains("!="))
        .filter_map(|requirement| requirement.split_once('='))
        .map(|(key, value)| {
            let value = value.strip_prefix('=').unwrap_or(value);
            (key.trim().to_owned(), value.trim().to_owned())
        })
        .collect()
}

fn revision_of(object: &Value) -> u64 {
    object["metadata"]["resourceVersion"]
        .as_str()
        .and_then(|version| version.parse().ok())
        .unwrap_or_default()
}

/// Answers Kubernetes API requests from a [`State`].
pub(crate) struct ApiServer {
    state: Arc<State>,
}

impl ApiServer {
    pub fn new(state: Arc<State>) -> Self {
        Self { state }
    }

    fn create(&self, path: ResourcePath, body: &[u8]) -> ResponseTemplate {
        let Ok(mut object) = serde_json::from_slice::<Value>(body) else {
            return status(400, "BadRequest", "request body is not valid JSON");
        };

        let name = match object["metadata"]["name"].as_str() {
            Some(name) if !name.is_empty() => name.to_owned(),
            _ => match object["metadata"]["generateName"].as_str() {
                Some(prefix) => format!("{prefix}{}", self.state.next_revision()),
                None => return status(422, "Invalid", "metadata.name: Required value"),
            },
        };

        let path = ResourcePath {
            name: Some(name.clone()),
            ..path
        };
        if self.state.get(&path).is_some() {
            let message = format!("{} {name:?} already exists", path.plural);
            return status(409, "AlreadyExists", &message);
        }

        self.state.insert(&path, &mut object);
        ResponseTemplate::new(201).set_body_json(object)
    }

    fn get(&self, path: &ResourcePath) -> ResponseTemplate {
        if let Some(code) = self.state.get_failure() {
            return status(code, "InternalError", "injected failure");
        }

        match self.state.get(path) {
            Some(object) => ResponseTemplate::new(200).set_body_json(object),
            None => not_found(path),
        }
    }

    fn list(&self, path: &ResourcePath, query: &CollectionQuery) -> ResponseTemplate {
        let mut items: Vec<Value> = self
            .state
            .list(path)
            .into_iter()
            .filter(|item| query.matches(item))
            .collect();

        let revision = self.state.revision.load(Ordering::SeqCst).to_string();
        let mut metadata = json!({ "resourceVersion": revision });
        if let Some(limit) = query.limit {
            if items.len() > limit {
                items.truncate(limit);
                metadata["continue"] = json!(format!("after-{limit}"));
            }
        }

        ResponseTemplate::new(200).set_body_json(json!({
            "apiVersion": "v1",
            "kind": "List",
            "metadata": metadata,
            "items": items,
        }))
    }

    /// Answers a watch with one `ADDED` event per matching object written after
    /// the requested revision, then ends the stream. Clients re-establish the
    /// watch from the last revision they have seen.
    fn watch(&self, path: &ResourcePath, query: &CollectionQuery) -> ResponseTemplate {
        if let Some(code) = self.state.watch_failure() {
            return status(code, "InternalError", "injected failure");
        }

        let events: String = self
            .state
            .list(path)
            .into_iter()
            .filter(|item| query.matches(item) && revision_of(item) > query.since_revision)
            .map(|object| format!("{}\n", json!({ "type": "ADDED", "object": object })))
            .collect();

        ResponseTemplate::new(200)
            .set_body_raw(events, "application/json")
            .set_delay(WATCH_POLL_INTERVAL)
    }

    fn replace(&self, path: &ResourcePath, body: &[u8]) -> ResponseTemplate {
        let Ok(mut object) = serde_json::from_slice::<Value>(body) else {
            return status(400, "BadRequest", "request body is not valid JSON");
        };
        let Some(existing) = self.state.get(path) else {
            return not_found(path);
        };

        match object["metadata"]["resourceVersion"].as_str() {
            None | Some("") => {
                return status(
                    422,
                    "Invalid",
                    "metadata.resourceVersion: Invalid value: 0x0: must be specified for an update",
                );
            }
            Some(version) if Some(version) != existing["metadata"]["resourceVersion"].as_str() => {
                return status(
                    409,
                    "Conflict",
                    "the object has been modified; please apply your changes to the latest \
                     version and try again",
                );
            }
            Some(_) => {}
        }

        if path.is_core_service() {
            let requested = object["spec"]["clusterIP"].as_str().unwrap_or_default();
            let allocated = existing["spec"]["clusterIP"].as_str().unwrap_or_default();
            if requested != allocated {
                return status(
                    422,
                    "Invalid",
                    "spec.clusterIPs[0]: Invalid value: field is immutable",
                );
            }
        }

        object["metadata"]["uid"] = existing["metadata"]["uid"].clone();
        self.state.insert(path, &mut object);
        ResponseTemplate::new(200).set_body_json(object)
    }

    fn delete(&self, path: &ResourcePath) -> ResponseTemplate {
        match self.state.remove(path) {
            Some(object) => ResponseTemplate::new(200).set_body_json(object),
            None => not_found(path),
        }
    }
}

impl Respond for ApiServer {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        trace!(method = %request.method, url = %request.url, "received request");

        let Some(path) = ResourcePath::parse(request.url.path()) else {
            return status(
                404,
                "NotFound",
                "the server could not find the requested resource",
            );
        };

        match (request.method.as_str(), path.name.is_some()) {
            ("POST", false) => self.create(path, &request.body),
            ("GET", false) => {
                let query = CollectionQuery::parse(request);
                if query.watch {
                    self.watch(&path, &query)
                } else {
                    self.list(&path, &query)
                }
            }
            ("GET", true) => self.get(&path),
            ("PUT", true) => self.replace(&path, &request.body),
            ("DELETE", true) => self.delete(&path),
            _ => status(
                405,
                "MethodNotAllowed",
                "the server does not allow this method on the requested resource",
            ),
        }
    }
}

fn not_found(path: &ResourcePath) -> ResponseTemplate {
    let name = path.name.as_deref().unwrap_or_default();
    status(404, "NotFound", &format!("{} {name:?} not found", path.plural))
}

fn status(code: u16, reason: &str, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(code).set_body_json(json!({
        "apiVersion": "v1",
        "kind": "Status",
        "metadata": {},
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(name: &str, labels: Value) -> Value {
        json!({ "metadata": { "name": name, "namespace": "default", "labels": labels } })
    }

    #[test]
    fn equality_requirements_skip_inequalities() {
        assert_eq!(
            equality_requirements("app=web,tier==frontend,env!=prod"),
            [
                ("app".to_owned(), "web".to_owned()),
                ("tier".to_owned(), "frontend".to_owned()),
            ]
        );
    }

    #[test]
    fn query_matches_labels_and_name() {
        let query = CollectionQuery {
            labels: equality_requirements("app=web"),
            fields: equality_requirements("metadata.name=web"),
            ..CollectionQuery::default()
        };

        assert!(query.matches(&object("web", json!({ "app": "web" }))));
        assert!(!query.matches(&object("api", json!({ "app": "web" }))));
        assert!(!query.matches(&object("web", json!({ "app": "api" }))));
    }
}
