use std::time::Duration;

use indoc::indoc;
use k8s_openapi::api::core::v1::Service;
use k8s_plugin::{
    plugin::{Error, ResourcePlugin, ServicePlugin},
    resource::KubernetesResource,
};

mod common;

use common::{INSTANCE_ID, LABEL_KEY, TestCluster};

const WEB_SERVICE: &str = indoc! {"
    apiVersion: v1
    kind: Service
    metadata:
      name: web
      labels:
        app: web
    spec:
      selector:
        app: web
      ports:
        - port: 80
          targetPort: 8080
"};

const WEB_SERVICE_V2: &str = indoc! {"
    apiVersion: v1
    kind: Service
    metadata:
      name: web
      labels:
        app: web
        tier: frontend
    spec:
      selector:
        app: web
      ports:
        - port: 443
          targetPort: 8443
"};

fn resource_version(object: &serde_json::Value) -> u64 {
    object["metadata"]["resourceVersion"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap()
}

#[tokio::test]
async fn create_then_get() {
    let cluster = TestCluster::start().await;
    let plugin = ServicePlugin::new(LABEL_KEY);
    let manifest = cluster.manifest("web.yaml", WEB_SERVICE);

    let name = plugin
        .create(&manifest, "tenant", &cluster.connector)
        .await
        .unwrap();
    assert_eq!(name, "web");

    let fetched = plugin
        .get(
            &KubernetesResource::of::<Service>(&name),
            "tenant",
            &cluster.connector,
        )
        .await
        .unwrap();
    assert_eq!(fetched, name);
}

#[tokio::test]
async fn create_tags_ownership_and_keeps_labels() {
    let cluster = TestCluster::start().await;
    let plugin = ServicePlugin::new(LABEL_KEY);
    let manifest = cluster.manifest("web.yaml", WEB_SERVICE);

    plugin
        .create(&manifest, "tenant", &cluster.connector)
        .await
        .unwrap();

    let labels = &cluster.service("tenant", "web")["metadata"]["labels"];
    assert_eq!(
        labels,
        &serde_json::json!({ "app": "web", LABEL_KEY: INSTANCE_ID })
    );
}

#[tokio::test]
async fn create_defaults_to_the_default_namespace() {
    let cluster = TestCluster::start().await;
    let plugin = ServicePlugin::new(LABEL_KEY);
    let manifest = cluster.manifest("web.yaml", WEB_SERVICE);

    plugin.create(&manifest, "", &cluster.connector).await.unwrap();

    assert_eq!(
        cluster.service("default", "web")["metadata"]["namespace"],
        "default"
    );
}

#[tokio::test]
async fn create_overrides_embedded_namespace() {
    let cluster = TestCluster::start().await;
    let plugin = ServicePlugin::new(LABEL_KEY);
    let manifest = cluster.manifest(
        "web.yaml",
        indoc! {"
            apiVersion: v1
            kind: Service
            metadata:
              name: web
              namespace: somewhere-else
        "},
    );

    plugin
        .create(&manifest, "tenant", &cluster.connector)
        .await
        .unwrap();

    assert!(cluster.mock.object("v1", "Service", "tenant", "web").is_some());
    assert!(
        cluster
            .mock
            .object("v1", "Service", "somewhere-else", "web")
            .is_none()
    );
}

#[tokio::test]
async fn create_existing_fails() {
    let cluster = TestCluster::start().await;
    let plugin = ServicePlugin::new(LABEL_KEY);
    let manifest = cluster.manifest("web.yaml", WEB_SERVICE);

    plugin
        .create(&manifest, "tenant", &cluster.connector)
        .await
        .unwrap();
    let err = plugin
        .create(&manifest, "tenant", &cluster.connector)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::CreateResource { .. }), "{err:?}");
    assert!(err.is_api_error());
}

#[tokio::test]
async fn wrong_kind_makes_no_api_call() {
    let cluster = TestCluster::start().await;
    let plugin = ServicePlugin::new(LABEL_KEY);
    let manifest = cluster.manifest(
        "settings.yaml",
        indoc! {"
            apiVersion: v1
            kind: ConfigMap
            metadata:
              name: settings
            data:
              key: value
        "},
    );

    let create_err = plugin
        .create(&manifest, "tenant", &cluster.connector)
        .await
        .unwrap_err();
    let update_err = plugin
        .update(&manifest, "tenant", &cluster.connector)
        .await
        .unwrap_err();

    for err in [create_err, update_err] {
        assert!(err.is_invalid_input(), "{err:?}");
        assert!(matches!(
            err,
            Error::DecodeManifest {
                source: k8s_plugin::codec::Error::UnexpectedKind { .. },
                ..
            }
        ));
    }
    assert_eq!(cluster.mock.request_count().await, 0);
}

#[tokio::test]
async fn update_missing_creates() {
    let cluster = TestCluster::start().await;
    let plugin = ServicePlugin::new(LABEL_KEY);
    let manifest = cluster.manifest("web.yaml", WEB_SERVICE);

    let name = plugin
        .update(&manifest, "", &cluster.connector)
        .await
        .unwrap();
    assert_eq!(name, "web");

    let fetched = plugin
        .get(&KubernetesResource::of::<Service>("web"), "", &cluster.connector)
        .await
        .unwrap();
    assert_eq!(fetched, "web");
    assert_eq!(
        cluster.service("default", "web")["metadata"]["labels"][LABEL_KEY],
        INSTANCE_ID
    );
}

#[tokio::test]
async fn update_existing_preserves_cluster_ip() {
    let cluster = TestCluster::start().await;
    let plugin = ServicePlugin::new(LABEL_KEY);

    plugin
        .create(
            &cluster.manifest("web.yaml", WEB_SERVICE),
            "tenant",
            &cluster.connector,
        )
        .await
        .unwrap();
    let created = cluster.service("tenant", "web");
    let cluster_ip = created["spec"]["clusterIP"].as_str().unwrap().to_owned();
    assert!(!cluster_ip.is_empty());

    let name = plugin
        .update(
            &cluster.manifest("web-v2.yaml", WEB_SERVICE_V2),
            "tenant",
            &cluster.connector,
        )
        .await
        .unwrap();
    assert_eq!(name, "web");

    let updated = cluster.service("tenant", "web");
    assert_eq!(updated["spec"]["clusterIP"], cluster_ip.as_str());
    assert_eq!(updated["spec"]["ports"][0]["port"], 443);
    assert!(resource_version(&updated) > resource_version(&created));
    assert_eq!(
        updated["metadata"]["labels"],
        serde_json::json!({ "app": "web", "tier": "frontend", LABEL_KEY: INSTANCE_ID })
    );
}

#[tokio::test]
async fn update_retags_with_the_latest_owner() {
    let cluster = TestCluster::start().await;
    let plugin = ServicePlugin::new(LABEL_KEY);
    let manifest = cluster.manifest("web.yaml", WEB_SERVICE);

    plugin
        .create(&manifest, "tenant", &cluster.connector)
        .await
        .unwrap();
    plugin
        .update(&manifest, "tenant", &cluster.connector_for("instance-2"))
        .await
        .unwrap();

    let labels = &cluster.service("tenant", "web")["metadata"]["labels"];
    assert_eq!(labels[LABEL_KEY], "instance-2");
    assert_eq!(labels.as_object().unwrap().len(), 2);
}

#[tokio::test]
async fn update_falls_back_to_create_on_any_get_failure() {
    let cluster = TestCluster::start().await;
    let plugin = ServicePlugin::new(LABEL_KEY);
    let manifest = cluster.manifest("web.yaml", WEB_SERVICE);

    plugin
        .create(&manifest, "tenant", &cluster.connector)
        .await
        .unwrap();

    // The object exists, but the failing fetch is treated like absence, so the
    // update turns into a create which then collides with the existing object.
    cluster.mock.fail_gets_with(Some(500));
    let err = plugin
        .update(&manifest, "tenant", &cluster.connector)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::CreateResource { .. }), "{err:?}");
}

#[tokio::test]
async fn get_missing_fails() {
    let cluster = TestCluster::start().await;
    let plugin = ServicePlugin::new(LABEL_KEY);

    let err = plugin
        .get(
            &KubernetesResource::of::<Service>("missing"),
            "",
            &cluster.connector,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::GetResource { .. }), "{err:?}");
}

#[tokio::test]
async fn delete() {
    let cluster = TestCluster::start().await;
    let plugin = ServicePlugin::new(LABEL_KEY);
    let manifest = cluster.manifest("web.yaml", WEB_SERVICE);
    let resource = KubernetesResource::of::<Service>("web");

    plugin.create(&manifest, "", &cluster.connector).await.unwrap();
    plugin
        .delete(&resource, "", &cluster.connector)
        .await
        .unwrap();

    assert!(cluster.mock.object("v1", "Service", "default", "web").is_none());

    let err = plugin
        .delete(&resource, "", &cluster.connector)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DeleteResource { .. }), "{err:?}");
}

#[tokio::test]
async fn delete_never_created_fails() {
    let cluster = TestCluster::start().await;
    let plugin = ServicePlugin::new(LABEL_KEY);

    let err = plugin
        .delete(
            &KubernetesResource::of::<Service>("never-created"),
            "tenant",
            &cluster.connector,
        )
        .await
        .unwrap_err();

    let Error::DeleteResource {
        kind,
        name,
        namespace,
        ..
    } = &err
    else {
        panic!("expected DeleteResource, got {err:?}");
    };
    assert_eq!(*kind, "Service");
    assert_eq!(name, "never-created");
    assert_eq!(namespace, "tenant");
}

#[tokio::test]
async fn watch_until_ready_is_not_implemented() {
    let cluster = TestCluster::start().await;
    let plugin = ServicePlugin::new(LABEL_KEY);

    let err = plugin
        .watch_until_ready(
            Duration::from_secs(1),
            "",
            &KubernetesResource::of::<Service>("web"),
            &cluster.connector,
        )
        .await
        .unwrap_err();

    assert!(
        matches!(err, Error::WatchNotImplemented { kind: "Service" }),
        "{err:?}"
    );
    assert_eq!(cluster.mock.request_count().await, 0);
}
