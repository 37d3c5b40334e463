//! Runs a single plugin operation against the cluster of the current kube
//! context.
use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};
use k8s_plugin::{
    config::PluginOptions,
    connector::{self, ClusterConnector},
    logging::initialize_logging,
    plugin::{self, ResourcePlugin},
    registry,
    resource::KubernetesResource,
};
use snafu::{ResultExt, Snafu};

const APP_NAME: &str = "k8s-plugin";

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to connect to the cluster"))]
    Connect { source: connector::Error },

    #[snafu(display("failed to look up the plugin"))]
    LookupPlugin { source: registry::Error },

    #[snafu(display("failed to {operation} resource"))]
    RunOperation {
        source: plugin::Error,
        operation: &'static str,
    },

    #[snafu(display("failed to serialize the listed resources"))]
    SerializeResources { source: serde_yaml::Error },
}

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Opts {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    run: RunArguments,
}

#[derive(Debug, PartialEq, Eq, Args)]
struct RunArguments {
    /// Identifier of the instance on whose behalf objects are managed
    #[arg(long, env)]
    instance_id: String,

    /// Resource kind to operate on, e.g. `Service`
    #[arg(long, short = 'k', default_value = "Service")]
    kind: String,

    /// Namespace to operate in. Defaults to `default` when empty.
    #[arg(long, short = 'n', default_value = "")]
    namespace: String,

    // All flattened structs go last to keep the help headings correct.
    #[command(flatten)]
    plugin: PluginOptions,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
enum Command {
    /// Create the object described by a manifest
    Create {
        #[arg(long, short = 'f', value_name = "FILE")]
        manifest: PathBuf,
    },

    /// Look up an object by name
    Get { name: String },

    /// List objects of the kind in the namespace
    List {
        /// Only list objects owned by the instance
        #[arg(long)]
        owned: bool,
    },

    /// Update the object described by a manifest, creating it if needed
    Update {
        #[arg(long, short = 'f', value_name = "FILE")]
        manifest: PathBuf,
    },

    /// Delete an object by name
    Delete { name: String },

    /// Wait until an object is ready
    Watch {
        name: String,

        #[arg(long, default_value_t = 300)]
        timeout_seconds: u64,
    },
}

impl Command {
    fn operation(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Get { .. } => "get",
            Self::List { owned: false } => "list",
            Self::List { owned: true } => "list owned",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::Watch { .. } => "watch",
        }
    }
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), Error> {
    let Opts { command, run } = Opts::parse();
    initialize_logging("K8S_PLUGIN_LOG", APP_NAME);

    let registry = run.plugin.registry();
    let plugin = registry.get(&run.kind).context(LookupPluginSnafu)?;
    let connector = ClusterConnector::try_default(run.instance_id)
        .await
        .context(ConnectSnafu)?;

    tracing::debug!(
        kind = %run.kind,
        namespace = %run.namespace,
        ?command,
        "running plugin operation"
    );
    execute(plugin, &command, &run.namespace, &connector).await
}

async fn execute(
    plugin: &dyn ResourcePlugin,
    command: &Command,
    namespace: &str,
    connector: &ClusterConnector,
) -> Result<(), Error> {
    let operation = command.operation();
    let resource = |name: &str| KubernetesResource::new(plugin.gvk(), name);

    match command {
        Command::Create { manifest } => {
            let name = plugin
                .create(manifest, namespace, connector)
                .await
                .context(RunOperationSnafu { operation })?;
            println!("{name}");
        }
        Command::Get { name } => {
            let name = plugin
                .get(&resource(name), namespace, connector)
                .await
                .context(RunOperationSnafu { operation })?;
            println!("{name}");
        }
        Command::List { owned } => {
            let resources = if *owned {
                plugin.list_owned(namespace, connector).await
            } else {
                plugin.list(&plugin.gvk(), namespace, connector).await
            }
            .context(RunOperationSnafu { operation })?;
            let yaml = serde_yaml::to_string(&resources).context(SerializeResourcesSnafu)?;
            print!("{yaml}");
        }
        Command::Update { manifest } => {
            let name = plugin
                .update(manifest, namespace, connector)
                .await
                .context(RunOperationSnafu { operation })?;
            println!("{name}");
        }
        Command::Delete { name } => {
            plugin
                .delete(&resource(name), namespace, connector)
                .await
                .context(RunOperationSnafu { operation })?;
        }
        Command::Watch {
            name,
            timeout_seconds,
        } => {
            plugin
                .watch_until_ready(
                    Duration::from_secs(*timeout_seconds),
                    namespace,
                    &resource(name),
                    connector,
                )
                .await
                .context(RunOperationSnafu { operation })?;
        }
    }

    Ok(())
}
