//! podcraft command line
//!
//! ## Usage
//!
//! ```bash
//! # Provision (or converge) an environment and write alice.kubeconfig
//! podcraft create alice
//!
//! # Against another context, with JSON logs and a deadline
//! podcraft --context staging --log-format json --timeout 60 create alice
//!
//! # Verbose logging
//! RUST_LOG=debug podcraft list
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use kube::config::Kubeconfig;
use podcraft::config::{DEFAULT_CPU_LIMIT, DEFAULT_MAX_PODS, DEFAULT_MEMORY_LIMIT, STORAGE_LIMIT};
use podcraft::{
    create_environment, delete_environment, describe_environment, list_environments,
    with_deadline, AdminEndpoint, DeleteOutcome, GovernanceLimits, KubeControlPlane,
    ProvisionReport, TenantHandle,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Per-developer Kubernetes environments
#[derive(Parser, Debug)]
#[command(name = "podcraft")]
#[command(version, about = "Provision isolated developer namespaces on a shared cluster")]
struct Args {
    /// Path to the operator kubeconfig (defaults to $HOME/.kube/config)
    #[arg(long, global = true)]
    kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use instead of the current context
    #[arg(long, global = true)]
    context: Option<String>,

    /// Abandon create or delete after this many seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or converge a developer environment
    Create {
        username: String,

        /// Total CPU limit for the namespace
        #[arg(long, default_value = DEFAULT_CPU_LIMIT)]
        cpu: String,

        /// Total memory limit for the namespace
        #[arg(long, default_value = DEFAULT_MEMORY_LIMIT)]
        memory: String,

        /// Maximum number of pods
        #[arg(long, default_value_t = DEFAULT_MAX_PODS)]
        max_pods: u32,

        /// Directory the kubeconfig is written to
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Delete a developer environment
    Delete { username: String },
    /// Show quota usage, pods and network policies of an environment
    Describe { username: String },
    /// List developer environments
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries the status report
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));
    match args.log_format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }

    if let Err(e) = run(args).await {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(args: Args) -> anyhow::Result<()> {
    let deadline = args.timeout.map(Duration::from_secs);
    let kubeconfig = load_kubeconfig(args.kubeconfig)?;
    let context = args.context.as_deref();

    match args.command {
        Command::Create {
            username,
            cpu,
            memory,
            max_pods,
            output_dir,
        } => {
            // Reject bad input before connecting
            let tenant = TenantHandle::new(&username)?;
            let limits = GovernanceLimits::new(&cpu, &memory, max_pods)?;
            let endpoint = AdminEndpoint::from_kubeconfig(&kubeconfig, context)?;
            let cp = KubeControlPlane::from_kubeconfig(kubeconfig, context).await?;

            let mut report = ProvisionReport::new();
            let result = with_deadline(
                deadline,
                create_environment(&cp, &tenant, &limits, &endpoint, &output_dir, &mut report),
            )
            .await;

            for step in report.log.steps() {
                println!("{} {}: {}", step.kind, step.name, step.outcome);
            }
            if let Some(path) = &report.profile_path {
                println!("Kubeconfig written to {}", path.display());
            }
            result?;

            println!("Developer environment ready: {}", tenant.namespace());
            print_storage_policy();
        }
        Command::Delete { username } => {
            let tenant = TenantHandle::new(&username)?;
            let cp = KubeControlPlane::from_kubeconfig(kubeconfig, context).await?;

            match with_deadline(deadline, delete_environment(&cp, &tenant)).await? {
                DeleteOutcome::Deleted => println!("Deleted namespace: {}", tenant.namespace()),
                DeleteOutcome::AlreadyAbsent => {
                    println!("Namespace does not exist: {}", tenant.namespace())
                }
            }
        }
        Command::Describe { username } => {
            let tenant = TenantHandle::new(&username)?;
            let cp = KubeControlPlane::from_kubeconfig(kubeconfig, context).await?;

            match describe_environment(&cp, &tenant).await? {
                None => println!("Namespace does not exist: {}", tenant.namespace()),
                Some(description) => {
                    println!("Namespace: {}", description.namespace);
                    if let Some(owner) = &description.owner {
                        println!("Owner: {}", owner);
                    }

                    println!("\nResourceQuota:");
                    for usage in &description.quota {
                        println!(
                            "  {}: {} / {}",
                            usage.resource,
                            usage.used.as_deref().unwrap_or("0"),
                            usage.hard
                        );
                    }

                    println!("\nPods:");
                    if description.pods.is_empty() {
                        println!("  No pods running");
                    }
                    for pod in &description.pods {
                        println!(
                            "  {} ({})",
                            pod.name,
                            pod.phase.as_deref().unwrap_or("Unknown")
                        );
                    }

                    println!("\nNetworkPolicies:");
                    for name in &description.network_policies {
                        println!("  {}", name);
                    }
                }
            }
        }
        Command::List => {
            let cp = KubeControlPlane::from_kubeconfig(kubeconfig, context).await?;
            for environment in list_environments(&cp).await? {
                match &environment.owner {
                    Some(owner) => println!("{}\t{}", environment.namespace, owner),
                    None => println!("{}", environment.namespace),
                }
            }
        }
    }

    Ok(())
}

fn load_kubeconfig(path: Option<PathBuf>) -> anyhow::Result<Kubeconfig> {
    let path = match path {
        Some(path) => path,
        None => std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".kube").join("config"))
            .context("HOME is not set; pass --kubeconfig")?,
    };

    info!(path = %path.display(), "Loading kubeconfig");
    Kubeconfig::read_from(&path)
        .with_context(|| format!("failed to read kubeconfig {}", path.display()))
}

fn print_storage_policy() {
    println!("\nStorage Policy:");
    println!("- Pods use ephemeral storage by default.");
    println!("- To persist data, create a PersistentVolumeClaim (PVC).");
    println!(
        "- Maximum storage allowed in this namespace: {}.",
        STORAGE_LIMIT
    );
    println!("- Deleting the namespace deletes all PVCs and data.");
}
