use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use kube::Client;
use tracing::info;
use tracing_subscriber::EnvFilter;

use workflow_operator::{
    config::Config,
    controllers::{JobController, WorkflowController},
    kubernetes::KubeGateway,
    workflow::{JobTemplateBuilder, ReconcileEngine},
};

/// Reconciles Workflow resources into batch Jobs
#[derive(Parser, Debug)]
#[command(name = "workflow-operator", version, about)]
struct Args {
    /// Namespace to watch (default: WATCH_NAMESPACE, or all namespaces)
    #[arg(short, long)]
    namespace: Option<String>,

    /// Ceiling on outstanding dependent jobs (default: MAX_JOBS)
    #[arg(long)]
    max_jobs: Option<usize>,

    /// YAML file mapping job types to containers (default: JOB_TEMPLATES_PATH)
    #[arg(long)]
    job_templates: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    // Load configuration, then apply command line overrides
    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(namespace) = args.namespace {
        config.kube.namespace = Some(namespace);
    }
    if let Some(max_jobs) = args.max_jobs {
        config.controller.max_jobs = max_jobs;
    }
    if let Some(path) = args.job_templates {
        config.controller.templates_path = Some(path);
        config
            .reload_templates()
            .context("failed to load job templates")?;
    }
    config.validate()?;
    info!("Loaded configuration: {:?}", config);

    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;

    let gateway = Arc::new(KubeGateway::new(client.clone(), config.kube.namespace.clone()));
    let engine = Arc::new(ReconcileEngine::new(
        gateway,
        JobTemplateBuilder::new(config.templates.clone()),
        &config.controller,
    ));

    let workflows = Arc::new(WorkflowController::new(
        client.clone(),
        config.kube.namespace.clone(),
        engine.clone(),
        &config.controller,
    ));
    let jobs = Arc::new(JobController::new(
        client,
        config.kube.namespace.clone(),
        engine,
        &config.controller,
    ));

    tokio::join!(workflows.run(), jobs.run());
    info!("Controllers stopped");

    Ok(())
}
