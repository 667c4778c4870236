use anyhow::Context;
use clap::Parser;
use key_rotation::cli::{Cli, Commands, ConfigAction, RunOpts};
use key_rotation::config::{validate_config_object, Config, CONFIG_BASENAME};
use key_rotation::credentials::{CredentialFieldSet, IamCredentialStore};
use key_rotation::logging;
use key_rotation::propagation::PropagationExecutor;
use key_rotation::reconcile::ReconciliationEngine;
use key_rotation::rotation::{RetirementPolicy, RotationOrchestrator};
use key_rotation::schedule::{run_schedule, RotationSchedule};
use key_rotation::workspaces::{TerraformCloudClient, WorkspaceApi, WorkspaceState};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Rotate(opts) => {
            let config = load_run_config(&opts).await?;
            info!(principal = %config.principal.name, "Rotating access key");
            let orchestrator = build_orchestrator(&config).await?;

            let report = orchestrator.run().await;
            println!("{}", serde_json::to_string_pretty(&report)?);

            if report.is_aborted() {
                anyhow::bail!("Rotation aborted for {}", report.principal);
            }
        }
        Commands::Plan(opts) => {
            let config = load_run_config(&opts).await?;
            let api = terraform_client(&config)?;
            let state = WorkspaceState::load(&api).await?;

            let fields = CredentialFieldSet::placeholder(&config.principal.name);
            let plan = engine(&config).reconcile(&fields, &state);

            let records: Vec<_> = plan
                .records
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "workspace": r.workspace,
                        "key": r.key(),
                        "action": r.action,
                    })
                })
                .collect();
            let output = serde_json::json!({
                "organization": api.organization(),
                "workspaces": state.workspace_count(),
                "creates": plan.creates(),
                "updates": plan.updates(),
                "records": records,
                "unresolved": plan.unresolved,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Schedule(opts) => {
            let config = load_run_config(&opts).await?;
            let schedule = RotationSchedule::from_config(&config.schedule)?;
            let orchestrator = build_orchestrator(&config).await?;
            run_schedule(&orchestrator, &schedule).await?;
        }
        Commands::Config(opts) => {
            let config = Config::load_with_ssm(opts.config.as_deref()).await?;
            match opts.action {
                ConfigAction::Show => {
                    let mut shown = config.clone();
                    if shown.terraform.token.is_some() {
                        shown.terraform.token = Some("********".to_string());
                    }
                    println!("{}", serde_json::to_string_pretty(&shown)?);
                }
                ConfigAction::Validate => {
                    validate_config_object(&config)?;
                    info!("Configuration is valid");
                }
                ConfigAction::Init => {
                    let default_path = format!("{CONFIG_BASENAME}.json");
                    Config::write_default(opts.config.as_deref().unwrap_or(&default_path))?;
                    info!("Configuration file created");
                }
            }
        }
        Commands::Version => {
            println!("key-rotation {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

/// Load configuration and apply command-line overrides, then validate.
async fn load_run_config(opts: &RunOpts) -> anyhow::Result<Config> {
    let mut config = Config::load_with_ssm(opts.config.as_deref()).await?;

    if let Some(principal) = &opts.principal {
        config.principal.name = principal.clone();
    }
    if !opts.workspaces.is_empty() {
        config.terraform.workspaces = opts.workspaces.clone();
    }

    validate_config_object(&config)?;
    Ok(config)
}

fn terraform_client(config: &Config) -> anyhow::Result<TerraformCloudClient> {
    let token = config
        .terraform
        .token
        .clone()
        .context("terraform.token is not configured")?;

    let client = TerraformCloudClient::new(
        &config.terraform.base_url,
        config.terraform.organization.clone(),
        token,
        config.propagation.request_timeout(),
    )
    .context("failed to build Terraform Cloud client")?
    .with_page_size(config.terraform.page_size);

    Ok(client)
}

fn engine(config: &Config) -> ReconciliationEngine {
    if config.terraform.workspaces.is_empty() {
        ReconciliationEngine::new()
    } else {
        ReconciliationEngine::with_targets(config.terraform.workspaces.iter().cloned())
    }
}

async fn build_orchestrator(config: &Config) -> anyhow::Result<RotationOrchestrator> {
    let store = Arc::new(IamCredentialStore::from_config(&config.aws).await);
    let api: Arc<dyn WorkspaceApi> = Arc::new(terraform_client(config)?);

    let executor = PropagationExecutor::new(api.clone())
        .with_max_concurrency(config.propagation.max_concurrency)
        .with_request_timeout(config.propagation.request_timeout());

    let policy = match config.propagation.min_success_ratio {
        Some(ratio) => RetirementPolicy::min_success_ratio(ratio),
        None => RetirementPolicy::always(),
    };

    Ok(
        RotationOrchestrator::new(store, api, config.principal.name.clone())
            .with_engine(engine(config))
            .with_executor(executor)
            .with_policy(policy),
    )
}
