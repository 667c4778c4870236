use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "key-rotation",
    version,
    about = "Rotate an IAM access key and push it to Terraform Cloud workspaces"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one rotation and print the report as JSON.
    Rotate(RunOpts),
    /// Show which workspace variables would be created or updated.
    Plan(RunOpts),
    /// Rotate on the configured cron schedule until interrupted.
    Schedule(RunOpts),
    Config(ConfigOpts),
    Version,
}

#[derive(clap::Args)]
pub struct RunOpts {
    #[arg(short, long)]
    pub config: Option<String>,
    /// IAM user whose key is rotated.
    #[arg(long)]
    pub principal: Option<String>,
    /// Target workspace name (repeatable). Defaults to every workspace.
    #[arg(long = "workspace")]
    pub workspaces: Vec<String>,
}

#[derive(clap::Args)]
pub struct ConfigOpts {
    #[arg(short, long)]
    pub config: Option<String>,
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    Show,
    Validate,
    Init,
}
