use crate::ci::{expand_home, CiSettings, DEFAULT_BASE_DIR};
use crate::clients::circleci::ProjectInfo;
use crate::integrations::csv_split::parse_delimiter;
use crate::utils::error::{IntegrationError, Result};
use crate::utils::validation::{
    validate_file_extension, validate_non_empty_string, validate_positive_number, validate_range, Validate,
};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(name = "newstore-integrations")]
#[command(about = "Deploy trigger and local runs of the NewStore integrations")]
pub struct CliConfig {
    #[arg(long, short, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// CircleCI deploy trigger
    Workflow {
        #[command(subcommand)]
        action: WorkflowAction,
    },
    /// Convert a price CSV into price book import chunks
    Prices(PricesArgs),
    /// Split a CSV into pieces
    Split(SplitArgs),
    /// Check a Shopify webhook signature
    VerifyWebhook(VerifyWebhookArgs),
    /// Request a NewStore token with parameters from a local TOML file
    Token(TokenArgs),
}

#[derive(Debug, Clone, Subcommand)]
pub enum WorkflowAction {
    /// Run a pipeline for every changed integration and wait for them
    Trigger(CiArgs),
    /// List the integrations a trigger would run
    Changed(CiArgs),
}

#[derive(Debug, Clone, Args)]
pub struct CiArgs {
    #[arg(long, env = "CIRCLE_TOKEN", hide_env_values = true)]
    pub token: String,

    #[arg(long, env = "CIRCLE_PROJECT_USERNAME")]
    pub project_username: String,

    #[arg(long, env = "CIRCLE_PROJECT_REPONAME")]
    pub project_reponame: String,

    #[arg(long, env = "CIRCLE_SHA1")]
    pub sha1: String,

    #[arg(long, env = "CIRCLE_BRANCH")]
    pub branch: String,

    #[arg(long, env = "CIRCLE_WORKING_DIRECTORY", default_value = DEFAULT_BASE_DIR)]
    pub working_directory: String,

    #[arg(long, env = "DEPLOY_POLL_INTERVAL", default_value = "30")]
    pub poll_interval: u64,
}

impl CiArgs {
    pub fn settings(&self) -> CiSettings {
        CiSettings {
            token: self.token.clone(),
            project: ProjectInfo::new(&self.project_username, &self.project_reponame),
            current_commit: self.sha1.clone(),
            current_branch: self.branch.clone(),
            base_dir: expand_home(&self.working_directory),
            poll_interval: Duration::from_secs(self.poll_interval),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct PricesArgs {
    #[arg(long)]
    pub file: PathBuf,

    #[arg(long)]
    pub currency: String,

    #[arg(long, help = "Treat the file as sale prices")]
    pub sale: bool,

    #[arg(long, default_value = "./output")]
    pub output_path: String,

    #[arg(long, default_value = "1000")]
    pub chunk_size: usize,
}

#[derive(Debug, Clone, Args)]
pub struct SplitArgs {
    #[arg(long)]
    pub file: PathBuf,

    #[arg(long, default_value = "1000")]
    pub row_limit: usize,

    #[arg(long, default_value = ",")]
    pub delimiter: String,

    #[arg(long, help = "Rows sharing this column stay in one piece")]
    pub group_column: Option<String>,

    #[arg(long, default_value = "./output")]
    pub output_path: String,
}

#[derive(Debug, Clone, Args)]
pub struct VerifyWebhookArgs {
    #[arg(long)]
    pub body_file: PathBuf,

    #[arg(long)]
    pub hmac: String,

    #[arg(long, env = "SHOPIFY_WEBHOOK_SECRET", hide_env_values = true)]
    pub secret: String,
}

#[derive(Debug, Clone, Args)]
pub struct TokenArgs {
    #[arg(long, help = "TOML file with a [parameters] table")]
    pub params_file: PathBuf,

    #[arg(long, env = "TENANT", default_value = "frankandoak")]
    pub tenant: String,

    #[arg(long, env = "STAGE", default_value = "x")]
    pub stage: String,
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        match &self.command {
            Command::Workflow { action } => {
                let (WorkflowAction::Trigger(args) | WorkflowAction::Changed(args)) = action;
                args.settings().validate()?;
                validate_range("poll_interval", args.poll_interval, 1, 3600)
            }
            Command::Prices(args) => {
                validate_file_extension("file", &file_name(&args.file), &["csv"])?;
                validate_positive_number("chunk_size", args.chunk_size, 1)?;
                if args.currency.len() != 3 || !args.currency.chars().all(|c| c.is_ascii_uppercase()) {
                    return Err(IntegrationError::InvalidConfigValueError {
                        field: "currency".to_string(),
                        value: args.currency.clone(),
                        reason: "expected a three letter ISO code such as CAD".to_string(),
                    });
                }
                Ok(())
            }
            Command::Split(args) => {
                validate_file_extension("file", &file_name(&args.file), &["csv"])?;
                validate_positive_number("row_limit", args.row_limit, 1)?;
                parse_delimiter(&args.delimiter).map(|_| ())
            }
            Command::VerifyWebhook(args) => {
                validate_non_empty_string("hmac", &args.hmac)?;
                validate_non_empty_string("secret", &args.secret)
            }
            Command::Token(args) => {
                validate_file_extension("params_file", &file_name(&args.params_file), &["toml"])?;
                validate_non_empty_string("tenant", &args.tenant)?;
                validate_non_empty_string("stage", &args.stage)
            }
        }
    }
}
