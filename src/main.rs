use chrono::Utc;
use clap::Parser;
use newstore_integrations::ci;
use newstore_integrations::clients::shopify;
use newstore_integrations::clients::newstore::TokenResponse;
use newstore_integrations::config::cli::{Command, PricesArgs, SplitArgs, TokenArgs, VerifyWebhookArgs, WorkflowAction};
use newstore_integrations::config::LocalParameters;
use newstore_integrations::core::import_files::object_prefix;
use newstore_integrations::domain::ports::Storage;
use newstore_integrations::integrations::csv_split::{parse_delimiter, piece_key, split_csv};
use newstore_integrations::integrations::price_import::{self, pricebooks, write_pricebooks};
use newstore_integrations::utils::error::ErrorSeverity;
use newstore_integrations::utils::{logger, validation::Validate};
use newstore_integrations::{CliConfig, InvocationContext, LocalStorage, NewStoreClient, ParamStore, Result};

const PRICES_BUCKET: &str = "prices";
const SPLIT_BUCKET: &str = "split";

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

async fn run_prices(args: &PricesArgs) -> Result<String> {
    let data = std::fs::read(&args.file)?;
    let books = pricebooks(&data, &args.currency, args.sale)?;

    let storage = LocalStorage::new(args.output_path.clone());
    let prefix = object_prefix("", price_import::KIND, Utc::now());
    let chunks = write_pricebooks(&storage, PRICES_BUCKET, &prefix, &books, args.chunk_size).await?;

    tracing::info!("📦 {} price books written as {} chunks", books.len(), chunks);
    Ok(format!("{}/{}/{}", args.output_path, PRICES_BUCKET, prefix))
}

async fn run_split(args: &SplitArgs) -> Result<String> {
    let data = std::fs::read(&args.file)?;
    let pieces = split_csv(
        &data,
        parse_delimiter(&args.delimiter)?,
        args.row_limit,
        args.group_column.as_deref(),
    )?;

    let storage = LocalStorage::new(args.output_path.clone());
    let source = file_name(&args.file);
    for (i, piece) in pieces.iter().enumerate() {
        storage.write_file(SPLIT_BUCKET, &piece_key("", i + 1, &source), piece).await?;
    }

    tracing::info!("✂️ {} split into {} pieces", source, pieces.len());
    Ok(format!("{}/{}", args.output_path, SPLIT_BUCKET))
}

fn run_verify_webhook(args: &VerifyWebhookArgs) -> Result<bool> {
    let body = std::fs::read(&args.body_file)?;
    Ok(shopify::verify_webhook(&body, &args.hmac, &args.secret))
}

async fn run_token(args: &TokenArgs) -> Result<TokenResponse> {
    let params = ParamStore::new(LocalParameters::from_file(&args.params_file)?, &args.tenant, &args.stage);
    let config = params.newstore_config().await?;
    tracing::info!("🔑 Requesting token from {}", config.host);

    let client = NewStoreClient::new(config, InvocationContext::default());
    client.auth_request().await
}

async fn run(config: &CliConfig) -> Result<()> {
    match &config.command {
        Command::Workflow {
            action: WorkflowAction::Trigger(args),
        } => {
            let started = ci::trigger(&args.settings()).await?;
            println!("✅ {} pipelines finished", started);
        }
        Command::Workflow {
            action: WorkflowAction::Changed(args),
        } => {
            let changed = ci::changed(&args.settings()).await?;
            if changed.is_empty() {
                println!("No integration changed");
            }
            for integration in changed {
                println!("{}", integration);
            }
        }
        Command::Prices(args) => {
            let output = run_prices(args).await?;
            println!("✅ Price chunks written");
            println!("📁 Output saved to: {}", output);
        }
        Command::Split(args) => {
            let output = run_split(args).await?;
            println!("✅ CSV split");
            println!("📁 Output saved to: {}", output);
        }
        Command::VerifyWebhook(args) => {
            if run_verify_webhook(args)? {
                println!("✅ Signature is valid");
            } else {
                eprintln!("❌ Signature does not match");
                std::process::exit(1);
            }
        }
        Command::Token(args) => {
            let token = run_token(args).await?;
            println!("✅ Token issued for {}", args.tenant);
            println!("{}", serde_json::to_string_pretty(&token)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CliConfig::parse();

    // 初始化日誌
    logger::init_cli_logger(config.verbose);

    tracing::info!("Starting newstore-integrations CLI");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(&config).await {
        tracing::error!("❌ Command failed: {} (Severity: {:?})", e, e.severity());
        eprintln!("❌ {}", e);
        if e.is_retryable() {
            eprintln!("💡 The failure looks transient, running the command again may help");
        }

        // 根據錯誤嚴重程度決定退出碼
        if e.severity() != ErrorSeverity::Low {
            std::process::exit(e.exit_code());
        }
    }

    Ok(())
}
