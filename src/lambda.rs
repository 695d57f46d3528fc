use aws_config::BehaviorVersion;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use newstore_integrations::adapters::{DynamoTable, S3Storage, SecretsManager, SqsQueue, SsmParameters, StepFunction};
use newstore_integrations::config::env;
use newstore_integrations::domain::model::{S3Event, StepInput};
use newstore_integrations::integrations::historical::{
    csv_to_table, queue_to_newstore, table_to_queue, BackfillKind, BackfillTransformer, OrderTransformer,
    OrderTransformerConfig, ReturnTransformer,
};
use newstore_integrations::integrations::{
    auth_token, availability_import, csv_split, import_queue, newstore_import, price_import,
};
use newstore_integrations::utils::logger;
use newstore_integrations::utils::validation::Validate;
use newstore_integrations::{IntegrationError, InvocationContext, NewStoreClient, ParamStore, Result};
use serde_json::Value;

type Params = ParamStore<SsmParameters>;

/// Everything one integration needs, built once per container.
enum Handler {
    PriceImport {
        storage: S3Storage,
        workflows: StepFunction,
        settings: price_import::Settings,
    },
    AvailabilityImport {
        storage: S3Storage,
        cursor_table: DynamoTable,
        workflows: StepFunction,
        params: Params,
        newstore: Option<NewStoreClient>,
        settings: availability_import::Settings,
    },
    ImportQueue {
        storage: S3Storage,
    },
    NewStoreImport {
        storage: S3Storage,
        newstore: NewStoreClient,
        settings: newstore_import::Settings,
    },
    AuthToken(auth_token::TokenVendor<SsmParameters, SecretsManager>),
    CsvSplit {
        storage: S3Storage,
        settings: csv_split::Settings,
    },
    CsvToTable {
        storage: S3Storage,
        table: DynamoTable,
        settings: csv_to_table::Settings,
    },
    TableToQueue {
        table: DynamoTable,
        queue: SqsQueue,
        transformer: Box<dyn BackfillTransformer>,
        kind: BackfillKind,
    },
    QueueToNewStore {
        queue: SqsQueue,
        newstore: NewStoreClient,
        kind: BackfillKind,
    },
}

fn param_store(aws: &aws_config::SdkConfig) -> Params {
    let tenant = env::optional("TENANT", "frankandoak");
    let stage = env::optional("STAGE", "x");
    ParamStore::new(SsmParameters::new(aws_sdk_ssm::Client::new(aws)), &tenant, &stage)
}

async fn newstore_client(params: &Params) -> Result<NewStoreClient> {
    let config = params.newstore_config().await?;
    config.validate()?;
    Ok(NewStoreClient::new(config, InvocationContext::from_env()))
}

fn step_function(aws: &aws_config::SdkConfig) -> Result<StepFunction> {
    Ok(StepFunction::new(
        aws_sdk_sfn::Client::new(aws),
        &env::required("STATE_MACHINE_ARN")?,
    ))
}

/// Backfill table and key for the configured record type.
fn backfill_table(aws: &aws_config::SdkConfig, kind: BackfillKind) -> Result<DynamoTable> {
    let (table_var, key) = match kind {
        BackfillKind::Order => ("ORDERS_TABLE_NAME", "order_id"),
        BackfillKind::Return => ("RETURNS_TABLE_NAME", "rma_id"),
    };
    Ok(DynamoTable::new(
        aws_sdk_dynamodb::Client::new(aws),
        &env::required(table_var)?,
        key,
    ))
}

impl Handler {
    async fn build(integration: &str, aws: &aws_config::SdkConfig) -> Result<Self> {
        let storage = || S3Storage::new(aws_sdk_s3::Client::new(aws));

        let handler = match integration {
            "price_import" => {
                let settings = price_import::Settings::from_env()?;
                settings.validate()?;
                Handler::PriceImport {
                    storage: storage(),
                    workflows: step_function(aws)?,
                    settings,
                }
            }
            "availability_import" => {
                let settings = availability_import::Settings::from_env()?;
                settings.validate()?;
                let params = param_store(aws);
                let newstore = if settings.import_store_data {
                    Some(newstore_client(&params).await?)
                } else {
                    None
                };
                Handler::AvailabilityImport {
                    storage: storage(),
                    cursor_table: DynamoTable::new(
                        aws_sdk_dynamodb::Client::new(aws),
                        &env::required("CFR_TABLE")?,
                        "id",
                    )
                    .with_numeric_attributes(&["last", "current"]),
                    workflows: step_function(aws)?,
                    params,
                    newstore,
                    settings,
                }
            }
            "import_queue" => Handler::ImportQueue { storage: storage() },
            "newstore_import" => {
                let settings = newstore_import::Settings::from_env()?;
                settings.validate()?;
                Handler::NewStoreImport {
                    storage: storage(),
                    newstore: newstore_client(&param_store(aws)).await?,
                    settings,
                }
            }
            "auth_token" => Handler::AuthToken(auth_token::TokenVendor::new(
                param_store(aws),
                SecretsManager::new(aws_sdk_secretsmanager::Client::new(aws)),
                auth_token::Settings::from_env()?,
            )),
            "csv_split" => {
                let settings = csv_split::Settings::from_env()?;
                settings.validate()?;
                Handler::CsvSplit {
                    storage: storage(),
                    settings,
                }
            }
            "historical_csv_to_table" => {
                let settings = csv_to_table::Settings::from_env()?;
                Handler::CsvToTable {
                    storage: storage(),
                    table: backfill_table(aws, settings.kind)?,
                    settings,
                }
            }
            "historical_table_to_queue" => {
                let kind: BackfillKind = env::required("TYPE")?.parse()?;
                let queue_var = match kind {
                    BackfillKind::Order => "ORDERS_QUEUE_NAME",
                    BackfillKind::Return => "RETURNS_QUEUE_NAME",
                };
                let transformer: Box<dyn BackfillTransformer> = match kind {
                    BackfillKind::Order => Box::new(OrderTransformer::new(OrderTransformerConfig::default())),
                    BackfillKind::Return => Box::new(ReturnTransformer::new(newstore_client(&param_store(aws)).await?)),
                };
                Handler::TableToQueue {
                    table: backfill_table(aws, kind)?,
                    queue: SqsQueue::by_name(aws_sdk_sqs::Client::new(aws), &env::required(queue_var)?).await?,
                    transformer,
                    kind,
                }
            }
            "historical_queue_to_newstore" => Handler::QueueToNewStore {
                queue: SqsQueue::by_name(aws_sdk_sqs::Client::new(aws), &env::required("QUEUE_NAME")?).await?,
                newstore: newstore_client(&param_store(aws)).await?,
                kind: env::required("TYPE")?.parse()?,
            },
            other => {
                return Err(IntegrationError::InvalidConfigValueError {
                    field: "INTEGRATION".to_string(),
                    value: other.to_string(),
                    reason: "unknown integration".to_string(),
                })
            }
        };
        Ok(handler)
    }

    async fn handle(&self, event: LambdaEvent<Value>) -> Result<Value> {
        let (payload, context) = event.into_parts();
        tracing::debug!("Event: {}", payload);

        let response = match self {
            Handler::PriceImport {
                storage,
                workflows,
                settings,
            } => {
                let event: S3Event = serde_json::from_value(payload)?;
                serde_json::to_value(price_import::handle(storage, workflows, settings, &event).await?)?
            }
            Handler::AvailabilityImport {
                storage,
                cursor_table,
                workflows,
                params,
                newstore,
                settings,
            } => {
                let event: S3Event = serde_json::from_value(payload)?;
                let outcome = availability_import::handle(
                    storage,
                    cursor_table,
                    workflows,
                    params,
                    newstore.as_ref(),
                    settings,
                    &event,
                )
                .await;
                serde_json::to_value(outcome)?
            }
            Handler::ImportQueue { storage } => {
                let input: StepInput = serde_json::from_value(payload)?;
                serde_json::to_value(import_queue::handle(storage, input).await)?
            }
            Handler::NewStoreImport {
                storage,
                newstore,
                settings,
            } => {
                let event: S3Event = serde_json::from_value(payload)?;
                serde_json::to_value(newstore_import::handle(storage, newstore, settings, &event).await?)?
            }
            Handler::AuthToken(vendor) => {
                let context = InvocationContext::from_env().with_request_id(&context.request_id);
                serde_json::to_value(vendor.handle(&context).await)?
            }
            Handler::CsvSplit { storage, settings } => {
                let event: S3Event = serde_json::from_value(payload)?;
                serde_json::to_value(csv_split::handle(storage, settings, &event).await)?
            }
            Handler::CsvToTable {
                storage,
                table,
                settings,
            } => {
                let event: S3Event = serde_json::from_value(payload)?;
                serde_json::to_value(csv_to_table::handle(storage, table, settings, &event).await)?
            }
            Handler::TableToQueue {
                table,
                queue,
                transformer,
                kind,
            } => serde_json::to_value(table_to_queue::handle(table, queue, transformer.as_ref(), *kind).await?)?,
            Handler::QueueToNewStore { queue, newstore, kind } => {
                serde_json::to_value(queue_to_newstore::handle(queue, newstore, *kind).await?)?
            }
        };
        Ok(response)
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Error> {
    logger::init_lambda_logger();

    let integration = env::required("INTEGRATION")?;
    tracing::info!("🚀 Starting {} lambda", integration);

    let aws = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let handler = Handler::build(&integration, &aws).await.inspect_err(|e| {
        tracing::error!("❌ Cannot initialise {}: {}", integration, e);
    })?;

    let handler = &handler;
    run(service_fn(move |event: LambdaEvent<Value>| async move {
        handler.handle(event).await.map_err(|e| {
            tracing::error!("❌ Invocation failed: {} (retryable: {})", e, e.is_retryable());
            Error::from(e)
        })
    }))
    .await
}
