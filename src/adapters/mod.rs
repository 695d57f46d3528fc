//! AWS SDK implementations of the domain ports.

pub mod dynamodb;
pub mod s3;
pub mod secrets;
pub mod sqs;
pub mod ssm;
pub mod step_functions;

pub use dynamodb::DynamoTable;
pub use s3::S3Storage;
pub use secrets::SecretsManager;
pub use sqs::SqsQueue;
pub use ssm::SsmParameters;
pub use step_functions::StepFunction;
