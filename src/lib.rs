#[cfg(feature = "lambda")]
pub mod adapters;
pub mod ci;
pub mod clients;
pub mod config;
pub mod core;
pub mod domain;
pub mod integrations;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::{LocalStorage, NewStoreConfig, ParamStore};

pub use clients::{CircleCiClient, InvocationContext, NewStoreClient};
pub use core::EtlEngine;
pub use utils::error::{IntegrationError, Result};
