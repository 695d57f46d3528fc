#[cfg(feature = "cli")]
pub mod cli;
pub mod env;
pub mod local;
pub mod param_store;

#[cfg(feature = "cli")]
pub use cli::CliConfig;
pub use local::{LocalParameters, LocalStorage};
pub use param_store::{NewStoreConfig, ParamStore};
