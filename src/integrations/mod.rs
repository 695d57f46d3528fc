//! One module per Lambda integration. Each exposes a `Settings::from_env`
//! and a `handle` entry point the `lambda` binary dispatches to.

pub mod auth_token;
pub mod availability_import;
pub mod csv_split;
pub mod historical;
pub mod import_queue;
pub mod newstore_import;
pub mod price_import;
