pub mod etl;
pub mod import_files;

pub use crate::domain::ports::{Pipeline, Storage};
pub use etl::EtlEngine;
