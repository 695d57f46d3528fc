pub mod circleci;
pub mod newstore;
pub mod shopify;
pub mod token;

pub use circleci::CircleCiClient;
pub use newstore::{InvocationContext, NewStoreClient};
