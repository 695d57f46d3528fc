// Domain layer: models and ports. Adapters live under `adapters` and `config`.

pub mod model;
pub mod ports;

#[doc(hidden)]
pub mod testing;
