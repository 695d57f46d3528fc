use crate::domain::ports::Pipeline;
use crate::utils::error::Result;
use std::time::Instant;

pub struct EtlEngine<P: Pipeline> {
    name: String,
    pipeline: P,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(name: &str, pipeline: P) -> Self {
        Self {
            name: name.to_string(),
            pipeline,
        }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub async fn run(&self) -> Result<P::Loaded> {
        let started = Instant::now();
        tracing::info!("🚀 Starting {}", self.name);

        // Extract
        tracing::debug!("Extracting data...");
        let raw_data = self.pipeline.extract().await.inspect_err(|e| {
            tracing::error!("❌ {} extract failed: {}", self.name, e);
        })?;

        // Transform
        tracing::debug!("Transforming data...");
        let transformed = self.pipeline.transform(raw_data).await.inspect_err(|e| {
            tracing::error!("❌ {} transform failed: {}", self.name, e);
        })?;

        // Load
        tracing::debug!("Loading data...");
        let loaded = self.pipeline.load(transformed).await.inspect_err(|e| {
            tracing::error!("❌ {} load failed: {}", self.name, e);
        })?;

        tracing::info!(
            "✅ {} completed in {} ms",
            self.name,
            started.elapsed().as_millis()
        );
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::IntegrationError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct CountingPipeline {
        fail_transform: bool,
        loaded: AtomicBool,
    }

    #[async_trait]
    impl Pipeline for CountingPipeline {
        type Extracted = Vec<u32>;
        type Transformed = u32;
        type Loaded = String;

        async fn extract(&self) -> Result<Vec<u32>> {
            Ok(vec![1, 2, 3])
        }

        async fn transform(&self, data: Vec<u32>) -> Result<u32> {
            if self.fail_transform {
                return Err(IntegrationError::processing("bad row"));
            }
            Ok(data.iter().sum())
        }

        async fn load(&self, result: u32) -> Result<String> {
            self.loaded.store(true, Ordering::SeqCst);
            Ok(format!("total={}", result))
        }
    }

    #[tokio::test]
    async fn test_engine_runs_all_stages() {
        let engine = EtlEngine::new(
            "counting",
            CountingPipeline {
                fail_transform: false,
                loaded: AtomicBool::new(false),
            },
        );
        assert_eq!(engine.run().await.unwrap(), "total=6");
        assert!(engine.pipeline().loaded.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_transform_failure_skips_load() {
        let engine = EtlEngine::new(
            "counting",
            CountingPipeline {
                fail_transform: true,
                loaded: AtomicBool::new(false),
            },
        );
        assert!(engine.run().await.is_err());
        assert!(!engine.pipeline().loaded.load(Ordering::SeqCst));
    }
}
