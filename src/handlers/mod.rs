use std::sync::Arc;

use crate::{
    config::Config,
    services::{
        generator::{create_generator, ImageGenerator, ResultNormalizer},
        metrics::MetricsService,
        orchestrator::GenerationOrchestrator,
        quota_ledger::{Clock, QuotaLedger, SystemClock},
        upload_store::UploadStore,
    },
};

pub mod generate;
pub mod health;
pub mod metrics;
pub mod quota;
pub mod upload;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub uploads: Arc<UploadStore>,
    pub ledger: Arc<QuotaLedger>,
    pub orchestrator: Arc<GenerationOrchestrator>,
    pub metrics: Arc<MetricsService>,
}

impl AppState {
    /// Wires the production services described by `config`.
    pub async fn build(config: Config, metrics: Arc<MetricsService>) -> anyhow::Result<Self> {
        let generator = create_generator(&config)?;
        Self::with_parts(config, generator, Arc::new(SystemClock), metrics).await
    }

    pub async fn with_parts(
        config: Config,
        generator: Arc<dyn ImageGenerator>,
        clock: Arc<dyn Clock>,
        metrics: Arc<MetricsService>,
    ) -> anyhow::Result<Self> {
        let uploads = Arc::new(
            UploadStore::new(&config.upload_dir, config.max_file_size).await?,
        );
        let ledger = Arc::new(QuotaLedger::new(
            &config.quota_file,
            config.daily_generation_cap,
            clock,
        ));
        let normalizer = ResultNormalizer::new(config.generation_timeout(), config.max_result_size())?;

        let orchestrator = Arc::new(GenerationOrchestrator::new(
            config.generation_enabled,
            ledger.clone(),
            uploads.clone(),
            generator,
            normalizer,
            config.generation_timeout(),
            metrics.clone(),
        ));

        Ok(Self {
            config,
            uploads,
            ledger,
            orchestrator,
            metrics,
        })
    }
}
