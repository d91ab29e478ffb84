use std::{sync::Arc, time::Duration};

use crate::{
    models::{GeneratedImage, GenerationFailure, GenerationResult},
    services::{
        generator::{ImageGenerator, ProviderError, ResultNormalizer, SourceImage},
        metrics::MetricsService,
        prompt::MEMORIAL_PORTRAIT_PROMPT,
        quota_ledger::{QuotaDecision, QuotaLedger},
        upload_store::{UploadLease, UploadStore},
    },
};

/// Runs one generation request: quota, uploaded photo, provider, cleanup.
///
/// Once the session's upload has been taken from the store, its file is
/// deleted before `generate` returns, whatever the outcome. Quota is only
/// committed after the provider produced a usable image.
pub struct GenerationOrchestrator {
    enabled: bool,
    ledger: Arc<QuotaLedger>,
    uploads: Arc<UploadStore>,
    generator: Arc<dyn ImageGenerator>,
    normalizer: ResultNormalizer,
    timeout: Duration,
    metrics: Arc<MetricsService>,
}

impl GenerationOrchestrator {
    pub fn new(
        enabled: bool,
        ledger: Arc<QuotaLedger>,
        uploads: Arc<UploadStore>,
        generator: Arc<dyn ImageGenerator>,
        normalizer: ResultNormalizer,
        timeout: Duration,
        metrics: Arc<MetricsService>,
    ) -> Self {
        Self {
            enabled,
            ledger,
            uploads,
            generator,
            normalizer,
            timeout,
            metrics,
        }
    }

    pub async fn generate(&self, session: &str) -> GenerationResult {
        let result = self.run(session).await;

        match &result {
            Ok(image) => {
                self.metrics.record_generation("success");
                tracing::info!(
                    provider = self.generator.name(),
                    mime = %image.mime_type,
                    size = image.bytes.len(),
                    "Portrait generated"
                );
            }
            Err(failure) => {
                self.metrics.record_generation(failure.kind());
                tracing::warn!(kind = failure.kind(), "Portrait generation failed: {}", failure);
            }
        }

        result
    }

    async fn run(&self, session: &str) -> GenerationResult {
        if !self.enabled {
            return Err(GenerationFailure::ServiceDisabled);
        }

        let reservation = match self.ledger.check_and_reserve().await {
            Ok(QuotaDecision::Allowed(reservation)) => reservation,
            Ok(QuotaDecision::Denied { .. }) => return Err(GenerationFailure::QuotaExceeded),
            Err(e) => return Err(GenerationFailure::QuotaLedger(e.to_string())),
        };

        // Dropping the reservation on any early return gives the slot back
        let lease = self
            .uploads
            .take(session)
            .await
            .ok_or(GenerationFailure::NoUploadedFile)?;

        let outcome = self.generate_from(&lease).await;
        lease.release().await;
        let image = outcome?;

        self.ledger
            .commit(reservation)
            .await
            .map_err(|e| GenerationFailure::QuotaLedger(e.to_string()))?;

        Ok(image)
    }

    async fn generate_from(&self, lease: &UploadLease) -> GenerationResult {
        let upload = lease.upload();
        let bytes = lease.read().await.map_err(|e| {
            tracing::error!(filename = %upload.filename, "Uploaded file unreadable: {}", e);
            GenerationFailure::FileMissing
        })?;

        let source = SourceImage {
            filename: upload.filename.clone(),
            mime_type: upload.mime_type.clone(),
            bytes,
        };

        tracing::info!(
            provider = self.generator.name(),
            filename = %source.filename,
            "Calling image provider"
        );

        match tokio::time::timeout(self.timeout, self.call_provider(&source)).await {
            Ok(Ok(image)) => Ok(image),
            Ok(Err(e)) => Err(GenerationFailure::GenerationError(e.to_string())),
            Err(_) => Err(GenerationFailure::GenerationError(format!(
                "image provider did not respond within {}s",
                self.timeout.as_secs()
            ))),
        }
    }

    async fn call_provider(&self, source: &SourceImage) -> Result<GeneratedImage, ProviderError> {
        let output = self.generator.generate(source, MEMORIAL_PORTRAIT_PROMPT).await?;
        self.normalizer.normalize(output).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        services::{generator::ProviderOutput, quota_ledger::FixedClock},
        utils::test_support::jpeg_bytes,
    };
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };
    use tempfile::{tempdir, TempDir};

    enum Script {
        Succeed,
        Fail,
        Stall,
        Panic,
    }

    struct ScriptedGenerator {
        script: Script,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ImageGenerator for ScriptedGenerator {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn generate(&self, _source: &SourceImage, prompt: &str) -> Result<ProviderOutput, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            match self.script {
                Script::Succeed => Ok(ProviderOutput::Bytes {
                    data: jpeg_bytes(8, 8),
                    mime_type: None,
                }),
                Script::Fail => Err(ProviderError::Status {
                    status: 502,
                    message: "upstream unavailable".to_string(),
                }),
                Script::Stall => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Err(ProviderError::EmptyResponse)
                }
                Script::Panic => panic!("provider client crashed"),
            }
        }
    }

    struct Fixture {
        _dir: TempDir,
        ledger: Arc<QuotaLedger>,
        uploads: Arc<UploadStore>,
        generator: Arc<ScriptedGenerator>,
        orchestrator: GenerationOrchestrator,
    }

    async fn fixture(script: Script, enabled: bool) -> Fixture {
        let dir = tempdir().unwrap();
        let clock = Arc::new(FixedClock::new(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()));
        let ledger = Arc::new(QuotaLedger::new(dir.path().join("quota.json"), 2, clock));
        let uploads = Arc::new(
            UploadStore::new(dir.path().join("uploads"), 1024 * 1024)
                .await
                .unwrap(),
        );
        let generator = ScriptedGenerator::new(script);
        let orchestrator = GenerationOrchestrator::new(
            enabled,
            ledger.clone(),
            uploads.clone(),
            generator.clone(),
            ResultNormalizer::new(Duration::from_secs(5), 1024 * 1024).unwrap(),
            Duration::from_millis(200),
            Arc::new(MetricsService::detached()),
        );

        Fixture {
            _dir: dir,
            ledger,
            uploads,
            generator,
            orchestrator,
        }
    }

    fn upload_dir_is_empty(uploads: &UploadStore) -> bool {
        std::fs::read_dir(uploads.base_path()).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_success_commits_quota_and_deletes_upload() {
        let f = fixture(Script::Succeed, true).await;
        let upload = f.uploads.store("s", &jpeg_bytes(16, 16), None).await.unwrap();

        let image = f.orchestrator.generate("s").await.unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
        assert!(!upload.path.exists());
        assert!(f.uploads.current("s").await.is_none());
        assert_eq!(f.ledger.status().await.unwrap().used, 1);
        assert_eq!(
            f.generator.prompts.lock().unwrap().as_slice(),
            &[MEMORIAL_PORTRAIT_PROMPT.to_string()]
        );
    }

    #[tokio::test]
    async fn test_provider_failure_cleans_up_without_consuming_quota() {
        let f = fixture(Script::Fail, true).await;
        let upload = f.uploads.store("s", &jpeg_bytes(16, 16), None).await.unwrap();

        let failure = f.orchestrator.generate("s").await.unwrap_err();
        match failure {
            GenerationFailure::GenerationError(message) => {
                assert!(message.contains("upstream unavailable"))
            }
            other => panic!("unexpected failure: {:?}", other),
        }
        assert!(!upload.path.exists());
        assert!(upload_dir_is_empty(&f.uploads));

        let status = f.ledger.status().await.unwrap();
        assert_eq!(status.used, 0);
        assert_eq!(status.in_flight, 0);
    }

    #[tokio::test]
    async fn test_timeout_is_a_generation_error() {
        let f = fixture(Script::Stall, true).await;
        let upload = f.uploads.store("s", &jpeg_bytes(16, 16), None).await.unwrap();

        let failure = f.orchestrator.generate("s").await.unwrap_err();
        assert_eq!(failure.kind(), "generation_error");
        assert!(!upload.path.exists());
        assert_eq!(f.ledger.status().await.unwrap().used, 0);
    }

    #[tokio::test]
    async fn test_panicking_provider_still_deletes_upload() {
        let f = fixture(Script::Panic, true).await;
        let upload = f.uploads.store("s", &jpeg_bytes(16, 16), None).await.unwrap();

        let orchestrator = Arc::new(f.orchestrator);
        let task = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.generate("s").await })
        };
        assert!(task.await.unwrap_err().is_panic());

        assert!(!upload.path.exists());
        let status = f.ledger.status().await.unwrap();
        assert_eq!(status.used, 0);
        assert_eq!(status.in_flight, 0);
    }

    #[tokio::test]
    async fn test_missing_file_reported() {
        let f = fixture(Script::Succeed, true).await;
        let upload = f.uploads.store("s", &jpeg_bytes(16, 16), None).await.unwrap();
        std::fs::remove_file(&upload.path).unwrap();

        assert_eq!(
            f.orchestrator.generate("s").await,
            Err(GenerationFailure::FileMissing)
        );
        assert_eq!(f.generator.calls.load(Ordering::SeqCst), 0);
        assert!(f.uploads.current("s").await.is_none());
    }

    #[tokio::test]
    async fn test_early_outs_leave_slot_and_ledger_alone() {
        let f = fixture(Script::Succeed, false).await;
        let upload = f.uploads.store("s", &jpeg_bytes(16, 16), None).await.unwrap();

        assert_eq!(
            f.orchestrator.generate("s").await,
            Err(GenerationFailure::ServiceDisabled)
        );
        assert!(upload.path.exists());
        assert!(f.uploads.current("s").await.is_some());

        let f = fixture(Script::Succeed, true).await;
        assert_eq!(
            f.orchestrator.generate("nobody").await,
            Err(GenerationFailure::NoUploadedFile)
        );
        let status = f.ledger.status().await.unwrap();
        assert_eq!(status.used, 0);
        assert_eq!(status.in_flight, 0);
    }

    #[tokio::test]
    async fn test_quota_exceeded_skips_provider_and_keeps_slot() {
        let f = fixture(Script::Succeed, true).await;
        for _ in 0..2 {
            f.uploads.store("s", &jpeg_bytes(16, 16), None).await.unwrap();
            f.orchestrator.generate("s").await.unwrap();
        }
        assert_eq!(f.generator.calls.load(Ordering::SeqCst), 2);

        let upload = f.uploads.store("s", &jpeg_bytes(16, 16), None).await.unwrap();
        assert_eq!(
            f.orchestrator.generate("s").await,
            Err(GenerationFailure::QuotaExceeded)
        );
        assert_eq!(f.generator.calls.load(Ordering::SeqCst), 2);
        assert!(upload.path.exists());
    }
}
