use std::{io::Cursor, sync::Arc, time::Duration};

use crate::{
    config::DEFAULT_MAX_FILE_SIZE,
    models::{CandidateFile, FaceBox, IntakeReport, IntakeWarning, ValidationOutcome},
    services::face_detector::{DetectorError, FaceDetector},
    utils::file::is_image_media_type,
};

/// Asks the user whether to continue when no face was found.
#[cfg_attr(test, mockall::automock)]
pub trait Confirm: Send + Sync {
    fn confirm_no_face(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacePolicy {
    /// Zero faces interrupts with a confirmation the user may override.
    Prompt,
    /// Zero faces rejects outright.
    Require,
}

#[derive(Debug, Clone)]
pub struct IntakeLimits {
    pub max_file_size: u64,
    pub min_dimension: u32,
    pub enforce_min_resolution: bool,
    pub face_policy: FacePolicy,
    pub detector_timeout: Duration,
}

impl Default for IntakeLimits {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE as u64,
            min_dimension: 512,
            enforce_min_resolution: false,
            face_policy: FacePolicy::Prompt,
            detector_timeout: Duration::from_secs(3),
        }
    }
}

/// Gate a photo passes before it is uploaded.
///
/// Checks run in order and stop at the first rejection: declared media type,
/// byte size, pixel dimensions, then face presence. Low resolution is only a
/// warning unless `enforce_min_resolution` is set. The face check fails open:
/// a detector that errors or times out lets the photo through.
pub struct IntakeValidator {
    limits: IntakeLimits,
    detector: Arc<dyn FaceDetector>,
}

impl IntakeValidator {
    pub fn new(limits: IntakeLimits, detector: Arc<dyn FaceDetector>) -> Self {
        Self { limits, detector }
    }

    pub async fn validate(&self, file: &CandidateFile, confirm: &dyn Confirm) -> IntakeReport {
        if !is_image_media_type(&file.media_type) {
            tracing::debug!(media_type = %file.media_type, "Rejected non-image file");
            return IntakeReport::rejected(ValidationOutcome::RejectedType);
        }

        if file.size() > self.limits.max_file_size {
            tracing::debug!(
                size = file.size(),
                limit = self.limits.max_file_size,
                "Rejected oversized file"
            );
            return IntakeReport::rejected(ValidationOutcome::RejectedSize);
        }

        let (width, height) = match read_dimensions(&file.bytes) {
            Ok(dimensions) => dimensions,
            Err(e) => {
                tracing::debug!("Declared image could not be decoded: {}", e);
                return IntakeReport::rejected(ValidationOutcome::RejectedType);
            }
        };

        let mut report = IntakeReport {
            outcome: ValidationOutcome::Accepted,
            dimensions: Some((width, height)),
            faces: None,
            warnings: Vec::new(),
        };

        let minimum = self.limits.min_dimension;
        if width < minimum || height < minimum {
            if self.limits.enforce_min_resolution {
                report.outcome = ValidationOutcome::RejectedResolution;
                return report;
            }
            tracing::warn!(width, height, minimum, "Photo resolution below recommended minimum");
            report
                .warnings
                .push(IntakeWarning::LowResolution { width, height, minimum });
        }

        match self.detect_faces(&file.bytes).await {
            Ok(faces) => {
                report.faces = Some(faces.len());
                if faces.is_empty() {
                    report.outcome = self.no_face_outcome(confirm, &mut report.warnings);
                }
            }
            Err(e) => {
                tracing::warn!("Skipping face check: {}", e);
                report.warnings.push(IntakeWarning::FaceCheckSkipped {
                    reason: e.to_string(),
                });
            }
        }

        report
    }

    async fn detect_faces(&self, image: &[u8]) -> Result<Vec<FaceBox>, DetectorError> {
        match tokio::time::timeout(self.limits.detector_timeout, self.detector.detect(image)).await {
            Ok(result) => result,
            Err(_) => Err(DetectorError::Timeout),
        }
    }

    fn no_face_outcome(
        &self,
        confirm: &dyn Confirm,
        warnings: &mut Vec<IntakeWarning>,
    ) -> ValidationOutcome {
        match self.limits.face_policy {
            FacePolicy::Require => ValidationOutcome::RejectedNoFaceConfirmed,
            FacePolicy::Prompt => {
                if confirm.confirm_no_face() {
                    warnings.push(IntakeWarning::NoFaceOverridden);
                    ValidationOutcome::Accepted
                } else {
                    ValidationOutcome::RejectedNoFaceUserCancelled
                }
            }
        }
    }
}

// Reads only the image header. The decoder is dropped before returning.
fn read_dimensions(bytes: &[u8]) -> image::ImageResult<(u32, u32)> {
    image::io::Reader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()
}
