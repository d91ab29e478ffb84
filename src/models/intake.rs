use serde::{Deserialize, Serialize};

/// A file the user picked, before anything is sent to the server.
#[derive(Debug, Clone)]
pub struct CandidateFile {
    pub file_name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl CandidateFile {
    pub fn new(file_name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValidationOutcome {
    Accepted,
    RejectedType,
    RejectedSize,
    RejectedResolution,
    RejectedNoFaceConfirmed,
    RejectedNoFaceUserCancelled,
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationOutcome::Accepted)
    }

    pub fn message(&self) -> &'static str {
        match self {
            ValidationOutcome::Accepted => "Photo accepted",
            ValidationOutcome::RejectedType => "Only image files can be uploaded",
            ValidationOutcome::RejectedSize => "The photo is larger than the upload limit",
            ValidationOutcome::RejectedResolution => "The photo resolution is too low",
            ValidationOutcome::RejectedNoFaceConfirmed => "No face was found in the photo",
            ValidationOutcome::RejectedNoFaceUserCancelled => "Upload cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum IntakeWarning {
    LowResolution { width: u32, height: u32, minimum: u32 },
    FaceCheckSkipped { reason: String },
    NoFaceOverridden,
}

impl IntakeWarning {
    pub fn message(&self) -> String {
        match self {
            IntakeWarning::LowResolution { width, height, minimum } => format!(
                "photo is {}x{}, results are better at {}x{} or more",
                width, height, minimum, minimum
            ),
            IntakeWarning::FaceCheckSkipped { reason } => {
                format!("face check skipped ({}), the photo was not checked for a face", reason)
            }
            IntakeWarning::NoFaceOverridden => {
                "no face was detected, continuing as requested".to_string()
            }
        }
    }
}

/// Detector coordinates in pixels. Detectors may report fractional values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntakeReport {
    pub outcome: ValidationOutcome,
    pub dimensions: Option<(u32, u32)>,
    pub faces: Option<usize>,
    pub warnings: Vec<IntakeWarning>,
}

impl IntakeReport {
    pub fn rejected(outcome: ValidationOutcome) -> Self {
        Self {
            outcome,
            dimensions: None,
            faces: None,
            warnings: Vec::new(),
        }
    }

    pub fn has_warning(&self, predicate: impl Fn(&IntakeWarning) -> bool) -> bool {
        self.warnings.iter().any(predicate)
    }
}
