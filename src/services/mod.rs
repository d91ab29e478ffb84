pub mod face_detector;
pub mod generator;
pub mod intake_validator;
pub mod metrics;
pub mod orchestrator;
pub mod prompt;
pub mod quota_ledger;
pub mod upload_store;

pub use self::face_detector::*;
pub use self::intake_validator::*;
pub use self::metrics::*;
pub use self::orchestrator::*;
pub use self::quota_ledger::*;
pub use self::upload_store::*;
