use thiserror::Error;
use uuid::Uuid;

/// Engine-level error type.
///
/// Data-quality problems (unfittable text, missing optional fields, budget
/// exhaustion) never surface here — they are reported through
/// `ValidationResult` / `FixSummary`. Only construction-time configuration
/// faults and programmer-usage errors reach this enum.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Unknown template id: {0}")]
    UnknownTemplate(String),

    #[error("Model {model} does not contain box {box_id}")]
    UnknownBox { model: Uuid, box_id: Uuid },
}
