use thiserror::Error;

/// Hard errors: defects in configuration or in a check, never observed infrastructure state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InspectError {
    #[error("unrecognized severity `{0}` (expected success, warning, failure or info)")]
    UnrecognizedSeverity(String),

    #[error("malformed resource quantity `{0}`")]
    MalformedQuantity(String),

    #[error("no resource limit configured for workload `{0}`")]
    MissingLimit(String),
}
