/// Errors produced by pure domain logic.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Input failed a domain validation rule.
    #[error("Validation error: {0}")]
    Validation(String),
}
