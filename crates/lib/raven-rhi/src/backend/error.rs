use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RHIError {
    #[error("Allocation failed for {name:?}: {error}")]
    AllocationFailure {
        name: String,
        error: String,
    },

    #[error("Out of device memory budget while allocating {name:?}: requested {requested} bytes, {available} bytes left")]
    OutOfBudget {
        name: String,
        requested: u64,
        available: u64,
    },

    #[error("Invalid descriptor for {name:?}: {reason}")]
    InvalidDescriptor {
        name: String,
        reason: &'static str,
    },
}
