//! Error and status types for shadow-table hooks

/// Status code reported by a [`ShadowHook`](crate::hook::ShadowHook)
///
/// Mirrors the last completed operation. Errors carry richer detail through
/// [`HookError`]; this enumeration stays queryable for callers that poll
/// state instead of handling results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStatus {
    /// Construction validated the inputs and snapshotted the table
    Initialized,

    /// Last install or restore succeeded
    HookSuccess,

    /// Last install or restore failed
    HookFail,

    /// Object base address was null
    BadBase,

    /// Slot index was outside the table
    BadIndex,

    /// Replacement function address was null
    BadFunction,

    /// Table scan found no entries
    BadFunctionCount,
}

/// Error type for hook operations
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("Object base address is null")]
    BadBase,

    #[error("Replacement function address is null")]
    BadFunction,

    #[error("Dispatch table is empty")]
    BadFunctionCount,

    #[error("Slot index {index} is out of range for a table of {count} entries")]
    BadIndex { index: usize, count: usize },

    #[error("No hook is installed")]
    NotInstalled,

    #[error("Memory protection failed: {0}")]
    Protection(String),

    #[error("Hook not found")]
    NotFound,

    #[error("Slot already has a hook installed")]
    SlotBusy,
}

impl HookError {
    /// Status code equivalent of this error
    pub fn as_status(&self) -> HookStatus {
        match self {
            HookError::BadBase => HookStatus::BadBase,
            HookError::BadFunction => HookStatus::BadFunction,
            HookError::BadFunctionCount => HookStatus::BadFunctionCount,
            HookError::BadIndex { .. } => HookStatus::BadIndex,
            _ => HookStatus::HookFail,
        }
    }
}
