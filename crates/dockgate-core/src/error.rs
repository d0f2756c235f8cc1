use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("missing parameter '{param}' for {action}")]
    MissingParameter { action: String, param: String },

    #[error("parameter '{param}' expects {expected}, got '{value}'")]
    TypeMismatch {
        param: String,
        expected: String,
        value: String,
    },

    #[error("parameter '{param}' rejected: {reason}")]
    ConstraintViolation { param: String, reason: String },

    #[error("parameter '{param}' contains shell metacharacter {found:?}")]
    UnsafeInput { param: String, found: String },

    #[error("request cancelled before execution")]
    Cancelled,

    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    #[error("timed out after {limit_ms}ms")]
    Timeout { limit_ms: u64 },

    #[error("exited with code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl DispatchError {
    /// Validation-class errors never reach the runtime; the dispatcher
    /// reports them as `Rejected`.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DispatchError::UnknownAction(_)
                | DispatchError::MissingParameter { .. }
                | DispatchError::TypeMismatch { .. }
                | DispatchError::ConstraintViolation { .. }
                | DispatchError::UnsafeInput { .. }
                | DispatchError::Cancelled
        )
    }

    /// Stable snake_case name used in audit records and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::UnknownAction(_) => "unknown_action",
            DispatchError::MissingParameter { .. } => "missing_parameter",
            DispatchError::TypeMismatch { .. } => "type_mismatch",
            DispatchError::ConstraintViolation { .. } => "constraint_violation",
            DispatchError::UnsafeInput { .. } => "unsafe_input",
            DispatchError::Cancelled => "cancelled",
            DispatchError::RuntimeUnavailable(_) => "runtime_unavailable",
            DispatchError::Timeout { .. } => "timeout",
            DispatchError::NonZeroExit { .. } => "non_zero_exit",
            DispatchError::Io(_) => "io",
            DispatchError::Yaml(_) => "yaml",
            DispatchError::Json(_) => "json",
        }
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
