use crate::error::DispatchError;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// IdempotencyClass
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyClass {
    /// Read-only; may be re-run transparently once on a transient failure.
    SafeRetry,
    /// Changes or removes existing runtime state. Never retried by the core.
    Destructive,
    /// Produces new state (images, scaffold files).
    Create,
}

impl IdempotencyClass {
    pub fn as_str(self) -> &'static str {
        match self {
            IdempotencyClass::SafeRetry => "safe_retry",
            IdempotencyClass::Destructive => "destructive",
            IdempotencyClass::Create => "create",
        }
    }

    pub fn is_mutating(self) -> bool {
        !matches!(self, IdempotencyClass::SafeRetry)
    }

    pub fn auto_retry(self) -> bool {
        matches!(self, IdempotencyClass::SafeRetry)
    }
}

impl fmt::Display for IdempotencyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ParamKind / ParamSpec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum ParamKind {
    Str {
        pattern: Option<Regex>,
        max_len: usize,
        /// Characters rejected on top of the pattern.
        forbidden: &'static [char],
    },
    Int {
        min: i64,
        max: i64,
    },
    Enum {
        choices: &'static [&'static str],
    },
}

impl ParamKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamKind::Str { .. } => "string",
            ParamKind::Int { .. } => "int",
            ParamKind::Enum { .. } => "enum",
        }
    }

    /// Short human-readable constraint, used by `dockgate catalog`.
    pub fn describe(&self) -> String {
        match self {
            ParamKind::Str {
                pattern: Some(re), ..
            } => format!("string matching {}", re.as_str()),
            ParamKind::Str { max_len, .. } => format!("string (max {max_len} chars)"),
            ParamKind::Int { min, max } => format!("int {min}-{max}"),
            ParamKind::Enum { choices } => format!("one of {}", choices.join("|")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    /// Raw value used when the request omits the parameter.
    pub default: Option<&'static str>,
}

// ---------------------------------------------------------------------------
// Invocation template
// ---------------------------------------------------------------------------

/// One positional slot of a runtime argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    Lit(&'static str),
    Param(&'static str),
    /// Two parameters joined as `{a}:{b}` in a single argument (port maps).
    Pair(&'static str, &'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// `<runtime> <slots...>`
    Runtime(Vec<Slot>),
    /// Write pre-rendered scaffold files; no runtime call.
    Scaffold,
}

/// How a mutating action derives its resource key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockScope {
    Unlocked,
    Container(&'static str),
    Image(&'static str),
    Fixed(&'static str),
}

// ---------------------------------------------------------------------------
// ActionSpec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ActionSpec {
    pub name: &'static str,
    pub summary: &'static str,
    pub params: Vec<ParamSpec>,
    pub class: IdempotencyClass,
    pub invocation: Invocation,
    pub lock: LockScope,
}

impl ActionSpec {
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }
}

// ---------------------------------------------------------------------------
// ActionRequest
// ---------------------------------------------------------------------------

/// An untrusted request: action name plus raw string parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl ActionRequest {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

// ---------------------------------------------------------------------------
// ParamValue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Str(String),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            ParamValue::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(n) => Some(*n),
            ParamValue::Str(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(n) => write!(f, "{n}"),
            ParamValue::Str(s) => f.write_str(s),
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutionResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecOutcome {
    Exited { code: i32 },
    Timeout { limit_ms: u64 },
    RuntimeUnavailable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub outcome: ExecOutcome,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    /// Number of subprocess runs behind this result (2 after a transparent retry).
    pub attempts: u32,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        matches!(self.outcome, ExecOutcome::Exited { code: 0 })
    }

    pub fn exit_status(&self) -> Option<i32> {
        match self.outcome {
            ExecOutcome::Exited { code } => Some(code),
            _ => None,
        }
    }

    /// The execution-class error this result represents, if any.
    pub fn error(&self) -> Option<DispatchError> {
        match &self.outcome {
            ExecOutcome::Exited { code: 0 } => None,
            ExecOutcome::Exited { code } => Some(DispatchError::NonZeroExit {
                code: *code,
                stderr: self.stderr.trim().to_string(),
            }),
            ExecOutcome::Timeout { limit_ms } => Some(DispatchError::Timeout {
                limit_ms: *limit_ms,
            }),
            ExecOutcome::RuntimeUnavailable { reason } => {
                Some(DispatchError::RuntimeUnavailable(reason.clone()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// OutcomeClass
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeClass {
    Success,
    ValidationFailure,
    ExecutionFailure,
}

impl OutcomeClass {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeClass::Success => "success",
            OutcomeClass::ValidationFailure => "validation_failure",
            OutcomeClass::ExecutionFailure => "execution_failure",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(OutcomeClass::Success),
            "validation_failure" => Some(OutcomeClass::ValidationFailure),
            "execution_failure" => Some(OutcomeClass::ExecutionFailure),
            _ => None,
        }
    }
}

impl fmt::Display for OutcomeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// DispatchState
// ---------------------------------------------------------------------------

/// Per-request lifecycle.
///
/// `Received → Validating → Rejected | Executing → Completed | Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchState {
    Received,
    Validating,
    Rejected,
    Executing,
    Completed,
    Failed,
}

impl DispatchState {
    pub fn as_str(self) -> &'static str {
        match self {
            DispatchState::Received => "received",
            DispatchState::Validating => "validating",
            DispatchState::Rejected => "rejected",
            DispatchState::Executing => "executing",
            DispatchState::Completed => "completed",
            DispatchState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DispatchState::Rejected | DispatchState::Completed | DispatchState::Failed
        )
    }

    pub fn can_transition_to(self, next: DispatchState) -> bool {
        use DispatchState::*;
        matches!(
            (self, next),
            (Received, Validating)
                | (Received, Rejected)
                | (Validating, Rejected)
                | (Validating, Executing)
                | (Executing, Completed)
                | (Executing, Failed)
        )
    }

    pub fn outcome(self) -> Option<OutcomeClass> {
        match self {
            DispatchState::Rejected => Some(OutcomeClass::ValidationFailure),
            DispatchState::Completed => Some(OutcomeClass::Success),
            DispatchState::Failed => Some(OutcomeClass::ExecutionFailure),
            _ => None,
        }
    }

    /// CLI exit code for a terminal state.
    pub fn exit_code(self) -> i32 {
        match self {
            DispatchState::Completed => 0,
            DispatchState::Rejected => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AuditEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: uuid::Uuid,
    pub timestamp: DateTime<Utc>,
    pub request: ActionRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecutionResult>,
    pub outcome: OutcomeClass,
    /// Error kind and message for non-success outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
