//! Drives one request through validation, execution, and the audit log.
//!
//! ```text
//! Received → Validating → Rejected
//!                       → Executing → Completed | Failed
//! ```
//!
//! [`Dispatcher::dispatch`] never returns an error and never panics on bad
//! input: every failure is folded into the returned [`DispatchResult`], and
//! every terminal state appends exactly one [`AuditEntry`].

use crate::audit::AuditLog;
use crate::catalog::ActionCatalog;
use crate::error::{DispatchError, Result};
use crate::executor::Executor;
use crate::locks::{self, ResourceLocks};
use crate::types::{
    ActionRequest, AuditEntry, DispatchState, ExecutionResult, OutcomeClass,
};
use crate::validator::{ValidatedAction, Validator};
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// CancelToken
// ---------------------------------------------------------------------------

/// Shared cancellation flag. Cancelling before execution starts rejects the
/// request; cancelling later is only reported, the subprocess is not killed.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// DispatchResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct DispatchResult {
    pub action: String,
    pub state: DispatchState,
    pub outcome: OutcomeClass,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecutionResult>,
    /// The caller may resubmit; the dispatcher itself never does.
    pub retryable: bool,
    /// Cancellation was requested while the action was already running.
    pub cancelled_after_start: bool,
    pub audit_id: Uuid,
}

impl DispatchResult {
    pub fn exit_code(&self) -> i32 {
        self.state.exit_code()
    }

    pub fn is_success(&self) -> bool {
        self.state == DispatchState::Completed
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct Dispatcher<E> {
    catalog: ActionCatalog,
    executor: E,
    audit: Arc<AuditLog>,
    locks: ResourceLocks,
}

impl<E: Executor> Dispatcher<E> {
    pub fn new(catalog: ActionCatalog, executor: E, audit: impl Into<Arc<AuditLog>>) -> Self {
        Self {
            catalog,
            executor,
            audit: audit.into(),
            locks: ResourceLocks::new(),
        }
    }

    pub fn catalog(&self) -> &ActionCatalog {
        &self.catalog
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// Validate without executing or recording anything.
    pub fn plan(&self, request: &ActionRequest) -> Result<ValidatedAction> {
        Validator::new(&self.catalog).validate(request)
    }

    pub fn dispatch(&self, request: &ActionRequest) -> DispatchResult {
        self.dispatch_with(request, &CancelToken::new())
    }

    pub fn dispatch_with(&self, request: &ActionRequest, cancel: &CancelToken) -> DispatchResult {
        let mut state = DispatchState::Received;
        debug!(action = %request.action, params = request.params.len(), "request received");

        if cancel.is_cancelled() {
            return self.reject(request, &mut state, DispatchError::Cancelled);
        }

        transition(&mut state, DispatchState::Validating, &request.action);
        let action = match Validator::new(&self.catalog).validate(request) {
            Ok(action) => action,
            Err(e) => return self.reject(request, &mut state, e),
        };

        // Held through execute and audit append: the next holder of this key
        // sees this request's terminal entry.
        let slot = action.resource_key().map(|key| self.locks.slot(key));
        let _guard = slot.as_deref().map(locks::acquire);
        if let Some(key) = action.resource_key() {
            debug!(action = action.name(), key, "resource lock acquired");
        }

        if cancel.is_cancelled() {
            return self.reject(request, &mut state, DispatchError::Cancelled);
        }

        transition(&mut state, DispatchState::Executing, &request.action);
        let result = self.executor.execute(&action);
        let cancelled_after_start = cancel.is_cancelled();

        let (next, error) = match result.error() {
            None => (DispatchState::Completed, None),
            Some(e) => (DispatchState::Failed, Some(e)),
        };
        transition(&mut state, next, &request.action);

        let message = match &error {
            None => format!("{} completed in {}ms", action.name(), result.duration_ms),
            Some(e) => format!("{} failed: {e}", action.name()),
        };
        let reason = error.as_ref().map(|e| format!("{}: {e}", e.kind()));
        let outcome = outcome_of(state);
        let audit_id = self.record(request, Some(result.clone()), outcome, reason);

        info!(
            action = action.name(),
            state = %state,
            attempts = result.attempts,
            duration_ms = result.duration_ms,
            "dispatch finished"
        );
        if cancelled_after_start {
            warn!(action = action.name(), "cancel requested after execution started");
        }

        DispatchResult {
            action: request.action.clone(),
            state,
            outcome,
            message,
            error_kind: error.as_ref().map(DispatchError::kind),
            result: Some(result),
            retryable: state == DispatchState::Failed,
            cancelled_after_start,
            audit_id,
        }
    }

    fn reject(
        &self,
        request: &ActionRequest,
        state: &mut DispatchState,
        error: DispatchError,
    ) -> DispatchResult {
        transition(state, DispatchState::Rejected, &request.action);
        let reason = format!("{}: {error}", error.kind());
        let audit_id = self.record(
            request,
            None,
            OutcomeClass::ValidationFailure,
            Some(reason),
        );
        info!(action = %request.action, kind = error.kind(), "request rejected");

        DispatchResult {
            action: request.action.clone(),
            state: *state,
            outcome: OutcomeClass::ValidationFailure,
            message: format!("rejected: {error}"),
            error_kind: Some(error.kind()),
            result: None,
            retryable: false,
            cancelled_after_start: false,
            audit_id,
        }
    }

    /// Append the terminal entry. A persistence failure is logged and
    /// otherwise ignored; the in-memory record is always kept.
    fn record(
        &self,
        request: &ActionRequest,
        result: Option<ExecutionResult>,
        outcome: OutcomeClass,
        reason: Option<String>,
    ) -> Uuid {
        let entry = AuditEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            request: request.clone(),
            result,
            outcome,
            reason,
        };
        let id = entry.id;
        if let Err(e) = self.audit.append(entry) {
            warn!(action = %request.action, "audit entry not persisted: {e}");
        }
        id
    }
}

fn transition(state: &mut DispatchState, next: DispatchState, action: &str) {
    debug_assert!(
        state.can_transition_to(next),
        "illegal transition {state} -> {next}"
    );
    debug!(action, from = %state, to = %next, "state transition");
    *state = next;
}

fn outcome_of(state: DispatchState) -> OutcomeClass {
    state.outcome().unwrap_or(OutcomeClass::ExecutionFailure)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
