//! Turns an untrusted [`ActionRequest`] into a [`ValidatedAction`].
//!
//! `ValidatedAction` has no public constructor; holding one proves the
//! request named a catalog action and every value passed its constraint.

use crate::catalog::ActionCatalog;
use crate::error::{DispatchError, Result};
use crate::types::{
    ActionRequest, ActionSpec, IdempotencyClass, Invocation, LockScope, ParamKind, ParamSpec,
    ParamValue, Slot,
};
use serde::Serialize;
use std::collections::BTreeMap;

/// Rejected in every raw value, whatever the declared type.
pub const UNSAFE_CHARS: &[char] = &[';', '|', '&', '`', '$', '\n', '\r', '\0'];

// ---------------------------------------------------------------------------
// ValidatedAction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Plan {
    /// Argument vector passed to the runtime binary, verb first.
    Runtime { argv: Vec<String> },
    /// Render and write scaffold files.
    Scaffold,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidatedAction {
    name: &'static str,
    class: IdempotencyClass,
    values: BTreeMap<&'static str, ParamValue>,
    plan: Plan,
    resource_key: Option<String>,
}

impl ValidatedAction {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn class(&self) -> IdempotencyClass {
        self.class
    }

    pub fn value(&self, param: &str) -> Option<&ParamValue> {
        self.values.get(param)
    }

    pub fn values(&self) -> &BTreeMap<&'static str, ParamValue> {
        &self.values
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Runtime argument vector, or `None` for scaffold actions.
    pub fn argv(&self) -> Option<&[String]> {
        match &self.plan {
            Plan::Runtime { argv } => Some(argv),
            Plan::Scaffold => None,
        }
    }

    /// Lock key for mutating actions (`container:<name>`, `image:<ref>`).
    pub fn resource_key(&self) -> Option<&str> {
        self.resource_key.as_deref()
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

pub struct Validator<'a> {
    catalog: &'a ActionCatalog,
}

impl<'a> Validator<'a> {
    pub fn new(catalog: &'a ActionCatalog) -> Self {
        Self { catalog }
    }

    /// Check `request` against its catalog entry. No side effects.
    pub fn validate(&self, request: &ActionRequest) -> Result<ValidatedAction> {
        let spec = self
            .catalog
            .lookup(&request.action)
            .ok_or_else(|| DispatchError::UnknownAction(request.action.clone()))?;

        for (param, raw) in &request.params {
            check_safe(param, raw)?;
        }

        if let Some(unexpected) = request.params.keys().find(|k| spec.param(k).is_none()) {
            return Err(DispatchError::ConstraintViolation {
                param: unexpected.clone(),
                reason: format!("unexpected parameter for {}", spec.name),
            });
        }

        let argv_bound = matches!(spec.invocation, Invocation::Runtime(_));
        let mut values = BTreeMap::new();
        for param in &spec.params {
            let raw = match request.params.get(param.name) {
                Some(v) => v.as_str(),
                None => param.default.ok_or_else(|| DispatchError::MissingParameter {
                    action: spec.name.to_string(),
                    param: param.name.to_string(),
                })?,
            };
            let value = check_param(param, raw)?;
            if argv_bound {
                check_not_flag(param.name, &value)?;
            }
            values.insert(param.name, value);
        }

        let plan = match &spec.invocation {
            Invocation::Runtime(slots) => Plan::Runtime {
                argv: render(slots, &values)?,
            },
            Invocation::Scaffold => Plan::Scaffold,
        };
        let resource_key = resource_key(spec, &values);

        Ok(ValidatedAction {
            name: spec.name,
            class: spec.class,
            values,
            plan,
            resource_key,
        })
    }
}

/// Reject shell metacharacters and control characters.
pub fn check_safe(param: &str, raw: &str) -> Result<()> {
    if let Some(found) = raw.chars().find(|c| UNSAFE_CHARS.contains(c)) {
        return Err(DispatchError::UnsafeInput {
            param: param.to_string(),
            found: found.to_string(),
        });
    }
    Ok(())
}

fn check_param(param: &ParamSpec, raw: &str) -> Result<ParamValue> {
    let violation = |reason: String| DispatchError::ConstraintViolation {
        param: param.name.to_string(),
        reason,
    };

    match &param.kind {
        ParamKind::Int { min, max } => {
            let n: i64 = raw.parse().map_err(|_| DispatchError::TypeMismatch {
                param: param.name.to_string(),
                expected: "int".to_string(),
                value: raw.to_string(),
            })?;
            if n < *min || n > *max {
                return Err(violation(format!("{n} is outside {min}-{max}")));
            }
            Ok(ParamValue::Int(n))
        }
        ParamKind::Str {
            pattern,
            max_len,
            forbidden,
        } => {
            if raw.is_empty() {
                return Err(violation("must not be empty".to_string()));
            }
            if raw.chars().count() > *max_len {
                return Err(violation(format!("longer than {max_len} characters")));
            }
            if let Some(c) = raw.chars().find(|c| forbidden.contains(c)) {
                return Err(violation(format!("must not contain {c:?}")));
            }
            if let Some(re) = pattern {
                if !re.is_match(raw) {
                    return Err(violation(format!("must match {}", re.as_str())));
                }
            }
            Ok(ParamValue::Str(raw.to_string()))
        }
        ParamKind::Enum { choices } => {
            if !choices.contains(&raw) {
                return Err(violation(format!("must be one of {}", choices.join("|"))));
            }
            Ok(ParamValue::Str(raw.to_string()))
        }
    }
}

/// A value that lands in an argument vector must not read as an option.
fn check_not_flag(param: &str, value: &ParamValue) -> Result<()> {
    if value.as_str().is_some_and(|s| s.starts_with('-')) {
        return Err(DispatchError::ConstraintViolation {
            param: param.to_string(),
            reason: "must not start with '-'".to_string(),
        });
    }
    Ok(())
}

fn render(slots: &[Slot], values: &BTreeMap<&'static str, ParamValue>) -> Result<Vec<String>> {
    let get = |name: &str| {
        values
            .get(name)
            .map(|v| v.to_string())
            .ok_or_else(|| DispatchError::ConstraintViolation {
                param: name.to_string(),
                reason: "template slot has no value".to_string(),
            })
    };

    slots
        .iter()
        .map(|slot| match slot {
            Slot::Lit(s) => Ok(s.to_string()),
            Slot::Param(p) => get(p),
            Slot::Pair(a, b) => Ok(format!("{}:{}", get(a)?, get(b)?)),
        })
        .collect()
}

fn resource_key(spec: &ActionSpec, values: &BTreeMap<&'static str, ParamValue>) -> Option<String> {
    match spec.lock {
        LockScope::Unlocked => None,
        LockScope::Fixed(key) => Some(key.to_string()),
        LockScope::Container(p) => values.get(p).map(|v| format!("container:{v}")),
        LockScope::Image(p) => values
            .get(p)
            .map(|v| format!("image:{}", canonical_image(&v.to_string()))),
    }
}

/// Canonical form of an image reference, so every spelling of one image
/// shares a lock: `web`, `web:latest` and `docker.io/library/web:latest`
/// all become `web:latest`. Digest references are kept as given.
pub fn canonical_image(reference: &str) -> String {
    let name = reference
        .strip_prefix("docker.io/")
        .or_else(|| reference.strip_prefix("index.docker.io/"))
        .unwrap_or(reference);
    let name = name.strip_prefix("library/").unwrap_or(name);

    if name.contains('@') {
        return name.to_string();
    }
    // a colon before the last '/' is a registry port, not a tag
    let last = name.rsplit('/').next().unwrap_or(name);
    if last.contains(':') {
        name.to_string()
    } else {
        format!("{name}:latest")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::*;

    fn validate(req: ActionRequest) -> Result<ValidatedAction> {
        let catalog = ActionCatalog::builtin();
        Validator::new(&catalog).validate(&req)
    }

    fn run_request() -> ActionRequest {
        ActionRequest::new(RUN_CONTAINER)
            .param("image", "my-flask-app")
            .param("hostPort", "8080")
            .param("name", "c1")
    }

    #[test]
    fn run_container_argv_is_discrete() {
        let action = validate(run_request()).unwrap();
        assert_eq!(
            action.argv().unwrap(),
            ["run", "-d", "-p", "8080:5000", "--name", "c1", "my-flask-app"]
        );
        assert_eq!(action.resource_key(), Some("container:c1"));
        assert_eq!(action.class(), IdempotencyClass::Destructive);
    }

    #[test]
    fn explicit_container_port_overrides_default() {
        let action = validate(
            ActionRequest::new(RUN_CONTAINER)
                .param("image", "nginx:latest")
                .param("hostPort", "8081")
                .param("containerPort", "80")
                .param("name", "my-nginx-container"),
        )
        .unwrap();
        assert_eq!(action.argv().unwrap()[3], "8081:80");
        assert_eq!(action.value("containerPort"), Some(&ParamValue::Int(80)));
    }

    #[test]
    fn unknown_action_rejected() {
        let err = validate(ActionRequest::new("ExecShell").param("cmd", "ls")).unwrap_err();
        assert!(matches!(err, DispatchError::UnknownAction(ref n) if n == "ExecShell"));
    }

    #[test]
    fn metacharacters_rejected_for_every_type() {
        for bad in [";", "|", "&", "`", "$", "$(", "\n"] {
            for (param, base) in [("hostPort", "8080"), ("name", "c1"), ("image", "nginx")] {
                let req = run_request().param(param, format!("{base}{bad}x"));
                let err = validate(req).unwrap_err();
                assert!(
                    matches!(err, DispatchError::UnsafeInput { .. }),
                    "{param} with {bad:?} gave {err:?}"
                );
            }
        }
    }

    #[test]
    fn metacharacters_rejected_in_unknown_params_first() {
        let err = validate(run_request().param("cmd", "docker rm -f $(docker ps -q)")).unwrap_err();
        assert!(matches!(err, DispatchError::UnsafeInput { ref param, .. } if param == "cmd"));
    }

    #[test]
    fn unexpected_param_rejected() {
        let err = validate(run_request().param("privileged", "true")).unwrap_err();
        assert!(
            matches!(err, DispatchError::ConstraintViolation { ref param, .. } if param == "privileged")
        );
    }

    #[test]
    fn missing_parameter() {
        let err = validate(ActionRequest::new(STOP_CONTAINER)).unwrap_err();
        assert!(matches!(err, DispatchError::MissingParameter { ref param, .. } if param == "name"));
    }

    #[test]
    fn type_mismatch_on_non_numeric_port() {
        let err = validate(run_request().param("hostPort", "eighty")).unwrap_err();
        assert!(matches!(err, DispatchError::TypeMismatch { ref param, .. } if param == "hostPort"));
    }

    #[test]
    fn port_range_enforced() {
        for bad in ["0", "65536", "-1"] {
            let err = validate(run_request().param("hostPort", bad)).unwrap_err();
            assert!(
                matches!(err, DispatchError::ConstraintViolation { .. }),
                "{bad} gave {err:?}"
            );
        }
        assert!(validate(run_request().param("hostPort", "65535")).is_ok());
    }

    #[test]
    fn build_image_name_pattern() {
        let ok = validate(ActionRequest::new(BUILD_IMAGE).param("imageName", "my-flask-app")).unwrap();
        assert_eq!(ok.argv().unwrap(), ["build", "-t", "my-flask-app", "."]);
        assert_eq!(ok.resource_key(), Some("image:my-flask-app:latest"));

        let err = validate(ActionRequest::new(BUILD_IMAGE).param("imageName", "My App")).unwrap_err();
        assert!(matches!(err, DispatchError::ConstraintViolation { .. }));
    }

    #[test]
    fn leading_dash_never_reaches_argv() {
        let err = validate(ActionRequest::new(BUILD_IMAGE).param("imageName", "-q")).unwrap_err();
        assert!(matches!(err, DispatchError::ConstraintViolation { ref reason, .. } if reason.contains("'-'")));
    }

    #[test]
    fn pull_defaults_to_nginx() {
        let action = validate(ActionRequest::new(PULL_IMAGE)).unwrap();
        assert_eq!(action.argv().unwrap(), ["pull", "nginx:latest"]);
    }

    #[test]
    fn list_containers_takes_no_params() {
        let action = validate(ActionRequest::new(LIST_CONTAINERS)).unwrap();
        assert_eq!(action.argv().unwrap(), ["ps", "-a"]);
        assert_eq!(action.resource_key(), None);
    }

    #[test]
    fn create_app_defaults_and_quote_guard() {
        let action = validate(ActionRequest::new(CREATE_APP)).unwrap();
        assert_eq!(action.plan(), &Plan::Scaffold);
        assert_eq!(action.value("port"), Some(&ParamValue::Int(5000)));
        assert_eq!(
            action.value("message").and_then(|v| v.as_str()),
            Some(DEFAULT_APP_MESSAGE)
        );

        let err = validate(ActionRequest::new(CREATE_APP).param("message", "a\"\"\"b")).unwrap_err();
        assert!(matches!(err, DispatchError::ConstraintViolation { .. }));
    }

    #[test]
    fn empty_string_rejected() {
        let err = validate(ActionRequest::new(REMOVE_IMAGE).param("name", "")).unwrap_err();
        assert!(matches!(err, DispatchError::ConstraintViolation { .. }));
    }

    #[test]
    fn enum_membership() {
        let spec = ActionSpec {
            name: "Restart",
            summary: "test",
            params: vec![ParamSpec {
                name: "policy",
                kind: ParamKind::Enum {
                    choices: &["no", "always"],
                },
                default: None,
            }],
            class: IdempotencyClass::Destructive,
            invocation: Invocation::Runtime(vec![Slot::Lit("update"), Slot::Param("policy")]),
            lock: LockScope::Fixed("restart"),
        };
        let catalog = ActionCatalog::from_specs(vec![spec]).unwrap();
        let validator = Validator::new(&catalog);

        assert!(validator
            .validate(&ActionRequest::new("Restart").param("policy", "always"))
            .is_ok());
        let err = validator
            .validate(&ActionRequest::new("Restart").param("policy", "sometimes"))
            .unwrap_err();
        assert!(matches!(err, DispatchError::ConstraintViolation { .. }));
    }

    #[test]
    fn image_spellings_share_a_lock_key() {
        let build = validate(ActionRequest::new(BUILD_IMAGE).param("imageName", "web")).unwrap();
        let remove = validate(ActionRequest::new(REMOVE_IMAGE).param("name", "web:latest")).unwrap();
        assert_eq!(build.resource_key(), Some("image:web:latest"));
        assert_eq!(build.resource_key(), remove.resource_key());

        let pull = validate(ActionRequest::new(PULL_IMAGE).param("ref", "docker.io/library/nginx")).unwrap();
        assert_eq!(pull.resource_key(), Some("image:nginx:latest"));
        // the argv keeps the caller's spelling
        assert_eq!(pull.argv().unwrap(), ["pull", "docker.io/library/nginx"]);
    }

    #[test]
    fn canonical_image_forms() {
        assert_eq!(canonical_image("nginx"), "nginx:latest");
        assert_eq!(canonical_image("nginx:1.25"), "nginx:1.25");
        assert_eq!(canonical_image("library/redis:7"), "redis:7");
        assert_eq!(canonical_image("localhost:5000/app"), "localhost:5000/app:latest");
        assert_eq!(canonical_image("localhost:5000/app:1"), "localhost:5000/app:1");
        assert_eq!(canonical_image("ghcr.io/org/tool"), "ghcr.io/org/tool:latest");
        let digest = format!("nginx@sha256:{}", "a".repeat(64));
        assert_eq!(canonical_image(&digest), digest);
    }

    #[test]
    fn remove_image_accepts_digest_and_registry_refs() {
        let digest = format!("nginx@sha256:{}", "0f".repeat(32));
        let by_digest = validate(ActionRequest::new(REMOVE_IMAGE).param("name", digest.as_str())).unwrap();
        assert_eq!(by_digest.argv().unwrap(), ["rmi", digest.as_str()]);

        let pull = validate(ActionRequest::new(PULL_IMAGE).param("ref", "localhost:5000/app:1")).unwrap();
        assert_eq!(pull.resource_key(), Some("image:localhost:5000/app:1"));
    }
}
