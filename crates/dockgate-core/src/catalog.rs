//! The closed set of actions the dispatcher will run.
//!
//! An action missing from the catalog cannot be executed: every runtime call
//! is rendered from an [`Invocation`] template, never from caller text.

use crate::types::{ActionSpec, IdempotencyClass, Invocation, LockScope, ParamKind, ParamSpec, Slot};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

pub const CREATE_APP: &str = "CreateApp";
pub const BUILD_IMAGE: &str = "BuildImage";
pub const PULL_IMAGE: &str = "PullImage";
pub const RUN_CONTAINER: &str = "RunContainer";
pub const STOP_CONTAINER: &str = "StopContainer";
pub const REMOVE_CONTAINER: &str = "RemoveContainer";
pub const LIST_CONTAINERS: &str = "ListContainers";
pub const REMOVE_IMAGE: &str = "RemoveImage";

pub const DEFAULT_APP_MESSAGE: &str = "Hello, World! From Flask container";
pub const DEFAULT_APP_PORT: &str = "5000";
pub const DEFAULT_PULL_REF: &str = "nginx:latest";
pub const DEFAULT_CONTAINER_PORT: &str = "5000";

const NAME_MAX: usize = 128;
const MESSAGE_MAX: usize = 200;

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

static IMAGE_NAME_RE: OnceLock<Regex> = OnceLock::new();
static IMAGE_REF_RE: OnceLock<Regex> = OnceLock::new();
static CONTAINER_NAME_RE: OnceLock<Regex> = OnceLock::new();

fn image_name_re() -> &'static Regex {
    IMAGE_NAME_RE.get_or_init(|| Regex::new(r"^[a-z0-9_.-]+$").unwrap())
}

/// `[host[:port]/]path[:tag][@sha256:digest]`, every segment starting alphanumeric.
fn image_ref_re() -> &'static Regex {
    IMAGE_REF_RE.get_or_init(|| {
        Regex::new(concat!(
            r"^(?:[a-z0-9][a-z0-9.-]*(?::[0-9]{1,5})?/)?",
            r"[a-z0-9][a-z0-9_.-]*(?:/[a-z0-9][a-z0-9_.-]*)*",
            r"(?::[A-Za-z0-9_][A-Za-z0-9_.-]*)?",
            r"(?:@sha256:[a-f0-9]{64})?$",
        ))
        .unwrap()
    })
}

fn container_name_re() -> &'static Regex {
    CONTAINER_NAME_RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]*$").unwrap())
}

// ---------------------------------------------------------------------------
// Parameter builders
// ---------------------------------------------------------------------------

fn port(name: &'static str, default: Option<&'static str>) -> ParamSpec {
    ParamSpec {
        name,
        kind: ParamKind::Int { min: 1, max: 65535 },
        default,
    }
}

fn container_name(name: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        kind: ParamKind::Str {
            pattern: Some(container_name_re().clone()),
            max_len: NAME_MAX,
            forbidden: &[],
        },
        default: None,
    }
}

fn image_ref(name: &'static str, default: Option<&'static str>) -> ParamSpec {
    ParamSpec {
        name,
        kind: ParamKind::Str {
            pattern: Some(image_ref_re().clone()),
            max_len: NAME_MAX,
            forbidden: &[],
        },
        default,
    }
}

// ---------------------------------------------------------------------------
// ActionCatalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ActionCatalog {
    specs: Vec<ActionSpec>,
}

impl ActionCatalog {
    /// Build a catalog from explicit specs. Returns `None` if two specs share a name.
    pub fn from_specs(specs: Vec<ActionSpec>) -> Option<Self> {
        let mut seen = HashSet::new();
        if !specs.iter().all(|s| seen.insert(s.name)) {
            return None;
        }
        Some(Self { specs })
    }

    /// The Docker management actions.
    pub fn builtin() -> Self {
        let specs = vec![
            ActionSpec {
                name: CREATE_APP,
                summary: "Write Flask app files (app.py, requirements.txt, Dockerfile)",
                params: vec![
                    ParamSpec {
                        name: "message",
                        kind: ParamKind::Str {
                            pattern: None,
                            max_len: MESSAGE_MAX,
                            // the message lands inside a Python string literal
                            forbidden: &['"', '\\'],
                        },
                        default: Some(DEFAULT_APP_MESSAGE),
                    },
                    port("port", Some(DEFAULT_APP_PORT)),
                ],
                class: IdempotencyClass::Create,
                invocation: Invocation::Scaffold,
                lock: LockScope::Fixed("scaffold"),
            },
            ActionSpec {
                name: BUILD_IMAGE,
                summary: "Build an image from the scaffold directory",
                params: vec![ParamSpec {
                    name: "imageName",
                    kind: ParamKind::Str {
                        pattern: Some(image_name_re().clone()),
                        max_len: NAME_MAX,
                        forbidden: &[],
                    },
                    default: None,
                }],
                class: IdempotencyClass::Create,
                invocation: Invocation::Runtime(vec![
                    Slot::Lit("build"),
                    Slot::Lit("-t"),
                    Slot::Param("imageName"),
                    Slot::Lit("."),
                ]),
                lock: LockScope::Image("imageName"),
            },
            ActionSpec {
                name: PULL_IMAGE,
                summary: "Pull an image from the registry",
                params: vec![image_ref("ref", Some(DEFAULT_PULL_REF))],
                class: IdempotencyClass::Create,
                invocation: Invocation::Runtime(vec![Slot::Lit("pull"), Slot::Param("ref")]),
                lock: LockScope::Image("ref"),
            },
            ActionSpec {
                name: RUN_CONTAINER,
                summary: "Start a detached container with one published port",
                params: vec![
                    image_ref("image", None),
                    port("hostPort", None),
                    port("containerPort", Some(DEFAULT_CONTAINER_PORT)),
                    container_name("name"),
                ],
                class: IdempotencyClass::Destructive,
                invocation: Invocation::Runtime(vec![
                    Slot::Lit("run"),
                    Slot::Lit("-d"),
                    Slot::Lit("-p"),
                    Slot::Pair("hostPort", "containerPort"),
                    Slot::Lit("--name"),
                    Slot::Param("name"),
                    Slot::Param("image"),
                ]),
                lock: LockScope::Container("name"),
            },
            ActionSpec {
                name: STOP_CONTAINER,
                summary: "Stop a running container",
                params: vec![container_name("name")],
                class: IdempotencyClass::Destructive,
                invocation: Invocation::Runtime(vec![Slot::Lit("stop"), Slot::Param("name")]),
                lock: LockScope::Container("name"),
            },
            ActionSpec {
                name: REMOVE_CONTAINER,
                summary: "Remove a stopped container",
                params: vec![container_name("name")],
                class: IdempotencyClass::Destructive,
                invocation: Invocation::Runtime(vec![Slot::Lit("rm"), Slot::Param("name")]),
                lock: LockScope::Container("name"),
            },
            ActionSpec {
                name: LIST_CONTAINERS,
                summary: "List running and stopped containers",
                params: vec![],
                class: IdempotencyClass::SafeRetry,
                invocation: Invocation::Runtime(vec![Slot::Lit("ps"), Slot::Lit("-a")]),
                lock: LockScope::Unlocked,
            },
            ActionSpec {
                name: REMOVE_IMAGE,
                summary: "Remove an image by name or id",
                params: vec![image_ref("name", None)],
                class: IdempotencyClass::Destructive,
                invocation: Invocation::Runtime(vec![Slot::Lit("rmi"), Slot::Param("name")]),
                lock: LockScope::Image("name"),
            },
        ];
        Self { specs }
    }

    pub fn lookup(&self, name: &str) -> Option<&ActionSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActionSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl Default for ActionCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
