use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use dockgate_core::audit::AuditLog;
use dockgate_core::catalog::{self, ActionCatalog};
use dockgate_core::config::Config;
use dockgate_core::dispatcher::{DispatchResult, Dispatcher};
use dockgate_core::executor::RuntimeExecutor;
use dockgate_core::intent::{IntentSource, JsonIntent};
use dockgate_core::types::ActionRequest;
use dockgate_core::validator::Plan;
use std::io::Read;
use std::path::Path;

/// Exit code for requests rejected before execution.
const EXIT_REJECTED: i32 = 2;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ActionCommand {
    /// Write a Flask app (app.py, requirements.txt, Dockerfile) into scaffold.dir
    CreateApp {
        /// Text served at /
        #[arg(long)]
        message: Option<String>,
        /// Port the app listens on inside the container
        #[arg(long)]
        port: Option<String>,
    },

    /// Build an image from the Dockerfile in runtime.workdir
    BuildImage { image_name: String },

    /// Pull an image (default: nginx:latest)
    PullImage {
        #[arg(value_name = "REF")]
        reference: Option<String>,
    },

    /// Start a detached container with one published port
    RunContainer {
        #[arg(long)]
        image: String,
        #[arg(long)]
        host_port: String,
        #[arg(long)]
        container_port: Option<String>,
        #[arg(long)]
        name: String,
    },

    /// Stop a running container
    StopContainer { name: String },

    /// Remove a container
    RemoveContainer { name: String },

    /// List all containers
    ListContainers,

    /// Remove an image
    RemoveImage { name: String },

    /// Dispatch a JSON action request (`-` reads stdin)
    Dispatch {
        /// e.g. {"action":"StopContainer","params":{"name":"web"}}
        request: String,
    },
}

impl ActionCommand {
    fn into_request(self) -> dockgate_core::Result<ActionRequest> {
        let request = match self {
            ActionCommand::CreateApp { message, port } => {
                let mut req = ActionRequest::new(catalog::CREATE_APP);
                if let Some(m) = message {
                    req = req.param("message", m);
                }
                if let Some(p) = port {
                    req = req.param("port", p);
                }
                req
            }
            ActionCommand::BuildImage { image_name } => {
                ActionRequest::new(catalog::BUILD_IMAGE).param("imageName", image_name)
            }
            ActionCommand::PullImage { reference } => {
                let req = ActionRequest::new(catalog::PULL_IMAGE);
                match reference {
                    Some(r) => req.param("ref", r),
                    None => req,
                }
            }
            ActionCommand::RunContainer {
                image,
                host_port,
                container_port,
                name,
            } => {
                let req = ActionRequest::new(catalog::RUN_CONTAINER)
                    .param("image", image)
                    .param("hostPort", host_port)
                    .param("name", name);
                match container_port {
                    Some(p) => req.param("containerPort", p),
                    None => req,
                }
            }
            ActionCommand::StopContainer { name } => {
                ActionRequest::new(catalog::STOP_CONTAINER).param("name", name)
            }
            ActionCommand::RemoveContainer { name } => {
                ActionRequest::new(catalog::REMOVE_CONTAINER).param("name", name)
            }
            ActionCommand::ListContainers => ActionRequest::new(catalog::LIST_CONTAINERS),
            ActionCommand::RemoveImage { name } => {
                ActionRequest::new(catalog::REMOVE_IMAGE).param("name", name)
            }
            ActionCommand::Dispatch { request } => {
                let text = if request == "-" {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                } else {
                    request
                };
                JsonIntent.intent(&text)?
            }
        };
        Ok(request)
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Returns the process exit code: 0 completed, 1 failed, 2 rejected.
pub fn run(
    root: &Path,
    runtime: Option<&str>,
    action: ActionCommand,
    dry_run: bool,
    json: bool,
) -> anyhow::Result<i32> {
    let request = match action.into_request() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("rejected: {e}");
            return Ok(EXIT_REJECTED);
        }
    };

    let dispatcher = build_dispatcher(root, runtime)?;
    if dry_run {
        return plan(&dispatcher, &request, json);
    }

    let result = dispatcher.dispatch(&request);
    report(&result, json)?;
    Ok(result.exit_code())
}

fn build_dispatcher(root: &Path, runtime: Option<&str>) -> anyhow::Result<Dispatcher<RuntimeExecutor>> {
    let mut config = Config::load(root).context("failed to load config")?;
    if let Some(program) = runtime {
        config.runtime.program = program.to_string();
    }

    let executor = RuntimeExecutor::from_config(&config, root);
    let audit = if config.audit.persist {
        AuditLog::persistent(config.audit_path(root))
    } else {
        AuditLog::in_memory()
    };
    Ok(Dispatcher::new(ActionCatalog::builtin(), executor, audit))
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn report(result: &DispatchResult, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(result);
    }

    let stdout = result.result.as_ref().map(|r| r.stdout.as_str()).unwrap_or("");
    if result.is_success() {
        if stdout.is_empty() {
            println!("{}", result.message);
        } else {
            print!("{stdout}");
            if !stdout.ends_with('\n') {
                println!();
            }
        }
    } else {
        eprintln!("{}", result.message);
        if result.retryable {
            eprintln!("(the request may be retried)");
        }
    }
    if result.cancelled_after_start {
        eprintln!("note: cancel was requested after the action started");
    }
    Ok(())
}

fn plan(
    dispatcher: &Dispatcher<RuntimeExecutor>,
    request: &ActionRequest,
    json: bool,
) -> anyhow::Result<i32> {
    let action = match dispatcher.plan(request) {
        Ok(a) => a,
        Err(e) => {
            if json {
                print_json(&serde_json::json!({
                    "action": request.action,
                    "error_kind": e.kind(),
                    "message": e.to_string(),
                }))?;
            } else {
                eprintln!("rejected: {e}");
            }
            return Ok(EXIT_REJECTED);
        }
    };

    if json {
        print_json(&serde_json::json!({
            "action": action.name(),
            "class": action.class(),
            "params": action.values(),
            "plan": action.plan(),
            "resource_key": action.resource_key(),
        }))?;
        return Ok(0);
    }

    match action.plan() {
        Plan::Runtime { argv } => {
            println!("{} {}", dispatcher.executor().program(), argv.join(" "));
        }
        Plan::Scaffold => {
            let params: Vec<String> = action
                .values()
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            println!("scaffold {} ({})", action.name(), params.join(", "));
        }
    }
    Ok(0)
}
