use crate::output::{print_json, print_table};
use anyhow::Context;
use chrono::{DateTime, Utc};
use dockgate_core::audit::{self, AuditFilter};
use dockgate_core::config::Config;
use dockgate_core::types::OutcomeClass;
use std::path::Path;

pub struct AuditArgs {
    pub action: Option<String>,
    pub outcome: Option<String>,
    pub since: Option<String>,
    pub limit: Option<usize>,
}

pub fn run(root: &Path, args: AuditArgs, json: bool) -> anyhow::Result<()> {
    let outcome = args
        .outcome
        .as_deref()
        .map(|s| {
            OutcomeClass::parse(s).with_context(|| {
                format!("unknown outcome '{s}' (expected success, validation_failure, execution_failure)")
            })
        })
        .transpose()?;
    let since = args
        .since
        .as_deref()
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .with_context(|| format!("invalid --since timestamp '{s}'"))
        })
        .transpose()?;

    let filter = AuditFilter {
        action: args.action,
        outcome,
        since,
        limit: args.limit,
    };

    let config = Config::load(root).context("failed to load config")?;
    let path = config.audit_path(root);
    let entries = audit::read_file(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let entries = filter.apply(entries.iter());

    if json {
        return print_json(&entries);
    }

    if entries.is_empty() {
        println!("No audit entries.");
        return Ok(());
    }

    let rows = entries
        .iter()
        .map(|e| {
            vec![
                e.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                e.request.action.clone(),
                e.outcome.to_string(),
                e.result
                    .as_ref()
                    .map(|r| format!("{}ms", r.duration_ms))
                    .unwrap_or_else(|| "-".to_string()),
                e.reason.clone().unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["TIME", "ACTION", "OUTCOME", "TOOK", "REASON"], rows);
    Ok(())
}
