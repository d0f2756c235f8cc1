use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use dockgate_core::config::{Config, ConfigWarning, WarnLevel};
use dockgate_core::executor::detect_runtime;
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective configuration
    Show,

    /// Validate the config and check the runtime binary is on PATH
    Validate,
}

pub fn run(
    root: &Path,
    runtime: Option<&str>,
    subcmd: ConfigSubcommand,
    json: bool,
) -> anyhow::Result<()> {
    let mut config = Config::load(root).context("failed to load config")?;
    if let Some(program) = runtime {
        config.runtime.program = program.to_string();
    }

    match subcmd {
        ConfigSubcommand::Show => show(&config, json),
        ConfigSubcommand::Validate => validate(&config, json),
    }
}

fn show(config: &Config, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(config);
    }
    print!("{}", serde_yaml::to_string(config)?);
    Ok(())
}

fn validate(config: &Config, json: bool) -> anyhow::Result<()> {
    let mut warnings = config.validate();
    if !config.runtime.program.trim().is_empty() {
        if let Err(e) = detect_runtime(&config.runtime.program) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: e.to_string(),
            });
        }
    }

    if json {
        let value = serde_json::json!({
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }

    Ok(())
}
