use anyhow::Context;
use dockgate_core::{config::Config, io, paths};
use std::path::Path;

pub fn run(root: &Path) -> anyhow::Result<()> {
    println!("Initializing dockgate in: {}", root.display());

    let dir = paths::dockgate_dir(root);
    io::ensure_dir(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let config_path = paths::config_path(root);
    if !config_path.exists() {
        Config::default()
            .save(root)
            .context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
    } else {
        println!("  exists:  {}", paths::CONFIG_FILE);
    }

    io::ensure_gitignore_entry(root, paths::AUDIT_FILE)
        .context("failed to update .gitignore")?;

    Ok(())
}
