//! `driftless lock`: inspect and upgrade the ledger
//!
//! These commands read the lock file directly and do not need a valid
//! `driftless.yaml`.

use anyhow::{Context as _, Result};
use colored::Colorize;
use declarative::{Domain, LockEntry, LockFile, LockStore};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::Context;
use crate::cli::LockCommand;
use crate::paths;
use crate::ui;

#[derive(Serialize)]
struct LockView<'a> {
    path: String,
    version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    migrated_from: Option<u32>,
    resources: &'a [LockEntry],
    packages: BTreeMap<String, Vec<String>>,
}

fn view<'a>(store: &LockStore, lock: &'a LockFile) -> LockView<'a> {
    LockView {
        path: store.path().display().to_string(),
        version: lock.version,
        migrated_from: lock.migrated_from,
        resources: &lock.resources,
        packages: lock.legacy_packages(),
    }
}

pub fn run(ctx: &Context, cmd: &LockCommand) -> Result<()> {
    let home = paths::home_dir()?;
    let store = LockStore::new(paths::config_dir(ctx.config_dir.as_deref())?);
    match cmd {
        LockCommand::Show { json } => show(&store, &home, *json),
        LockCommand::Migrate { dry_run } => migrate(&store, &home, *dry_run),
    }
}

fn show(store: &LockStore, home: &std::path::Path, json: bool) -> Result<()> {
    let lock = store.load()?;

    if json {
        let out = serde_json::to_string_pretty(&view(store, &lock))
            .context("Failed to serialize lock file")?;
        println!("{out}");
        return Ok(());
    }

    ui::header("Lock File");
    ui::kv("path", &paths::display(store.path(), home));
    match lock.migrated_from {
        Some(from) => ui::kv("version", &format!("{from} (read as {})", lock.version)),
        None => ui::kv("version", &lock.version.to_string()),
    }

    if lock.is_empty() {
        println!();
        ui::info("Nothing recorded yet");
        return Ok(());
    }

    for domain in Domain::ALL {
        let entries: Vec<_> = lock.entries(domain).collect();
        if entries.is_empty() {
            continue;
        }
        ui::section(&format!("{domain} ({})", entries.len()));
        for entry in entries {
            let version = entry
                .version
                .as_deref()
                .map(|v| format!(" {v}"))
                .unwrap_or_default();
            println!(
                "  {}{} {}",
                entry.id,
                version.dimmed(),
                entry.installed_at.format("%Y-%m-%d %H:%M").to_string().dimmed()
            );
        }
    }
    Ok(())
}

fn migrate(store: &LockStore, home: &std::path::Path, dry_run: bool) -> Result<()> {
    let lock = store.load()?;
    let path = paths::display(store.path(), home);

    if !lock.was_migrated() {
        ui::success(&format!("{path} is already in the current format"));
        return Ok(());
    }
    if dry_run {
        ui::info(&format!(
            "Would rewrite {path} as v{} ({})",
            lock.version,
            ui::plural(lock.resources.len(), "resource")
        ));
        return Ok(());
    }

    store.save(&lock)?;
    ui::success(&format!(
        "Rewrote {path} as v{} ({})",
        lock.version,
        ui::plural(lock.resources.len(), "resource")
    ));
    Ok(())
}
