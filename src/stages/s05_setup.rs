//! Stage 5: apply `setup.yml` and the overlay manifest to the mutable root.
//!
//! Order: host name, `files/paths.json` overlay, legacy `files:` overlay,
//! then commands by ascending priority (ties keep declaration order).
//!
//! The two overlay forms fail differently. A missing asset named in
//! `paths.json` is warned about and skipped; a missing legacy source aborts.

use anyhow::{bail, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use crate::build::context::BuildContext;
use crate::component::{shell, Script};
use crate::config::overlay::copy_destination;
use crate::config::{load_or_empty, Format, OverlayManifest, PathMapping, SetupSpec};
use crate::executor::files::{apply_mode, copy_into_root, write_hostname};
use crate::executor::{run_script, IsolatedExecutor};

/// File name of the per-command wrapper inside `/tmp` of the root.
pub const SCRIPT_NAME: &str = "setup_cmd.sh";

/// What a setup run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupSummary {
    pub overlaid: usize,
    pub skipped: usize,
    pub commands: usize,
}

pub fn run(
    ctx: &BuildContext,
    executor: &dyn IsolatedExecutor,
    spec: &SetupSpec,
    strict_config: bool,
    interrupted: &AtomicBool,
) -> Result<SetupSummary> {
    let mut summary = SetupSummary::default();
    let root = &ctx.rootfs_dir;

    if spec.is_empty() {
        info!("setup spec is empty, only the overlay manifest applies");
    }

    match spec.configurations.hostname.as_deref().map(str::trim) {
        Some("") => warn!("empty hostname in setup spec, leaving /etc/hostname unchanged"),
        Some(hostname) => {
            info!(hostname = %hostname, "setting host name");
            write_hostname(root, hostname)?;
        }
        None => {}
    }

    if ctx.overlay_manifest.is_file() {
        let manifest: OverlayManifest =
            load_or_empty(&ctx.overlay_manifest, Format::Json, "overlay manifest", strict_config)?;
        apply_overlay_manifest(ctx, &manifest, &mut summary);
    } else {
        info!(
            path = %ctx.overlay_manifest.display(),
            "no overlay manifest found, skipping file copy"
        );
    }

    for entry in &spec.files {
        let source = ctx.project_path(&entry.source);
        let dest = copy_destination(root, &entry.destination, &source)
            .with_context(|| format!("legacy file entry '{}'", entry.source))?;
        copy_into_root(&source, &dest)
            .with_context(|| format!("legacy file entry '{}'", entry.source))?;
        if let Some(mode) = entry.permissions {
            apply_mode(&dest, mode)?;
        }
        info!("  {} -> {}", entry.source, entry.destination);
        summary.overlaid += 1;
    }

    for command in spec.ordered_commands() {
        if interrupted.load(Ordering::SeqCst) {
            bail!("interrupted before setup command '{}'", command.name);
        }
        info!(
            "[Priority {}] {}: {}",
            command.priority,
            command.name,
            command.description.as_deref().unwrap_or("")
        );
        let script = Script::new(vec![shell(command.command.as_str())]);
        run_script(executor, root, SCRIPT_NAME, &script.render())
            .with_context(|| format!("setup command '{}' failed", command.name))?;
        summary.commands += 1;
    }

    info!(
        overlaid = summary.overlaid,
        skipped = summary.skipped,
        commands = summary.commands,
        "setup complete"
    );
    Ok(summary)
}

fn apply_overlay_manifest(ctx: &BuildContext, manifest: &OverlayManifest, summary: &mut SetupSummary) {
    if !manifest.entries.is_empty() {
        info!("copying files from {}", ctx.assets_dir.display());
    }
    for entry in &manifest.entries {
        let mapping = match PathMapping::resolve(entry, &ctx.assets_dir, &ctx.rootfs_dir) {
            Ok(mapping) => mapping,
            Err(e) => {
                warn!("skipping overlay entry '{}': {e}", entry.name);
                summary.skipped += 1;
                continue;
            }
        };
        if !mapping.source.is_file() {
            warn!("{} not found, skipping", mapping.source.display());
            summary.skipped += 1;
            continue;
        }
        match copy_into_root(&mapping.source, &mapping.destination) {
            Ok(()) => {
                info!("  {} -> {}", entry.name, entry.destination);
                summary.overlaid += 1;
            }
            Err(e) => {
                warn!("skipping overlay entry '{}': {e:#}", entry.name);
                summary.skipped += 1;
            }
        }
    }
}
