//! Patch-queue import/export (spec §4.I step 10): rebase the maintained
//! patch queue onto the freshly imported upstream, then flatten it back
//! into `debian/patches` for the source build.

use std::path::Path;
use std::process::Command;

use anyhow::{bail, Result};

/// Outcome of [`import_patch_queue`], distinguishing a clean rebase from
/// one that needed `--force` because the queue tip was already applied
/// on top of the new upstream (a no-op gbp would otherwise refuse).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PatchQueueOutcome {
    Rebased,
    AlreadyUpToDate,
}

/// Imports the `patch-queue/<branch>` branch onto the new upstream import,
/// retrying once with `--time-machine=0` (gbp's "ignore history, just
/// reapply the patches fresh" mode) if the first attempt fails, then
/// requiring `force` to proceed if the queue was already up to date.
pub fn import_patch_queue(package_dir: &Path, force: bool) -> Result<PatchQueueOutcome> {
    let first = packastack_procutil::run(
        Command::new("gbp")
            .current_dir(package_dir)
            .arg("pq")
            .arg("import"),
    )?;

    if first.success() {
        return Ok(PatchQueueOutcome::Rebased);
    }

    let retry = packastack_procutil::run(
        Command::new("gbp")
            .current_dir(package_dir)
            .arg("pq")
            .arg("import")
            .arg("--time-machine=0"),
    )?;

    if retry.success() {
        return Ok(PatchQueueOutcome::Rebased);
    }

    if already_up_to_date(package_dir)? {
        if !force {
            bail!(
                "patch queue for {} is already applied on the new upstream; rerun with force to proceed",
                package_dir.display()
            );
        }
        return Ok(PatchQueueOutcome::AlreadyUpToDate);
    }

    bail!("gbp pq import failed for {}", package_dir.display());
}

/// Flattens `patch-queue/<branch>` back into `debian/patches` so the
/// source build sees a conventional quilt series.
pub fn export_patch_queue(package_dir: &Path) -> Result<()> {
    packastack_procutil::run_and_check(
        Command::new("gbp")
            .current_dir(package_dir)
            .arg("pq")
            .arg("export")
            .arg("--commit"),
    )
}

fn already_up_to_date(package_dir: &Path) -> Result<bool> {
    let output = Command::new("git")
        .current_dir(package_dir)
        .arg("branch")
        .arg("--list")
        .arg("patch-queue/*")
        .output()?;
    Ok(output.status.success() && !output.stdout.is_empty())
}
