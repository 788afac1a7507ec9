// This file is dual licensed under the terms of the Apache License, Version
// 2.0, and the BSD License. See the LICENSE file in the root of this repository
// for complete details.

//! Mount namespace setup and teardown: `unshare`, making the index base a
//! private mount, work-tree creation, and the SIGINT-driven cleanup path.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use nix::mount::{mount, umount2, MntFlags, MsFlags};
use nix::sched::{unshare, CloneFlags};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::config::CANONICAL_TARGETS;
use crate::errors::{NamespaceError, WriteLayerError};

/// The work-tree root plus its two overlayfs scratch directories, unique
/// per invocation (`mkdtemp`-equivalent), never shared.
#[derive(Debug, Clone)]
pub struct WorkTree {
    pub root: PathBuf,
    pub upper_layer: PathBuf,
    pub write_layer: PathBuf,
}

/// `unshare`s into a fresh mount namespace.
pub fn create_mount_namespace() -> Result<(), NamespaceError> {
    unshare(CloneFlags::CLONE_NEWNS).map_err(NamespaceError::Unshare)
}

/// Makes `index_base` itself a private mount: bind-mounts it onto itself if
/// no mount already exists there, then marks it private. Falls back to a
/// plain bind mount retry on `EINVAL`, mirroring the original tool's
/// handling of hosts where the index is already a private mount.
pub fn make_index_private(index_base: &Path) -> Result<(), NamespaceError> {
    let bind_result = mount(
        Some(index_base),
        index_base,
        None::<&str>,
        MsFlags::MS_BIND,
        None::<&str>,
    );
    if let Err(nix::Error::EINVAL) = bind_result {
        // Already a mountpoint; nothing further needed before marking
        // private.
    } else {
        bind_result.map_err(|source| NamespaceError::MakePrivate {
            path: index_base.to_path_buf(),
            source,
        })?;
    }

    mount(
        None::<&str>,
        index_base,
        None::<&str>,
        MsFlags::MS_PRIVATE,
        None::<&str>,
    )
    .map_err(|source| NamespaceError::MakePrivate {
        path: index_base.to_path_buf(),
        source,
    })
}

fn epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Creates `$HOME/.local/Runner/<epoch>-<basename>-XXXXXX` (falling back to
/// `/tmp` when `$HOME` is unset), with `write_layer/{bin,include,lib,
/// libexec,share}` and `upper_layer/{...}` inside (overlayfs requires both).
pub fn create_work_tree(basename: &str) -> Result<WorkTree, WriteLayerError> {
    let base = match std::env::var("HOME") {
        Ok(home) if !home.is_empty() => Path::new(&home).join(".local/Runner"),
        _ => PathBuf::from("/tmp"),
    };
    std::fs::create_dir_all(&base).map_err(|source| WriteLayerError::CreateWorkTree {
        path: base.clone(),
        source,
    })?;

    let prefix = format!("{}-{}-", epoch_seconds(), basename);
    let dir = tempfile::Builder::new()
        .prefix(&prefix)
        .tempdir_in(&base)
        .map_err(|source| WriteLayerError::CreateWorkTree {
            path: base.clone(),
            source,
        })?;
    let root = dir.into_path();

    let write_layer = root.join("write_layer");
    let upper_layer = root.join("upper_layer");
    for layer in [&write_layer, &upper_layer] {
        for target in CANONICAL_TARGETS {
            std::fs::create_dir_all(layer.join(target)).map_err(|source| {
                WriteLayerError::CreateWorkTree {
                    path: layer.join(target),
                    source,
                }
            })?;
        }
    }

    Ok(WorkTree {
        root,
        upper_layer,
        write_layer,
    })
}

/// Unmounts every target subdir that was actually mounted, then the base
/// index bind mount, then recursively removes the work tree in depth-first
/// post-order. Symlinks are unlinked unconditionally. Errors are logged and
/// swallowed: cleanup runs best-effort on every exit path.
pub fn cleanup(index_base: &Path, mounted_targets: &[String], work_tree: &WorkTree) {
    unmount_and_remove(index_base, mounted_targets, work_tree, |warning, path, e| {
        if warning {
            log::warn!("failed to unmount {}: {}", path.display(), e);
        } else {
            log::debug!("failed to unmount {}: {}", path.display(), e);
        }
    });
}

/// Same teardown as `cleanup`, but never logs or otherwise allocates: this is
/// the variant called from the SIGINT handler, which per the Design Notes
/// must perform unmount and directory removal only.
fn cleanup_signal_safe(index_base: &Path, mounted_targets: &[String], work_tree: &WorkTree) {
    unmount_and_remove(index_base, mounted_targets, work_tree, |_, _, _| {});
}

fn unmount_and_remove(
    index_base: &Path,
    mounted_targets: &[String],
    work_tree: &WorkTree,
    on_error: impl Fn(bool, &Path, nix::Error),
) {
    for target in mounted_targets.iter().rev() {
        let path = index_base.join(target);
        if let Err(e) = umount2(&path, MntFlags::MNT_DETACH) {
            on_error(true, &path, e);
        }
    }
    if let Err(e) = umount2(index_base, MntFlags::MNT_DETACH) {
        on_error(false, index_base, e);
    }
    remove_tree_post_order(&work_tree.root);
}

fn remove_tree_post_order(path: &Path) {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(_) => return,
    };
    if metadata.is_dir() {
        if let Ok(entries) = std::fs::read_dir(path) {
            for entry in entries.flatten() {
                remove_tree_post_order(&entry.path());
            }
        }
        let _ = std::fs::remove_dir(path);
    } else {
        let _ = std::fs::remove_file(path);
    }
}

struct CleanupState {
    index_base: PathBuf,
    mounted_targets: Vec<String>,
    work_tree: WorkTree,
    in_progress: AtomicBool,
}

static CLEANUP_STATE: OnceLock<Mutex<Option<CleanupState>>> = OnceLock::new();

extern "C" fn handle_sigint(_: nix::libc::c_int) {
    let cell = CLEANUP_STATE.get_or_init(|| Mutex::new(None));
    if let Ok(guard) = cell.lock() {
        if let Some(state) = guard.as_ref() {
            if state
                .in_progress
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                cleanup_signal_safe(&state.index_base, &state.mounted_targets, &state.work_tree);
            }
        }
    }
    std::process::exit(130);
}

/// Installs the SIGINT handler once the work-tree paths and mounted-target
/// list are known, per the single in-progress-flag design note: the handler
/// only unmounts and removes directories, it never allocates further.
pub fn install_sigint_cleanup(index_base: &Path, mounted_targets: Vec<String>, work_tree: WorkTree) {
    let cell = CLEANUP_STATE.get_or_init(|| Mutex::new(None));
    if let Ok(mut guard) = cell.lock() {
        *guard = Some(CleanupState {
            index_base: index_base.to_path_buf(),
            mounted_targets,
            work_tree,
            in_progress: AtomicBool::new(false),
        });
    }

    let action = SigAction::new(
        SigHandler::Handler(handle_sigint),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe {
        let _ = sigaction(Signal::SIGINT, &action);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_tree_creates_expected_layer_subdirs() {
        let tmp = tempfile::tempdir().unwrap();
        std::env::set_var("HOME", tmp.path());
        let wt = create_work_tree("foo").unwrap();
        for target in CANONICAL_TARGETS {
            assert!(wt.write_layer.join(target).is_dir());
            assert!(wt.upper_layer.join(target).is_dir());
        }
    }

    #[test]
    fn cleanup_removes_work_tree_directory() {
        let tmp = tempfile::tempdir().unwrap();
        std::env::set_var("HOME", tmp.path());
        let wt = create_work_tree("foo").unwrap();
        assert!(wt.root.is_dir());
        remove_tree_post_order(&wt.root);
        assert!(!wt.root.exists());
    }
}
