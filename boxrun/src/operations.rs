// This file is dual licensed under the terms of the Apache License, Version
// 2.0, and the BSD License. See the LICENSE file in the root of this repository
// for complete details.

//! Ties components A through I together into the single ordered data flow
//! described by the system overview: parse manifests, resolve dependencies,
//! build the namespace, compose the overlay, optionally prune and wrap, and
//! exec the target.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::compat::CompatibilityList;
use crate::config::{Layout, SearchOptions};
use crate::enumerate::RepositorySource;
use crate::errors::EngineError;
use crate::manifest::Requirement;
use crate::resolver::ResolvedDependency;
use crate::version::Operator;
use crate::{locate, namespace, overlay, pruner, wrapper};

/// One assembled invocation's worth of CLI-derived options. Owned by the
/// caller (the `boxrun-cli` binary); nothing here is persisted across
/// invocations.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub executable: String,
    pub args: Vec<String>,
    pub extra_manifests: Vec<PathBuf>,
    pub arch: Option<String>,
    pub quiet: bool,
    pub check: bool,
    pub strict: bool,
    pub pure: bool,
    pub fallback: bool,
    pub no_source_env: bool,
    pub no_cleanup: bool,
    pub no_removedeps: bool,
    pub source: RepositorySource,
}

impl RunOptions {
    fn default_operator(&self) -> Operator {
        if self.strict {
            Operator::Eq
        } else {
            Operator::Ge
        }
    }
}

fn read_requirements(
    own_program_dir: Option<&Path>,
    opts: &RunOptions,
) -> Vec<Requirement> {
    let mut requirements = Vec::new();
    let mut manifest_paths: Vec<PathBuf> = Vec::new();

    if let Some(dir) = own_program_dir {
        manifest_paths.push(dir.join("Resources/Dependencies"));
    }
    manifest_paths.extend(opts.extra_manifests.iter().cloned());

    for path in manifest_paths {
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => continue,
        };
        match crate::manifest::parse(&contents, opts.default_operator()) {
            Ok(reqs) => requirements.extend(reqs),
            Err(e) => warn!("manifest {} could not be fully parsed: {}", path.display(), e),
        }
    }

    requirements
}

/// Runs the full data flow and returns the process exit code to use: the
/// child's own status on a normal run, or one of the setup-phase codes in
/// `EngineError::exit_code` when something aborted first.
pub fn run(opts: RunOptions, layout: Layout) -> Result<i32, EngineError> {
    if opts.executable.is_empty() {
        return Err(EngineError::NoExecutable);
    }

    let own_program_dir = locate::locate_program_dir(&layout, &opts.executable)?;
    let requirements = read_requirements(own_program_dir.as_deref(), &opts);

    let compat_path = layout.compatibility_list();
    let compat = match CompatibilityList::load(&compat_path) {
        Some(c) => c,
        None => {
            if !opts.quiet {
                warn!("missing compatibility list at {}", compat_path.display());
            }
            CompatibilityList::default()
        }
    };

    let mut search_opts = SearchOptions::new(layout.clone());
    search_opts.arch = opts.arch.clone();
    search_opts.quiet = opts.quiet;
    search_opts.default_operator = opts.default_operator();
    search_opts.pure = opts.pure;

    let (resolved, warnings) =
        crate::resolver::resolve(&requirements, &opts.source, &search_opts, &compat)?;
    for w in &warnings {
        if !opts.quiet {
            warn!("{w}");
        }
    }

    match create_sandbox(&opts, &layout, own_program_dir.as_deref(), &resolved) {
        Ok(outcome) => {
            if opts.check {
                namespace::cleanup(&layout.index_base, &outcome.mounted_targets, &outcome.work_tree);
                return Ok(0);
            }
            // Run cleanup on every exit from exec_target, not just the
            // success path, or a child exec failure leaks the work tree.
            let result = exec_target(&opts, &layout, &outcome);
            if !opts.no_cleanup {
                namespace::cleanup(&layout.index_base, &outcome.mounted_targets, &outcome.work_tree);
            }
            result
        }
        Err(err) => {
            // --check means "do not run anything": it must report the
            // failure even when --fallback is also set.
            if opts.fallback && !opts.check {
                warn!("sandbox unavailable, falling back to direct exec: {err}");
                exec_fallback(&opts)
            } else {
                Err(err)
            }
        }
    }
}

struct SandboxOutcome {
    work_tree: namespace::WorkTree,
    mounted_targets: Vec<String>,
    wrapper_path: Option<PathBuf>,
}

fn create_sandbox(
    opts: &RunOptions,
    layout: &Layout,
    own_program_dir: Option<&Path>,
    resolved: &[ResolvedDependency],
) -> Result<SandboxOutcome, EngineError> {
    namespace::create_mount_namespace()?;
    namespace::make_index_private(&layout.index_base)?;

    let basename = Path::new(&opts.executable)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "program".to_string());
    let work_tree = namespace::create_work_tree(&basename)?;

    let mounted_targets = match overlay::compose(
        resolved,
        &layout.index_base,
        &work_tree.upper_layer,
        &work_tree.write_layer,
        opts.pure,
    ) {
        Ok(m) => m,
        Err(e) => {
            namespace::cleanup(&layout.index_base, &[], &work_tree);
            return Err(e.into());
        }
    };

    namespace::install_sigint_cleanup(
        &layout.index_base,
        mounted_targets.clone(),
        work_tree.clone(),
    );

    if !opts.no_removedeps && !opts.pure {
        let unlinked = pruner::prune(layout, &layout.index_base, resolved);
        info!("pruner removed {} conflicting symlinks", unlinked.len());
    }

    let wrapper_path = if !opts.no_source_env {
        let env_files = wrapper::environment_files(own_program_dir, resolved);
        if !env_files.is_empty() {
            let path = work_tree.root.join("wrapper");
            let mut argv = vec![opts.executable.clone()];
            argv.extend(opts.args.iter().cloned());
            wrapper::write_wrapper_script(&path, &env_files, &argv)?;
            Some(path)
        } else {
            None
        }
    } else {
        None
    };

    Ok(SandboxOutcome {
        work_tree,
        mounted_targets,
        wrapper_path,
    })
}

fn exec_target(
    opts: &RunOptions,
    layout: &Layout,
    outcome: &SandboxOutcome,
) -> Result<i32, EngineError> {
    let (program, args): (PathBuf, &[String]) = match &outcome.wrapper_path {
        Some(w) => (w.clone(), &[]),
        None => (PathBuf::from(&opts.executable), opts.args.as_slice()),
    };
    wrapper::launch(&program, args, &layout.index_base).map_err(EngineError::from)
}

/// `--fallback` path: the sandbox could not be constructed, so the target is
/// exec'd directly with no namespace, no overlays, no wrapper, and none of
/// the sandboxed launch's `/System/Index` environment augmentation — there is
/// no sandbox here for the child to be told it's inside.
fn exec_fallback(opts: &RunOptions) -> Result<i32, EngineError> {
    let program = PathBuf::from(&opts.executable);
    wrapper::launch_plain(&program, &opts.args).map_err(EngineError::from)
}
