// This file is dual licensed under the terms of the Apache License, Version
// 2.0, and the BSD License. See the LICENSE file in the root of this repository
// for complete details.

//! Wrapper-script generation and the final privilege-dropping exec of the
//! target program.

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::errors::WrapperError;
use crate::resolver::ResolvedDependency;

const ENV_FILE: &str = "Resources/Environment";

/// Returns the non-empty `Resources/Environment` files among the caller's
/// own program directory and every resolved dependency, in resolution
/// order.
pub fn environment_files(
    own_program_dir: Option<&Path>,
    deps: &[ResolvedDependency],
) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut all_dirs: Vec<PathBuf> = Vec::new();
    if let Some(p) = own_program_dir {
        all_dirs.push(p.to_path_buf());
    }
    all_dirs.extend(deps.iter().map(|d| d.path()));

    for dir in all_dirs {
        let env_file = dir.join(ENV_FILE);
        if let Ok(metadata) = fs::metadata(&env_file) {
            if metadata.len() > 0 {
                files.push(env_file);
            }
        }
    }
    files
}

fn quote_arg(arg: &str) -> String {
    if arg.contains(' ') {
        format!("\"{arg}\"")
    } else {
        arg.to_string()
    }
}

/// Writes `<workdir>/wrapper`, sourcing each environment file before
/// `exec`-ing the original argv, chmod 0755.
pub fn write_wrapper_script(
    path: &Path,
    env_files: &[PathBuf],
    argv: &[String],
) -> Result<(), WrapperError> {
    let mut script = String::from("#!/bin/bash\n\n");
    for f in env_files {
        script.push_str(&format!("source {}\n", f.display()));
    }
    script.push('\n');
    script.push_str(
        &argv
            .iter()
            .map(|a| quote_arg(a))
            .collect::<Vec<_>>()
            .join(" "),
    );
    script.push('\n');

    let write = || -> std::io::Result<()> {
        let mut file = fs::File::create(path)?;
        file.write_all(script.as_bytes())?;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
        Ok(())
    };
    write().map_err(|source| WrapperError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Prepends `/System/Index/lib` and `/System/Index/lib64` to
/// `LD_LIBRARY_PATH` and `/System/Index/bin` to `PATH`, and sets
/// `GOBOLINUX_RUNNER=1`.
pub fn launch_environment(index_base: &Path) -> Vec<(String, String)> {
    let ld_library_path = std::env::var("LD_LIBRARY_PATH").unwrap_or_default();
    let path = std::env::var("PATH").unwrap_or_default();

    let new_ld_library_path = format!(
        "{}:{}:{}",
        index_base.join("lib").display(),
        index_base.join("lib64").display(),
        ld_library_path
    );
    let new_path = format!("{}:{}", index_base.join("bin").display(), path);

    vec![
        ("GOBOLINUX_RUNNER".to_string(), "1".to_string()),
        ("LD_LIBRARY_PATH".to_string(), new_ld_library_path),
        ("PATH".to_string(), new_path),
    ]
}

fn wait_for_exit(mut cmd: Command) -> Result<i32, WrapperError> {
    unsafe {
        cmd.pre_exec(|| {
            let uid = nix::unistd::getuid();
            nix::unistd::setuid(uid).map_err(|e| std::io::Error::from_raw_os_error(e as i32))
        });
    }

    let status = cmd.status().map_err(WrapperError::Exec)?;
    Ok(status.code().unwrap_or_else(|| {
        let _ = status.signal();
        1
    }))
}

/// Executes `program` with `args` inside the composed sandbox, first dropping
/// the setuid elevation (`setuid(getuid())`) now that all privileged mount
/// operations are done, then applying the launch environment. Waits for the
/// child and returns its exit code, or 1 if it was signaled instead.
pub fn launch(program: &Path, args: &[String], index_base: &Path) -> Result<i32, WrapperError> {
    let envs = launch_environment(index_base);
    let mut cmd = Command::new(program);
    cmd.args(args);
    for (k, v) in &envs {
        cmd.env(k, v);
    }
    wait_for_exit(cmd)
}

/// Executes `program` with `args` directly, with privileges dropped but no
/// sandbox-specific environment augmentation — used by the `--fallback` path,
/// where no namespace or overlay was ever constructed, so telling the child
/// it is running inside one (`GOBOLINUX_RUNNER=1`, rewritten `PATH`/
/// `LD_LIBRARY_PATH`) would be a lie.
pub fn launch_plain(program: &Path, args: &[String]) -> Result<i32, WrapperError> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    wait_for_exit(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_arguments_with_spaces() {
        assert_eq!(quote_arg("no-spaces"), "no-spaces");
        assert_eq!(quote_arg("has spaces"), "\"has spaces\"");
    }

    #[test]
    fn environment_files_skips_empty_and_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let dep_dir = tmp.path().join("Bar/2.0");
        fs::create_dir_all(dep_dir.join("Resources")).unwrap();
        fs::write(dep_dir.join(ENV_FILE), b"export FOO=1\n").unwrap();

        let empty_dep_dir = tmp.path().join("Baz/1.0");
        fs::create_dir_all(empty_dep_dir.join("Resources")).unwrap();
        fs::write(empty_dep_dir.join(ENV_FILE), b"").unwrap();

        let deps = vec![
            ResolvedDependency {
                name: "Bar".into(),
                version: "2.0".into(),
                location: dep_dir.to_string_lossy().into_owned(),
            },
            ResolvedDependency {
                name: "Baz".into(),
                version: "1.0".into(),
                location: empty_dep_dir.to_string_lossy().into_owned(),
            },
        ];

        let files = environment_files(None, &deps);
        assert_eq!(files, vec![dep_dir.join(ENV_FILE)]);
    }

    #[test]
    fn wrapper_script_sources_each_env_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("wrapper");
        write_wrapper_script(
            &path,
            &[PathBuf::from("/Programs/Bar/2.0/Resources/Environment")],
            &["foo".to_string(), "has space".to_string()],
        )
        .unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("source /Programs/Bar/2.0/Resources/Environment"));
        assert!(contents.contains("foo \"has space\""));
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
