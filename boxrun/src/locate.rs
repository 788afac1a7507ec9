// This file is dual licensed under the terms of the Apache License, Version
// 2.0, and the BSD License. See the LICENSE file in the root of this repository
// for complete details.

//! Given an executable token, finds its owning `/Programs/<Name>/<Version>`
//! directory by following `$PATH`, `realpath`, and — failing that — one
//! level of interpreter-shebang recursion.

use std::io::Read;
use std::path::{Path, PathBuf};

use crate::config::Layout;
use crate::errors::LocateError;

/// Searches `$PATH` (default `/bin`) for the first existing entry named
/// `token`.
fn search_path(token: &str) -> Option<PathBuf> {
    let path_var = std::env::var("PATH").unwrap_or_else(|_| "/bin".to_string());
    for dir in path_var.split(':') {
        let candidate = Path::new(dir).join(token);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Truncates a realpath to `/Programs/<Name>/<Version>` if it has exactly
/// the expected two intermediate components under the programs root.
fn truncate_to_program_dir(layout: &Layout, resolved: &Path) -> Option<PathBuf> {
    let rel = resolved.strip_prefix(&layout.programs_root).ok()?;
    let mut components = rel.components();
    let name = components.next()?;
    let version = components.next()?;
    // There must be at least one further component (the file itself, under
    // bin/lib/etc) — a bare `/Programs/<Name>/<Version>` is not itself an
    // executable's resolved path.
    components.next()?;
    Some(layout.programs_root.join(name.as_os_str()).join(version.as_os_str()))
}

/// Reads the first line of a file and, if it is a shebang, extracts the
/// interpreter token — honoring `/usr/bin/env <name>` by skipping to the
/// following token.
fn read_shebang_interpreter(path: &Path) -> Option<String> {
    let mut buf = [0u8; 256];
    let mut file = std::fs::File::open(path).ok()?;
    let n = file.read(&mut buf).ok()?;
    let head = String::from_utf8_lossy(&buf[..n]);
    let line = head.lines().next()?;
    let rest = line.strip_prefix("#!")?;
    let mut tokens = rest.split_whitespace();
    let first = tokens.next()?;
    if first.ends_with("env") {
        tokens.next().map(String::from)
    } else {
        Some(first.to_string())
    }
}

/// Resolves `token` (an executable path or bare name) to its owning program
/// directory. Follows one level of shebang-interpreter recursion if the
/// resolved path is not itself under the programs root with the expected
/// shape.
pub fn locate_program_dir(layout: &Layout, token: &str) -> Result<Option<PathBuf>, LocateError> {
    locate_inner(layout, token, true)
}

fn locate_inner(
    layout: &Layout,
    token: &str,
    allow_recursion: bool,
) -> Result<Option<PathBuf>, LocateError> {
    let candidate = if token.starts_with('.') || token.starts_with('/') {
        PathBuf::from(token)
    } else {
        match search_path(token) {
            Some(p) => p,
            None => return Ok(None),
        }
    };

    let resolved = match std::fs::canonicalize(&candidate) {
        Ok(p) => p,
        Err(_) => return Ok(None),
    };

    if let Some(dir) = truncate_to_program_dir(layout, &resolved) {
        return Ok(Some(dir));
    }

    if allow_recursion {
        if let Some(interp) = read_shebang_interpreter(&resolved) {
            return locate_inner(layout, &interp, false);
        }
    }

    Ok(None)
}

/// ELF machine constants this probe understands, mapped to the
/// distribution's architecture names.
const EM_386: u16 = 3;
const EM_X86_64: u16 = 62;

/// Reads the ELF header of `path`, returning the distribution's
/// architecture name for `e_machine` if recognized. A failure to parse an
/// ELF header (wrong magic, truncated file) yields `None` so the caller can
/// fall back to a `Resources/Architecture` file read.
pub fn elf_architecture(path: &Path) -> Option<String> {
    let mut header = [0u8; 20];
    let mut file = std::fs::File::open(path).ok()?;
    file.read_exact(&mut header).ok()?;

    if &header[0..4] != b"\x7fELF" {
        return None;
    }

    let e_machine = u16::from_le_bytes([header[18], header[19]]);
    match e_machine {
        EM_386 => Some("i686".to_string()),
        EM_X86_64 => Some("x86_64".to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn truncates_under_programs_root() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = Layout::rooted_at(tmp.path());
        let resolved = layout.programs_root.join("Foo/2.0/bin/foo");
        let dir = truncate_to_program_dir(&layout, &resolved).unwrap();
        assert_eq!(dir, layout.programs_root.join("Foo/2.0"));
    }

    #[test]
    fn outside_programs_root_is_not_truncated() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = Layout::rooted_at(tmp.path());
        assert!(truncate_to_program_dir(&layout, Path::new("/usr/bin/foo")).is_none());
    }

    #[test]
    fn shebang_env_skips_to_interpreter_name() {
        let tmp = tempfile::tempdir().unwrap();
        let script = tmp.path().join("script");
        let mut f = std::fs::File::create(&script).unwrap();
        writeln!(f, "#!/usr/bin/env python3").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(
            read_shebang_interpreter(&script),
            Some("python3".to_string())
        );
    }

    #[test]
    fn shebang_direct_interpreter() {
        let tmp = tempfile::tempdir().unwrap();
        let script = tmp.path().join("script");
        let mut f = std::fs::File::create(&script).unwrap();
        writeln!(f, "#!/bin/bash").unwrap();
        assert_eq!(read_shebang_interpreter(&script), Some("/bin/bash".to_string()));
    }

    #[test]
    fn elf_header_maps_known_machines() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bin");
        let mut header = vec![0u8; 20];
        header[0..4].copy_from_slice(b"\x7fELF");
        header[18..20].copy_from_slice(&EM_X86_64.to_le_bytes());
        std::fs::write(&path, &header).unwrap();
        assert_eq!(elf_architecture(&path), Some("x86_64".to_string()));
    }

    #[test]
    fn non_elf_file_yields_none() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("notelf");
        std::fs::write(&path, b"not an elf file at all").unwrap();
        assert_eq!(elf_architecture(&path), None);
    }
}
