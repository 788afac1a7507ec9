// This file is dual licensed under the terms of the Apache License, Version
// 2.0, and the BSD License. See the LICENSE file in the root of this repository
// for complete details.

use std::path::PathBuf;

use thiserror::Error;

/// Top level error type returned by every fallible setup step. Each variant
/// carries the exit code spec'd for its phase so the CLI never has to
/// re-derive the table itself.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("out of memory")]
    OutOfMemory,

    #[error("bad arguments: {0}")]
    BadArguments(String),

    #[error("no executable given")]
    NoExecutable,

    #[error(transparent)]
    NoSandbox(#[from] LocateError),

    #[error(transparent)]
    NamespaceFailed(#[from] NamespaceError),

    #[error(transparent)]
    WriteLayerFailed(#[from] WriteLayerError),

    #[error(transparent)]
    OverlayMountFailed(#[from] OverlayError),

    #[error(transparent)]
    WrapperFailed(#[from] WrapperError),

    #[error(transparent)]
    Resolver(#[from] ResolverError),
}

impl EngineError {
    /// Maps to the exit code table of the external interface: 1 OOM, 2 no
    /// executable, 3 sandbox unavailable, 4 namespace, 5 overlay mount, 6
    /// write layer, 7 bad arguments, 8 wrapper. Anything else is the child's
    /// own exit status and is never represented here.
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::OutOfMemory => 1,
            EngineError::NoExecutable => 2,
            EngineError::NoSandbox(_) => 3,
            EngineError::NamespaceFailed(_) => 4,
            EngineError::OverlayMountFailed(_) => 5,
            EngineError::WriteLayerFailed(_) => 6,
            EngineError::BadArguments(_) => 7,
            EngineError::WrapperFailed(_) => 8,
            EngineError::Resolver(_) => 3,
        }
    }
}

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("non-printable byte encountered at line {line}")]
    BinaryContent { line: usize },

    #[error("requirement line has no name: {line:?}")]
    NoName { line: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Vfs(#[from] vfs::VfsError),
}

#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("no candidate for dependency {name} satisfies its requirement")]
    DependencyNotFound { name: String },

    #[error("dependency {name} has no candidate for the requested architecture")]
    ArchitectureMismatch { name: String },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Non-fatal conditions, logged at `warn!` and then skipped rather than
/// returned as an `Err`, per the recoverable-error propagation policy.
#[derive(Error, Debug)]
pub enum Warning {
    #[error("manifest syntax: {0}")]
    ManifestSyntax(String),

    #[error("dependency not found: {0}")]
    DependencyNotFound(String),

    #[error("architecture mismatch for {name}: wanted {wanted}, found {found}")]
    ArchitectureMismatch {
        name: String,
        wanted: String,
        found: String,
    },

    #[error("missing compatibility list at {0}")]
    MissingCompatibilityList(PathBuf),

    #[error("duplicate dependency {0} dropped")]
    DuplicateDependency(String),
}

#[derive(Error, Debug)]
pub enum LocateError {
    #[error("executable not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum NamespaceError {
    #[error("unshare(CLONE_NEWNS) failed")]
    Unshare(#[source] nix::Error),

    #[error("failed to make {path} a private mount")]
    MakePrivate {
        path: PathBuf,
        #[source]
        source: nix::Error,
    },
}

#[derive(Error, Debug)]
pub enum WriteLayerError {
    #[error("could not create work tree at {path}")]
    CreateWorkTree {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not determine a home directory to root the work tree under")]
    NoHome,
}

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("overlay mount of {target} failed")]
    Mount {
        target: PathBuf,
        #[source]
        source: nix::Error,
    },
}

#[derive(Error, Debug)]
pub enum WrapperError {
    #[error("could not write wrapper script at {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("setuid(getuid()) failed")]
    SetUid(#[source] nix::Error),

    #[error(transparent)]
    Exec(#[from] std::io::Error),
}
