// This file is dual licensed under the terms of the Apache License, Version
// 2.0, and the BSD License. See the LICENSE file in the root of this repository
// for complete details.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;

use boxrun::{config::Layout, run, RepositorySource, RunOptions};

mod logging;

/// Constructs a private mount namespace composing the resolved dependency
/// closure of a program over the unified index, then executes it.
#[derive(Parser, Debug)]
#[clap(version)]
struct Cli {
    /// Force architecture filter
    #[clap(short = 'a', long = "arch")]
    arch: Option<String>,

    /// Extra manifest (repeatable)
    #[clap(short = 'd', long = "dependencies")]
    dependencies: Vec<PathBuf>,

    /// Suppress non-fatal warnings
    #[clap(short = 'q', long = "quiet")]
    quiet: bool,

    /// Progress on stderr; a second -v enables debug tracing
    #[clap(short = 'v', long = "verbose", parse(from_occurrences))]
    verbose: u8,

    /// Exit 0 iff sandbox can be constructed on this host; do not run anything
    #[clap(short = 'c', long = "check")]
    check: bool,

    /// Default operator becomes `=` instead of `>=`
    #[clap(short = 'S', long = "strict")]
    strict: bool,

    /// Exclude base /System/Index/<T> from lowerdir
    #[clap(short = 'p', long = "pure")]
    pure: bool,

    /// If sandbox unavailable, exec the target directly
    #[clap(short = 'f', long = "fallback")]
    fallback: bool,

    /// Skip wrapper generation
    #[clap(short = 'E', long = "no-source-env")]
    no_source_env: bool,

    /// Retain the work tree on exit
    #[clap(short = 'C', long = "no-cleanup")]
    no_cleanup: bool,

    /// Disable pruner
    #[clap(short = 'R', long = "no-removedeps")]
    no_removedeps: bool,

    /// Program to execute
    command: String,

    /// Arguments passed through to the target program
    arguments: Vec<String>,
}

fn level_for(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::setup(level_for(cli.verbose, cli.quiet));

    let opts = RunOptions {
        executable: cli.command,
        args: cli.arguments,
        extra_manifests: cli.dependencies,
        arch: cli.arch,
        quiet: cli.quiet,
        check: cli.check,
        strict: cli.strict,
        pure: cli.pure,
        fallback: cli.fallback,
        no_source_env: cli.no_source_env,
        no_cleanup: cli.no_cleanup,
        no_removedeps: cli.no_removedeps,
        source: RepositorySource::LocalPrograms,
    };

    match run(opts, Layout::from_env()) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(err.exit_code());
        }
    }
}
