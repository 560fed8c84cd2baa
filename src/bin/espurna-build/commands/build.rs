//! `espurna-build build` command

use anyhow::Result;

use crate::cli::{BuildArgs, ProjectArgs};
use crate::commands::{load_config, setup};
use espurna_build::builder::{Phase, Re2c};
use espurna_build::ops::{prepass, BuildOptions};

/// Returns the process exit status.
pub fn execute(project: &ProjectArgs, args: BuildArgs, verbose: bool) -> Result<i32> {
    let config = load_config(project)?;

    // Grammars are generated before anything else is looked at.
    let re2c = Re2c::new(&config.toolchain.re2c).in_dir(&project.project_dir);
    if let Phase::Terminate(code) = prepass(&args.targets, &re2c) {
        return Ok(code);
    }

    let orch = setup(project, &config)?;
    let opts = BuildOptions {
        targets: args.targets,
        no_cache: args.no_cache,
        verbose,
    };

    let result = orch.build(&opts)?;

    for path in &result.report.cached {
        eprintln!("      Cached {}", path.display());
    }
    for path in &result.report.built {
        eprintln!("       Built {}", path.display());
    }
    for path in &result.installed {
        eprintln!("   Installed {}", path.display());
    }
    if result.report.total() == 0 && result.installed.is_empty() {
        eprintln!("    Finished nothing to build");
    }

    Ok(0)
}
