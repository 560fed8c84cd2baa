//! Command implementations

pub mod build;
pub mod completions;
pub mod info;
pub mod merge;
pub mod signature;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

use crate::cli::{ProjectArgs, SignatureMode};
use espurna_build::builder::elf2bin::{PackageVersions, PlatformioPackages};
use espurna_build::builder::{BuildDirRelative, ProjectRelative, SignatureStrategy};
use espurna_build::ops::Orchestrator;
use espurna_build::util::config::{Config, Overrides};

/// Project configuration with command line and environment values applied.
pub fn load_config(project: &ProjectArgs) -> Result<Config> {
    let mut config = Config::load_for_project(&project.project_dir)?;
    config.apply_overrides(&Overrides {
        env_name: project.env_name.clone(),
        version: project.firmware_version.clone(),
        build_name: project.build_name.clone(),
        destination: project.destination.clone(),
    });
    Ok(config)
}

pub fn strategy(mode: SignatureMode) -> Arc<dyn SignatureStrategy> {
    match mode {
        SignatureMode::BuildDir => Arc::new(BuildDirRelative),
        SignatureMode::Project => Arc::new(ProjectRelative),
    }
}

/// Set up the environment for `config`.
pub fn setup(project: &ProjectArgs, config: &Config) -> Result<Orchestrator> {
    let packages: Box<dyn PackageVersions> = match config.platformio.packages_dir() {
        Some(dir) => Box::new(PlatformioPackages::new(dir)),
        None => Box::new(HashMap::<String, String>::new()),
    };
    Orchestrator::setup(
        &project.project_dir,
        config,
        strategy(project.signatures),
        packages.as_ref(),
    )
}
