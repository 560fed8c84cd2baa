//! Release file naming and installation.
//!
//! Every artifact of an environment is published as
//! `espurna-<version>-<build name>.<ext>`, where the build name defaults to
//! the environment name. Installed files go to a destination directory,
//! debug artifacts in its `debug/` subdirectory.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use crate::builder::env::BuildEnv;
use crate::util::fs::{copy_atomic, ensure_dir};

/// Names that build and install the release files.
pub const ALIAS_INSTALL: &str = "install";
pub const ALIAS_BUILD_AND_COPY: &str = "build-and-copy";

/// `espurna-<version>`.
pub fn firmware_prefix(env: &BuildEnv) -> Result<String> {
    let version = env
        .var("ESPURNA_VERSION")
        .filter(|v| !v.is_empty())
        .ok_or_else(|| anyhow!("firmware version is not set"))?;
    Ok(format!("espurna-{}", version))
}

/// `espurna-<version>-<build name or environment name>`.
pub fn firmware_filename(env: &BuildEnv) -> Result<String> {
    let name = env
        .var("ESPURNA_BUILD_NAME")
        .filter(|n| !n.is_empty())
        .unwrap_or(env.name());
    Ok(format!("{}-{}", firmware_prefix(env)?, name))
}

/// A configured destination, before substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Nothing configured: `${PROJECT_DIR}/build`
    Default,
    /// Starts with a variable reference, used as is
    Variable(String),
    /// Absolute path, used as is
    Absolute(String),
    /// Anything else, taken relative to the project root
    ProjectRelative(String),
}

impl Destination {
    pub fn classify(value: Option<&str>) -> Self {
        match value {
            None | Some("") => Destination::Default,
            Some(v) if v.starts_with('$') => Destination::Variable(v.to_string()),
            Some(v) if v.starts_with('/') => Destination::Absolute(v.to_string()),
            Some(v) => Destination::ProjectRelative(v.to_string()),
        }
    }

    /// The path template this destination stands for.
    pub fn template(&self) -> String {
        match self {
            Destination::Default => "${PROJECT_DIR}/build".to_string(),
            Destination::Variable(v) | Destination::Absolute(v) => v.clone(),
            Destination::ProjectRelative(v) => format!("${{PROJECT_DIR}}/{}", v),
        }
    }

    /// Substitute and normalize into an absolute directory. Referring to a
    /// variable that is not set is an error.
    pub fn resolve(&self, env: &BuildEnv) -> Result<PathBuf> {
        env.try_path(&self.template())
            .context("invalid firmware destination")
    }
}

/// The destination directory of the environment.
pub fn firmware_destination(env: &BuildEnv) -> Result<PathBuf> {
    Destination::classify(env.var("ESPURNA_BUILD_DESTINATION")).resolve(env)
}

/// One file to install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallEntry {
    pub source: PathBuf,
    pub target: PathBuf,
}

/// Files to publish for an environment.
#[derive(Debug, Clone)]
pub struct InstallPlan {
    destination: PathBuf,
    filename: String,
    entries: Vec<InstallEntry>,
    aliases: BTreeMap<String, Vec<String>>,
}

impl InstallPlan {
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn entries(&self) -> &[InstallEntry] {
        &self.entries
    }

    /// What each alias stands for.
    pub fn aliases(&self) -> &BTreeMap<String, Vec<String>> {
        &self.aliases
    }

    pub fn is_alias(&self, name: &str) -> bool {
        self.aliases.contains_key(name)
    }

    /// Copy every built file to its destination.
    pub fn install(&self) -> Result<Vec<PathBuf>> {
        let mut installed = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            if let Some(parent) = entry.target.parent() {
                ensure_dir(parent)?;
            }
            let mut file = File::open(&entry.source)
                .with_context(|| format!("cannot install {}", entry.source.display()))?;
            copy_atomic(&mut file, &entry.target)?;
            tracing::info!("Installed {}", entry.target.display());
            installed.push(entry.target.clone());
        }
        Ok(installed)
    }
}

/// Record the destination and release file name in the environment and
/// describe how the release files are installed.
pub fn add_target_build_and_copy(env: &mut BuildEnv) -> Result<InstallPlan> {
    let destination = firmware_destination(env)?;
    let filename = firmware_filename(env)?;
    env.set_literal_var(
        "ESPURNA_BUILD_DESTINATION",
        destination.to_string_lossy(),
    );
    env.set_literal_var("ESPURNA_BUILD_FILENAME", &filename);

    let mut entries = vec![InstallEntry {
        source: env.path("${BUILD_DIR}/${PROGNAME}.bin"),
        target: env.path("${ESPURNA_BUILD_DESTINATION}/${ESPURNA_BUILD_FILENAME}.bin"),
    }];
    for suffix in ["map", "elf.debug"] {
        entries.push(InstallEntry {
            source: env.path(&format!("${{BUILD_DIR}}/${{PROGNAME}}.{}", suffix)),
            target: env.path(&format!(
                "${{ESPURNA_BUILD_DESTINATION}}/debug/${{ESPURNA_BUILD_FILENAME}}.{}",
                suffix
            )),
        });
    }

    let bin = entries[0].source.display().to_string();
    let mut aliases = BTreeMap::new();
    aliases.insert(
        ALIAS_INSTALL.to_string(),
        vec![destination.display().to_string()],
    );
    aliases.insert(
        ALIAS_BUILD_AND_COPY.to_string(),
        vec![bin, ALIAS_INSTALL.to_string()],
    );

    Ok(InstallPlan {
        destination,
        filename,
        entries,
        aliases,
    })
}
