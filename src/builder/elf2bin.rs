//! Local replacement of the framework's `elf2bin.py`.
//!
//! For framework releases it knows about, the project ships its own copy of
//! the image conversion script under `scripts/`. When the installed
//! framework is one of those, the `ElfToBin` command is pointed at the local
//! script; any other version keeps the vendor command as is.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::builder::command::CommandSpec;
use crate::builder::env::BuildEnv;
use crate::builder::task::{Action, TaskDef};

pub const ELF_TO_BIN: &str = "ElfToBin";

/// Framework versions with a local script, as `major_minor_patch`.
pub const KNOWN_VERSIONS: &[&str] = &[
    // framework-arduinoespressif8266 @ 3.20704.0 (2.7.4)
    "3_20704_0",
    // framework-arduinoespressif8266 @ 3.30102.0 (3.1.2)
    "3_30102_0",
];

/// Source of installed package versions.
pub trait PackageVersions {
    /// Version of `package`, or `None` when it is not installed.
    fn package_version(&self, package: &str) -> Result<Option<String>>;
}

/// Installed PlatformIO packages, read from each package's `package.json`.
#[derive(Debug, Clone)]
pub struct PlatformioPackages {
    packages_dir: PathBuf,
}

#[derive(Deserialize)]
struct PackageManifest {
    version: String,
}

impl PlatformioPackages {
    pub fn new(packages_dir: impl Into<PathBuf>) -> Self {
        PlatformioPackages {
            packages_dir: packages_dir.into(),
        }
    }

    pub fn packages_dir(&self) -> &Path {
        &self.packages_dir
    }
}

impl PackageVersions for PlatformioPackages {
    fn package_version(&self, package: &str) -> Result<Option<String>> {
        let manifest = self.packages_dir.join(package).join("package.json");
        if !manifest.is_file() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&manifest)
            .with_context(|| format!("failed to read {}", manifest.display()))?;
        let parsed: PackageManifest = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", manifest.display()))?;
        Ok(Some(parsed.version))
    }
}

/// Fixed versions, for hosts that already know what is installed.
impl PackageVersions for HashMap<String, String> {
    fn package_version(&self, package: &str) -> Result<Option<String>> {
        Ok(self.get(package).cloned())
    }
}

/// `major_minor_patch` for a plain release version.
///
/// Anything that is not exactly `MAJOR.MINOR.PATCH` (surrounding
/// whitespace, pre-release or build metadata) has no key.
pub fn version_key(version: &str) -> Option<String> {
    let parsed = semver::Version::parse(version).ok()?;
    if !parsed.pre.is_empty() || !parsed.build.is_empty() {
        return None;
    }
    Some(format!("{}_{}_{}", parsed.major, parsed.minor, parsed.patch))
}

/// Result of [`patch_elf2bin`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The command now runs `script`.
    Patched { version: String, script: String },
    /// Installed, but not a version with a local script.
    UnknownVersion(String),
    NotInstalled,
    /// No fixed `ElfToBin` command to patch.
    NoBuilder,
}

/// Register the vendor `ElfToBin` command unless one exists.
pub fn add_elf_to_bin(env: &mut BuildEnv) {
    env.add_builder_unique(TaskDef::fixed(
        ELF_TO_BIN,
        ".bin",
        ".elf",
        Action::command(
            CommandSpec::new("$PYTHONEXE").args([
                "${FRAMEWORK_DIR}/tools/elf2bin.py",
                "--app",
                "$SOURCE",
                "--out",
                "$TARGET",
            ]),
            "Building $TARGET",
        ),
    ));
}

/// Point `ElfToBin` at the project's script when the installed `package`
/// is a known version. Only the script argument changes.
pub fn patch_elf2bin(
    env: &mut BuildEnv,
    packages: &dyn PackageVersions,
    package: &str,
) -> Result<PatchOutcome> {
    let Some(version) = packages.package_version(package)? else {
        tracing::debug!("{} is not installed, keeping the default elf2bin", package);
        return Ok(PatchOutcome::NotInstalled);
    };

    let key = version_key(&version).filter(|key| KNOWN_VERSIONS.contains(&key.as_str()));
    let Some(key) = key else {
        tracing::debug!("{} @ {} has no local elf2bin", package, version);
        return Ok(PatchOutcome::UnknownVersion(version));
    };

    // The argument keeps the variable, so the project path is only
    // substituted when the command runs.
    let template = format!("${{PROJECT_DIR}}/scripts/platform_elf2bin_{}.py", key);
    let script = env.subst(&template);

    let Some(command) = env
        .builders_mut()
        .get_mut(ELF_TO_BIN)
        .and_then(TaskDef::command_mut)
    else {
        tracing::warn!("no {} command to patch", ELF_TO_BIN);
        return Ok(PatchOutcome::NoBuilder);
    };

    let previous = command.set_arg(0, &template)?;
    tracing::debug!("elf2bin: {} -> {}", previous, script);

    Ok(PatchOutcome::Patched {
        version: key,
        script,
    })
}
