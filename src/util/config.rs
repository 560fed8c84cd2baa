//! Project configuration.
//!
//! Settings live in `espurna-build.toml` at the project root. Every section
//! is optional; a missing file means defaults throughout. A few values are
//! commonly supplied by the calling environment instead (`PIOENV`,
//! `ESPURNA_BUILD_NAME`, `ESPURNA_BUILD_DESTINATION`) and are applied on top
//! with [`Config::apply_overrides`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// File name of the project configuration.
pub const CONFIG_FILE: &str = "espurna-build.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub env: EnvConfig,
    pub toolchain: ToolchainConfig,
    pub platformio: PlatformioConfig,
    pub cache: CacheConfig,
}

/// Build environment settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// Environment name (`PIOENV`)
    pub name: String,

    /// Firmware version string, computed by the caller
    pub version: String,

    /// Overrides the environment name in output file names
    pub build_name: Option<String>,

    /// Where finished artifacts are meant to be installed
    pub destination: Option<String>,

    /// Build directory template, relative to the project root when not absolute
    pub build_dir: String,

    /// Base name of the linked program
    pub progname: String,
}

impl Default for EnvConfig {
    fn default() -> Self {
        EnvConfig {
            name: "default".to_string(),
            version: "0.0.0".to_string(),
            build_name: None,
            destination: None,
            build_dir: ".pio/build/${PIOENV}".to_string(),
            progname: "firmware".to_string(),
        }
    }
}

/// External tools and compile flags.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    pub cxx: String,
    pub objcopy: String,
    pub python: String,
    pub re2c: String,

    /// Flags placed between `-c` and the source file
    pub cxxflags: Vec<String>,

    /// Preprocessor defines, `NAME` or `NAME=VALUE`
    pub defines: Vec<String>,

    /// Include directories, relative to the project root when not absolute
    pub include_dirs: Vec<String>,

    /// Explicit preprocess command, replaces the derived one
    pub preprocess_command: Option<Vec<String>>,

    /// Explicit dependency-listing command, replaces the derived one
    pub sourcedep_command: Option<Vec<String>>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        ToolchainConfig {
            cxx: "xtensa-lx106-elf-g++".to_string(),
            objcopy: "xtensa-lx106-elf-objcopy".to_string(),
            python: "python3".to_string(),
            re2c: "re2c".to_string(),
            cxxflags: vec!["-std=gnu++17".to_string(), "-Os".to_string()],
            defines: Vec::new(),
            include_dirs: vec!["espurna".to_string()],
            preprocess_command: None,
            sourcedep_command: None,
        }
    }
}

/// Where PlatformIO keeps installed packages.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlatformioConfig {
    /// Packages directory; defaults to `$PLATFORMIO_CORE_DIR/packages` or
    /// `~/.platformio/packages`
    pub packages_dir: Option<PathBuf>,

    /// Framework package whose version gates the elf2bin patch
    pub framework_package: String,
}

impl Default for PlatformioConfig {
    fn default() -> Self {
        PlatformioConfig {
            packages_dir: None,
            framework_package: "framework-arduinoespressif8266".to_string(),
        }
    }
}

impl PlatformioConfig {
    /// The configured packages directory, or the PlatformIO default.
    pub fn packages_dir(&self) -> Option<PathBuf> {
        if let Some(ref dir) = self.packages_dir {
            return Some(dir.clone());
        }
        if let Some(core) = std::env::var_os("PLATFORMIO_CORE_DIR") {
            return Some(PathBuf::from(core).join("packages"));
        }
        directories::BaseDirs::new().map(|b| b.home_dir().join(".platformio").join("packages"))
    }
}

/// Build cache settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache directory shared by all environments of the project
    pub dir: String,

    /// Disable cache lookups and pushes entirely
    pub disabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            dir: ".pio/cache".to_string(),
            disabled: false,
        }
    }
}

/// Values supplied by the calling environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub env_name: Option<String>,
    pub version: Option<String>,
    pub build_name: Option<String>,
    pub destination: Option<String>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config: {}", path.display()))
    }

    /// Load `espurna-build.toml` from the project root, falling back to
    /// defaults when it does not exist.
    pub fn load_for_project(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            tracing::debug!("no {} in {}, using defaults", CONFIG_FILE, project_dir.display());
            Ok(Config::default())
        }
    }

    /// Apply environment-supplied values. Empty strings count as unset.
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        fn non_empty(value: &Option<String>) -> Option<String> {
            value.as_ref().filter(|v| !v.is_empty()).cloned()
        }

        if let Some(name) = non_empty(&overrides.env_name) {
            self.env.name = name;
        }
        if let Some(version) = non_empty(&overrides.version) {
            self.env.version = version;
        }
        if let Some(build_name) = non_empty(&overrides.build_name) {
            self.env.build_name = Some(build_name);
        }
        if let Some(destination) = non_empty(&overrides.destination) {
            self.env.destination = Some(destination);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = Config::load_for_project(tmp.path()).unwrap();
        assert_eq!(config.env.progname, "firmware");
        assert_eq!(config.cache.dir, ".pio/cache");
        assert_eq!(
            config.platformio.framework_package,
            "framework-arduinoespressif8266"
        );
    }

    #[test]
    fn test_partial_file() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE),
            "[env]\nname = \"nodemcu-lolin\"\nversion = \"1.15.0\"\n\n[toolchain]\ncxxflags = [\"-O2\"]\n",
        )
        .unwrap();

        let config = Config::load_for_project(tmp.path()).unwrap();
        assert_eq!(config.env.name, "nodemcu-lolin");
        assert_eq!(config.env.version, "1.15.0");
        assert_eq!(config.env.build_dir, ".pio/build/${PIOENV}");
        assert_eq!(config.toolchain.cxxflags, ["-O2"]);
        assert_eq!(config.toolchain.objcopy, "xtensa-lx106-elf-objcopy");
    }

    #[test]
    fn test_invalid_file() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE), "[env\nname = ").unwrap();
        let err = Config::load_for_project(tmp.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("failed to parse config"));
    }

    #[test]
    fn test_overrides_ignore_empty_values() {
        let mut config = Config::default();
        config.apply_overrides(&Overrides {
            env_name: Some("wemos-d1mini".to_string()),
            version: None,
            build_name: Some(String::new()),
            destination: Some("out".to_string()),
        });

        assert_eq!(config.env.name, "wemos-d1mini");
        assert_eq!(config.env.build_name, None);
        assert_eq!(config.env.destination.as_deref(), Some("out"));
    }

    #[test]
    fn test_explicit_packages_dir() {
        let config = PlatformioConfig {
            packages_dir: Some(PathBuf::from("/opt/pio/packages")),
            ..Default::default()
        };
        assert_eq!(
            config.packages_dir(),
            Some(PathBuf::from("/opt/pio/packages"))
        );
    }
}
