//! Implementation of `espurna-build build`.
//!
//! A run has two phases. The grammar pre-pass looks at the requested names
//! only and may end the run before anything else happens. Otherwise the
//! environment is set up once (tasks registered, elf2bin patched, defaults
//! declared) and from then on only read while the requested targets are
//! built.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::builder::cache::CacheDir;
use crate::builder::elf2bin::{add_elf_to_bin, patch_elf2bin, PackageVersions, PatchOutcome};
use crate::builder::env::BuildEnv;
use crate::builder::executor::{BuildExecutor, BuildReport};
use crate::builder::grammar::{GrammarCompiler, GrammarPrePass, Phase};
use crate::builder::node::Node;
use crate::builder::postprocess::add_postprocess;
use crate::builder::signature::SignatureStrategy;
use crate::builder::single_source::{add_single_source, SingleSource};
use crate::ops::firmware::{add_target_build_and_copy, InstallPlan};
use crate::util::config::Config;
use crate::util::fs::list_files_with_extension;

/// Options for the build command.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Targets to build (empty = the environment's defaults)
    pub targets: Vec<String>,

    /// Ignore the cache directory
    pub no_cache: bool,

    /// Verbose output
    pub verbose: bool,
}

/// Build result.
#[derive(Debug, Default)]
pub struct BuildResult {
    pub report: BuildReport,

    /// Files copied by the install aliases
    pub installed: Vec<PathBuf>,
}

/// Run the grammar pre-pass over the requested names.
pub fn prepass(requested: &[String], compiler: &dyn GrammarCompiler) -> Phase {
    GrammarPrePass::new(compiler).run(requested)
}

/// A fully set up environment.
#[derive(Debug)]
pub struct Orchestrator {
    env: BuildEnv,
    single: SingleSource,
    install: InstallPlan,
    elf2bin: PatchOutcome,
    cache: Option<CacheDir>,
}

impl Orchestrator {
    /// Create and configure the environment for `config`.
    pub fn setup(
        project_dir: &Path,
        config: &Config,
        strategy: Arc<dyn SignatureStrategy>,
        packages: &dyn PackageVersions,
    ) -> Result<Self> {
        let mut env = BuildEnv::from_config(project_dir, config, strategy)?;
        tracing::debug!(
            "environment {} in {} ({} signatures)",
            env.name(),
            env.build_dir().display(),
            env.signature().name()
        );

        add_postprocess(&mut env);
        add_single_source(&mut env)?;
        add_elf_to_bin(&mut env);
        let elf2bin = patch_elf2bin(&mut env, packages, &config.platformio.framework_package)?;
        let install = add_target_build_and_copy(&mut env)?;

        let single = SingleSource::new(&env);
        let cache = if config.cache.disabled {
            None
        } else {
            Some(CacheDir::new(env.path(&config.cache.dir)))
        };

        Ok(Orchestrator {
            env,
            single,
            install,
            elf2bin,
            cache,
        })
    }

    pub fn env(&self) -> &BuildEnv {
        &self.env
    }

    pub fn single_source(&self) -> &SingleSource {
        &self.single
    }

    pub fn install_plan(&self) -> &InstallPlan {
        &self.install
    }

    pub fn elf2bin(&self) -> &PatchOutcome {
        &self.elf2bin
    }

    pub fn cache(&self) -> Option<&CacheDir> {
        self.cache.as_ref()
    }

    /// Project sources as they enter the build, with the `espurna/*.cpp`
    /// files folded into the generated unit.
    pub fn discover_sources(&self) -> Result<Vec<PathBuf>> {
        let mut discovered = list_files_with_extension(self.single.source_dir(), "cpp")?;
        discovered.extend(list_files_with_extension(&self.env.path("${PROJECT_DIR}/src"), "cpp")?);
        self.single.filter_discovered(discovered)
    }

    /// Node for a target path, dispatching on its suffix. Sources that do
    /// not exist yet but can be built become derived nodes themselves; an
    /// existing target whose source is gone is used as it is.
    pub fn node_for(&self, target: &Path) -> Result<Arc<Node>> {
        self.node_for_depth(target, 0)
    }

    fn node_for_depth(&self, target: &Path, depth: usize) -> Result<Arc<Node>> {
        if depth > 8 {
            bail!("cannot resolve {}: suffix chain too long", target.display());
        }
        if target == self.single.target() {
            return self.single.node();
        }

        let Some(task) = self.env.builders().for_target(target) else {
            if target.exists() {
                return Ok(Node::source(target));
            }
            bail!("don't know how to make `{}`", target.display());
        };
        let Some(source) = task.source_for(target) else {
            bail!("don't know how to make `{}`", target.display());
        };

        let buildable = source == self.single.target()
            || (!source.exists() && self.env.builders().for_target(&source).is_some());
        if !buildable && !source.exists() && target.exists() {
            // Produced outside of this tool (the linker, usually).
            return Ok(Node::source(target));
        }
        let source = if buildable {
            self.node_for_depth(&source, depth + 1)?
        } else {
            Node::source(source)
        };

        Ok(Node::derived(target, task.name(), vec![source]))
    }

    /// Build `opts.targets`, or the default targets when none are given.
    pub fn build(&self, opts: &BuildOptions) -> Result<BuildResult> {
        let mut roots = Vec::new();
        let mut install = false;

        let requested: Vec<PathBuf> = if opts.targets.is_empty() {
            self.env.default_targets().to_vec()
        } else {
            let mut paths = Vec::new();
            for name in &opts.targets {
                if self.install.is_alias(name) {
                    install = true;
                    paths.extend(self.install.entries().iter().map(|e| e.source.clone()));
                } else {
                    paths.push(self.env.path(name));
                }
            }
            paths
        };

        for path in &requested {
            roots.push(self.node_for(path)?);
        }

        let mut executor = BuildExecutor::new(&self.env).verbose(opts.verbose);
        if let Some(cache) = self.cache.as_ref().filter(|_| !opts.no_cache) {
            executor = executor.with_cache(cache);
        }
        let report = executor.execute(&roots)?;

        let installed = if install {
            self.install.install()?
        } else {
            Vec::new()
        };

        Ok(BuildResult { report, installed })
    }
}
