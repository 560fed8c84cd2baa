//! Build environment: variables, command templates, the builder registry and
//! the signature strategy for one named environment.
//!
//! An environment is assembled once, with exclusive access, and then only
//! shared immutably while nodes are built. Everything a task needs at build
//! time is reachable from `&BuildEnv`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::builder::command::{subst, subst_checked, CommandSpec, VarValue};
use crate::builder::signature::SignatureStrategy;
use crate::builder::task::{BuilderRegistry, Invocation, Mode, TaskDef};
use crate::util::config::Config;
use crate::util::fs::absolutize;

/// Compile command template for C++ sources.
pub const CXXCOM: &str = "CXXCOM";
/// Preprocessor-only command, macros dumped.
pub const PREPROCESSCOM: &str = "PREPROCESSCOM";
/// Dependency listing command.
pub const SOURCEDEPCOM: &str = "SOURCEDEPCOM";

/// A configured build environment.
pub struct BuildEnv {
    name: String,
    project_dir: PathBuf,
    build_dir: PathBuf,
    vars: BTreeMap<String, VarValue>,
    commands: BTreeMap<String, CommandSpec>,
    builders: BuilderRegistry,
    signature: Arc<dyn SignatureStrategy>,
    default_targets: Vec<PathBuf>,
}

impl fmt::Debug for BuildEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildEnv")
            .field("name", &self.name)
            .field("project_dir", &self.project_dir)
            .field("build_dir", &self.build_dir)
            .field("vars", &self.vars)
            .field("commands", &self.commands)
            .field("builders", &self.builders.names().collect::<Vec<_>>())
            .field("signature", &self.signature.name())
            .finish()
    }
}

impl BuildEnv {
    /// Create an empty environment. `build_dir` may be relative to
    /// `project_dir`.
    pub fn new(
        name: impl Into<String>,
        project_dir: impl Into<PathBuf>,
        build_dir: impl AsRef<Path>,
        signature: Arc<dyn SignatureStrategy>,
    ) -> Self {
        let name = name.into();
        let project_dir = project_dir.into();
        let build_dir = absolutize(&project_dir, build_dir.as_ref());

        let mut vars = BTreeMap::new();
        vars.insert("PIOENV".to_string(), VarValue::Literal(name.clone()));
        vars.insert(
            "PROJECT_DIR".to_string(),
            VarValue::Literal(project_dir.to_string_lossy().into_owned()),
        );
        vars.insert(
            "BUILD_DIR".to_string(),
            VarValue::Literal(build_dir.to_string_lossy().into_owned()),
        );

        BuildEnv {
            name,
            project_dir,
            build_dir,
            vars,
            commands: BTreeMap::new(),
            builders: BuilderRegistry::new(),
            signature,
            default_targets: Vec::new(),
        }
    }

    /// Create an environment from project configuration.
    pub fn from_config(
        project_dir: &Path,
        config: &Config,
        signature: Arc<dyn SignatureStrategy>,
    ) -> Result<Self> {
        let project_dir = std::fs::canonicalize(project_dir)
            .with_context(|| format!("project directory not found: {}", project_dir.display()))?;

        let env_name = config.env.name.clone();
        let build_dir = {
            let project = project_dir.to_string_lossy().into_owned();
            subst(&config.env.build_dir, &|name| match name {
                "PIOENV" => Some(VarValue::Literal(env_name.clone())),
                "PROJECT_DIR" => Some(VarValue::Literal(project.clone())),
                _ => None,
            })
        };

        let mut env = BuildEnv::new(&config.env.name, &project_dir, build_dir, signature);

        let tools = &config.toolchain;
        env.set_var("PROGNAME", &config.env.progname);
        env.set_var("ESPURNA_VERSION", &config.env.version);
        env.set_var("CXX", &tools.cxx);
        env.set_var("OBJCOPY", &tools.objcopy);
        env.set_var("PYTHONEXE", &tools.python);
        env.set_var("RE2C", &tools.re2c);

        if let Some(ref build_name) = config.env.build_name {
            env.set_var("ESPURNA_BUILD_NAME", build_name);
        }
        if let Some(ref destination) = config.env.destination {
            env.set_var("ESPURNA_BUILD_DESTINATION", destination);
        }
        if let Some(packages) = config.platformio.packages_dir() {
            let framework = packages.join(&config.platformio.framework_package);
            env.set_literal_var("FRAMEWORK_DIR", framework.to_string_lossy());
        }

        let mut cxxcom = CommandSpec::new("$CXX")
            .args(["-o", "$TARGET", "-c"])
            .args(tools.cxxflags.iter().cloned())
            .args(tools.defines.iter().map(|d| format!("-D{}", d)));
        for dir in &tools.include_dirs {
            let flag = if Path::new(dir).is_absolute() {
                format!("-I{}", dir)
            } else {
                format!("-I${{PROJECT_DIR}}/{}", dir)
            };
            cxxcom = cxxcom.arg(flag);
        }
        env.set_command(CXXCOM, cxxcom.arg("$SOURCE"));

        if let Some(ref argv) = tools.preprocess_command {
            let command = CommandSpec::from_argv(argv)
                .context("invalid toolchain.preprocess_command")?;
            env.set_command(PREPROCESSCOM, command);
        }
        if let Some(ref argv) = tools.sourcedep_command {
            let command = CommandSpec::from_argv(argv)
                .context("invalid toolchain.sourcedep_command")?;
            env.set_command(SOURCEDEPCOM, command);
        }

        Ok(env)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(VarValue::as_str)
    }

    /// Set a variable whose value may refer to other variables.
    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars
            .insert(name.into(), VarValue::Template(value.into()));
    }

    /// Set a variable that is substituted verbatim, such as a resolved path.
    pub fn set_literal_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), VarValue::Literal(value.into()));
    }

    /// Set a variable only when it has no value yet.
    pub fn set_default_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars
            .entry(name.into())
            .or_insert_with(|| VarValue::Template(value.into()));
    }

    /// Expand variables in `template`.
    pub fn subst(&self, template: &str) -> String {
        subst(template, &|name| self.vars.get(name).cloned())
    }

    /// Expand variables, including `$SOURCE(S)` and `$TARGET(S)` for an
    /// invocation.
    ///
    /// In [`Mode::Signature`] the invocation variables are left literal so
    /// that per-environment absolute paths never end up in cache keys.
    pub fn subst_for(&self, template: &str, inv: &Invocation<'_>, mode: Mode) -> String {
        subst(template, &|name| self.lookup_for(name, inv, mode))
    }

    /// Expand a command for an invocation.
    pub fn expand_command(&self, command: &CommandSpec, inv: &Invocation<'_>, mode: Mode) -> CommandSpec {
        command.expand(&|name| self.lookup_for(name, inv, mode))
    }

    fn lookup_for(&self, name: &str, inv: &Invocation<'_>, mode: Mode) -> Option<VarValue> {
        let paths = match name {
            "SOURCE" | "SOURCES" => inv.sources,
            "TARGET" | "TARGETS" => inv.targets,
            _ => return self.vars.get(name).cloned(),
        };

        if mode == Mode::Signature {
            return Some(VarValue::Literal(format!("${}", name)));
        }

        let rendered: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        let value = if name.ends_with('S') {
            Some(rendered.join(" "))
        } else {
            rendered.into_iter().next()
        };
        value.map(VarValue::Literal)
    }

    /// Expand a path template and make it absolute against the project root.
    pub fn path(&self, template: &str) -> PathBuf {
        absolutize(&self.project_dir, Path::new(&self.subst(template)))
    }

    /// Like [`BuildEnv::path`], but a reference to an unset variable is an
    /// error instead of expanding to nothing.
    pub fn try_path(&self, template: &str) -> Result<PathBuf> {
        let expanded = subst_checked(template, &|name| self.vars.get(name).cloned())?;
        Ok(absolutize(&self.project_dir, Path::new(&expanded)))
    }

    pub fn command(&self, name: &str) -> Option<&CommandSpec> {
        self.commands.get(name)
    }

    pub fn set_command(&mut self, name: impl Into<String>, command: CommandSpec) {
        self.commands.insert(name.into(), command);
    }

    /// Set a command only when none is configured under that name yet.
    pub fn set_default_command(&mut self, name: impl Into<String>, command: CommandSpec) {
        self.commands.entry(name.into()).or_insert(command);
    }

    /// Register a task, replacing any previous task of the same name.
    pub fn add_builder(&mut self, task: TaskDef) {
        self.builders.register(task);
    }

    /// Register a task unless one with the same name already exists.
    pub fn add_builder_unique(&mut self, task: TaskDef) -> bool {
        self.builders.register_unique(task)
    }

    pub fn builders(&self) -> &BuilderRegistry {
        &self.builders
    }

    pub fn builders_mut(&mut self) -> &mut BuilderRegistry {
        &mut self.builders
    }

    pub fn signature(&self) -> &dyn SignatureStrategy {
        self.signature.as_ref()
    }

    /// Declare a target that is built when nothing is requested explicitly.
    pub fn add_default_target(&mut self, target: PathBuf) {
        if !self.default_targets.contains(&target) {
            self.default_targets.push(target);
        }
    }

    pub fn default_targets(&self) -> &[PathBuf] {
        &self.default_targets
    }
}
