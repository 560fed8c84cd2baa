//! Task definitions and the builder registry.
//!
//! A task turns files with one suffix into files with another. It is either a
//! fixed action or a *generator*: a function called with the invocation, the
//! environment and a [`Mode`] that returns the action to run. The host calls
//! generators in [`Mode::Signature`] only to obtain the text that goes into a
//! cache key, and in [`Mode::Execute`] to actually build; a generator must
//! not perform I/O itself.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::builder::command::CommandSpec;
use crate::builder::env::BuildEnv;
use crate::util::process::ProcessError;

/// Why a generator is being called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Only describe the action, for cache keys.
    Signature,
    /// The action is about to run.
    Execute,
}

/// Targets and sources of one task invocation.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub targets: &'a [PathBuf],
    pub sources: &'a [PathBuf],
}

impl<'a> Invocation<'a> {
    pub fn new(targets: &'a [PathBuf], sources: &'a [PathBuf]) -> Self {
        Invocation { targets, sources }
    }

    pub fn target(&self) -> Option<&'a Path> {
        self.targets.first().map(PathBuf::as_path)
    }

    pub fn source(&self) -> Option<&'a Path> {
        self.sources.first().map(PathBuf::as_path)
    }
}

/// Failure of a single task.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("{action} failed for {target}")]
    Function {
        action: String,
        target: String,
        #[source]
        source: anyhow::Error,
    },
}

impl TaskError {
    /// Exit status of the failed command, when a command was run.
    pub fn status(&self) -> Option<i32> {
        match self {
            TaskError::Process(e) => e.status(),
            TaskError::Function { .. } => None,
        }
    }
}

/// In-process action body.
pub type ActionFn = Arc<dyn Fn(&Invocation<'_>, &BuildEnv) -> anyhow::Result<()> + Send + Sync>;

/// Generator returning the action for an invocation.
pub type Generator = Arc<dyn Fn(&Invocation<'_>, &BuildEnv, Mode) -> Action + Send + Sync>;

/// What a task does for one invocation.
#[derive(Clone)]
pub enum Action {
    /// Run an external command.
    Command {
        command: CommandSpec,
        description: String,
    },
    /// Run a function inside this process. `params` is everything besides
    /// the sources that decides the function's output.
    Function {
        name: String,
        description: String,
        params: Vec<String>,
        func: ActionFn,
    },
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Command {
                command,
                description,
            } => f
                .debug_struct("Command")
                .field("command", command)
                .field("description", description)
                .finish(),
            Action::Function {
                name,
                description,
                params,
                ..
            } => f
                .debug_struct("Function")
                .field("name", name)
                .field("description", description)
                .field("params", &params.len())
                .finish(),
        }
    }
}

impl Action {
    pub fn command(command: CommandSpec, description: impl Into<String>) -> Self {
        Action::Command {
            command,
            description: description.into(),
        }
    }

    pub fn function<F>(name: impl Into<String>, description: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Invocation<'_>, &BuildEnv) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Action::Function {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
            func: Arc::new(func),
        }
    }

    /// Add a parameter to a function action's signature.
    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        if let Action::Function { params, .. } = &mut self {
            params.push(param.into());
        }
        self
    }

    /// Text identifying this action in a cache key. Performs no I/O.
    pub fn signature_contents(&self, env: &BuildEnv) -> String {
        let none = Invocation::new(&[], &[]);
        match self {
            Action::Command { command, .. } => {
                env.expand_command(command, &none, Mode::Signature).to_string()
            }
            Action::Function { name, params, .. } => {
                let mut contents = format!("function:{}", name);
                for param in params {
                    contents.push('\n');
                    contents.push_str(param);
                }
                contents
            }
        }
    }

    /// Human-readable description with the invocation substituted.
    pub fn describe(&self, inv: &Invocation<'_>, env: &BuildEnv) -> String {
        let description = match self {
            Action::Command { description, .. } | Action::Function { description, .. } => {
                description
            }
        };
        env.subst_for(description, inv, Mode::Execute)
    }

    /// Run the action, blocking until it finishes.
    pub fn execute(&self, inv: &Invocation<'_>, env: &BuildEnv) -> Result<(), TaskError> {
        tracing::info!("{}", self.describe(inv, env));

        match self {
            Action::Command { command, .. } => {
                let command = env.expand_command(command, inv, Mode::Execute);
                tracing::debug!("running `{}`", command);
                command.to_process().exec_and_check()?;
                Ok(())
            }
            Action::Function { name, func, .. } => {
                func(inv, env).map_err(|source| TaskError::Function {
                    action: name.clone(),
                    target: inv
                        .target()
                        .map(|t| t.display().to_string())
                        .unwrap_or_default(),
                    source,
                })
            }
        }
    }
}

/// How a task produces its action.
#[derive(Clone)]
pub enum TaskKind {
    Fixed(Action),
    Generator(Generator),
}

/// A registered task.
#[derive(Clone)]
pub struct TaskDef {
    name: String,
    suffix: String,
    src_suffix: String,
    kind: TaskKind,
    side_effect: bool,
}

impl fmt::Debug for TaskDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            TaskKind::Fixed(_) => "fixed",
            TaskKind::Generator(_) => "generator",
        };
        f.debug_struct("TaskDef")
            .field("name", &self.name)
            .field("suffix", &self.suffix)
            .field("src_suffix", &self.src_suffix)
            .field("kind", &kind)
            .field("side_effect", &self.side_effect)
            .finish()
    }
}

impl TaskDef {
    /// A task backed by a generator function.
    pub fn generator<F>(
        name: impl Into<String>,
        suffix: impl Into<String>,
        src_suffix: impl Into<String>,
        generator: F,
    ) -> Self
    where
        F: Fn(&Invocation<'_>, &BuildEnv, Mode) -> Action + Send + Sync + 'static,
    {
        TaskDef {
            name: name.into(),
            suffix: suffix.into(),
            src_suffix: src_suffix.into(),
            kind: TaskKind::Generator(Arc::new(generator)),
            side_effect: false,
        }
    }

    /// A task that always runs the same action.
    pub fn fixed(
        name: impl Into<String>,
        suffix: impl Into<String>,
        src_suffix: impl Into<String>,
        action: Action,
    ) -> Self {
        TaskDef {
            name: name.into(),
            suffix: suffix.into(),
            src_suffix: src_suffix.into(),
            kind: TaskKind::Fixed(action),
            side_effect: false,
        }
    }

    /// Mark the task as having effects beyond its target; such nodes are
    /// never served from or stored in the cache.
    pub fn with_side_effect(mut self) -> Self {
        self.side_effect = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn src_suffix(&self) -> &str {
        &self.src_suffix
    }

    pub fn has_side_effect(&self) -> bool {
        self.side_effect
    }

    /// The action for an invocation.
    pub fn action(&self, inv: &Invocation<'_>, env: &BuildEnv, mode: Mode) -> Action {
        match &self.kind {
            TaskKind::Fixed(action) => action.clone(),
            TaskKind::Generator(generator) => generator(inv, env, mode),
        }
    }

    /// The command of a fixed command task, for in-place edits.
    pub fn command_mut(&mut self) -> Option<&mut CommandSpec> {
        match &mut self.kind {
            TaskKind::Fixed(Action::Command { command, .. }) => Some(command),
            _ => None,
        }
    }

    /// Whether this task produces `target`, judged by suffix.
    pub fn produces(&self, target: &Path) -> bool {
        !self.suffix.is_empty() && file_name(target).is_some_and(|n| n.ends_with(&self.suffix))
    }

    /// Source path for `target`: the output suffix swapped for the input one.
    ///
    /// A target that was named by appending the output suffix to the source
    /// name (`main.cpp.d`) maps back to that source (`main.cpp`).
    pub fn source_for(&self, target: &Path) -> Option<PathBuf> {
        let name = file_name(target)?;
        let stem = name.strip_suffix(self.suffix.as_str())?;
        if self.suffix.is_empty() || stem.is_empty() {
            return None;
        }
        if !self.src_suffix.is_empty() && stem.ends_with(&self.src_suffix) {
            return Some(target.with_file_name(stem));
        }
        Some(target.with_file_name(format!("{}{}", stem, self.src_suffix)))
    }

    /// Target path for `source`: the inverse of [`TaskDef::source_for`].
    pub fn target_for(&self, source: &Path) -> Option<PathBuf> {
        let name = file_name(source)?;
        let stem = name.strip_suffix(self.src_suffix.as_str())?;
        if self.suffix.is_empty() || stem.is_empty() {
            return None;
        }
        Some(source.with_file_name(format!("{}{}", stem, self.suffix)))
    }
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

/// Tasks registered for one environment, by name.
#[derive(Clone, Default)]
pub struct BuilderRegistry {
    tasks: BTreeMap<String, TaskDef>,
}

impl BuilderRegistry {
    pub fn new() -> Self {
        BuilderRegistry::default()
    }

    /// Register a task, replacing one with the same name.
    pub fn register(&mut self, task: TaskDef) -> Option<TaskDef> {
        tracing::debug!("registering builder {}", task.name);
        self.tasks.insert(task.name.clone(), task)
    }

    /// Register a task unless the name is taken. Returns whether it was added.
    pub fn register_unique(&mut self, task: TaskDef) -> bool {
        if self.tasks.contains_key(&task.name) {
            return false;
        }
        self.register(task);
        true
    }

    pub fn get(&self, name: &str) -> Option<&TaskDef> {
        self.tasks.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut TaskDef> {
        self.tasks.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// The task producing `target`. When several match, the longest output
    /// suffix wins. Tasks with an empty suffix are only reachable by name.
    pub fn for_target(&self, target: &Path) -> Option<&TaskDef> {
        self.tasks
            .values()
            .filter(|task| task.produces(target))
            .max_by_key(|task| task.suffix.len())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.tasks.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskDef> + '_ {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
