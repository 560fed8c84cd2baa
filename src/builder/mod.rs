//! Firmware build tasks.
//!
//! This module implements the task protocol, the individual firmware tasks
//! and a small sequential host that builds nodes with a shared cache.

pub mod cache;
pub mod command;
pub mod elf2bin;
pub mod env;
pub mod executor;
pub mod grammar;
pub mod introspect;
pub mod node;
pub mod postprocess;
pub mod signature;
pub mod single_source;
pub mod task;

pub use cache::CacheDir;
pub use command::{CommandError, CommandSpec, VarValue};
pub use env::BuildEnv;
pub use executor::{BuildExecutor, BuildReport};
pub use grammar::{GrammarCompiler, GrammarPrePass, Phase, Re2c};
pub use node::Node;
pub use signature::{BuildDirRelative, ProjectRelative, SignatureStrategy};
pub use single_source::SingleSource;
pub use task::{Action, BuilderRegistry, Invocation, Mode, TaskDef, TaskError};
