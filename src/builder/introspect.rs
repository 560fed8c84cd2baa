//! `.E` and `.d` tasks for inspecting how a C++ source is compiled.
//!
//! Both run the environment's compile command with `-c` swapped out, so the
//! output reflects exactly the flags, defines and include paths the real
//! build uses.

use anyhow::{anyhow, Context, Result};

use crate::builder::command::CommandSpec;
use crate::builder::env::{BuildEnv, CXXCOM, PREPROCESSCOM, SOURCEDEPCOM};
use crate::builder::task::{Action, TaskDef};

pub const PREPROCESS: &str = "PreProcess";
pub const SOURCE_DEP: &str = "SourceDep";

/// Register `PreProcess` (`.cpp` → `.E`, all macros after preprocessing).
pub fn add_preprocess(env: &mut BuildEnv) -> Result<()> {
    let command = derived_command(env, PREPROCESSCOM, &["-dM", "-E"])?;
    env.add_builder_unique(TaskDef::fixed(
        PREPROCESS,
        ".E",
        ".cpp",
        Action::command(command, "Preprocessing $SOURCE"),
    ));
    Ok(())
}

/// Register `SourceDep` (`.cpp` → `.d`, make-style header dependencies).
pub fn add_sourcedep(env: &mut BuildEnv) -> Result<()> {
    let command = derived_command(env, SOURCEDEPCOM, &["-M"])?;
    env.add_builder_unique(TaskDef::fixed(
        SOURCE_DEP,
        ".d",
        ".cpp",
        Action::command(command, "Generating dependencies file for $SOURCE"),
    ));
    Ok(())
}

/// The command stored under `name`, deriving it from the compile command
/// first when nothing is configured.
fn derived_command(env: &mut BuildEnv, name: &str, replacement: &[&str]) -> Result<CommandSpec> {
    if let Some(command) = env.command(name) {
        tracing::debug!("using configured {}", name);
        return Ok(command.clone());
    }

    let cxxcom = env
        .command(CXXCOM)
        .ok_or_else(|| anyhow!("{} is not set, cannot derive {}", CXXCOM, name))?;
    let command = cxxcom
        .replace_flag("-c", replacement)
        .with_context(|| format!("cannot derive {} from {}", name, CXXCOM))?;

    env.set_default_command(name, command.clone());
    Ok(command)
}
