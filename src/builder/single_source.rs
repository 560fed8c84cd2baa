//! Single translation unit build.
//!
//! Every top-level `espurna/*.cpp` is `#include`d into one generated
//! `main.cpp` under the build directory, which is then compiled instead of
//! the individual files. The generated file lives in the build directory so
//! cleaning the environment removes it too.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};

use crate::builder::env::BuildEnv;
use crate::builder::introspect::{add_preprocess, add_sourcedep};
use crate::builder::node::Node;
use crate::builder::task::{Action, TaskDef};
use crate::util::fs::{list_files_with_extension, write_atomic};

pub const SINGLE_SOURCE: &str = "SingleSource";

/// First line of every generated unit.
pub const GENERATED_BANNER: &str = "// !!! Automatically generated file; DO NOT EDIT !!! ";

const SOURCE_DIR: &str = "${PROJECT_DIR}/espurna";
const MASTER_HEADER: &str = "${PROJECT_DIR}/espurna/espurna.h";
const DEFAULT_TARGET: &str = "${BUILD_DIR}/espurna_single_source/src/main.cpp";
const DEFAULT_DEP: &str = "${BUILD_DIR}/espurna_single_source/src/main.cpp.d";

/// Resolved paths of the single-source build for one environment.
#[derive(Debug, Clone)]
pub struct SingleSource {
    source_dir: PathBuf,
    master_header: PathBuf,
    target: PathBuf,
    dep: PathBuf,
}

impl SingleSource {
    pub fn new(env: &BuildEnv) -> Self {
        SingleSource {
            source_dir: env.path(SOURCE_DIR),
            master_header: env.path(MASTER_HEADER),
            target: env.path("$ESPURNA_SINGLE_SOURCE_TARGET"),
            dep: env.path("$ESPURNA_SINGLE_SOURCE_DEP"),
        }
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn master_header(&self) -> &Path {
        &self.master_header
    }

    /// The generated `main.cpp`.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// The dependency listing for the generated unit.
    pub fn dep(&self) -> &Path {
        &self.dep
    }

    /// Top-level `.cpp` files of the source directory, sorted by name.
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        list_files_with_extension(&self.source_dir, "cpp")
    }

    /// Contents of the generated unit for `sources`.
    pub fn render(&self, sources: &[PathBuf]) -> String {
        render_unit(&self.master_header, sources)
    }

    /// Write the unit for `sources` to the target path.
    pub fn generate(&self, sources: &[PathBuf]) -> Result<()> {
        write_atomic(&self.target, self.render(sources).as_bytes())
    }

    /// Rewrite a discovered source list before the build graph is made.
    ///
    /// Files matching `<source dir>/*.cpp` are dropped, except `main.cpp`,
    /// which is replaced by the generated unit. Everything else is kept.
    pub fn filter_discovered(&self, discovered: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
        let pattern = format!(
            "{}/*.cpp",
            Pattern::escape(&self.source_dir.to_string_lossy())
        );
        let pattern = Pattern::new(&pattern)
            .with_context(|| format!("invalid source pattern {}", pattern))?;
        let options = MatchOptions {
            require_literal_separator: true,
            ..MatchOptions::new()
        };

        let mut out = Vec::with_capacity(discovered.len());
        let mut substituted = false;
        for path in discovered {
            if !pattern.matches_path_with(&path, options) {
                out.push(path);
            } else if path.file_name().is_some_and(|n| n == "main.cpp") {
                if !substituted {
                    out.push(self.target.clone());
                    substituted = true;
                }
            } else {
                tracing::debug!("{} is built as part of the single source", path.display());
            }
        }
        Ok(out)
    }

    /// Node for the generated unit, depending on every discovered source.
    pub fn node(&self) -> Result<Arc<Node>> {
        let sources = self.discover()?.into_iter().map(Node::source).collect();
        Ok(Node::derived(&self.target, SINGLE_SOURCE, sources))
    }
}

/// Render a unit including `master_header` followed by every source once.
pub fn render_unit(master_header: &Path, sources: &[PathBuf]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", GENERATED_BANNER);
    let _ = writeln!(out, "#include \"{}\"", master_header.display());

    let mut seen = HashSet::new();
    for source in sources {
        if seen.insert(source.as_path()) {
            let _ = writeln!(out, "#include \"{}\"", source.display());
        }
    }
    out
}

/// Register the merge task together with the `.E`/`.d` tasks, so those can
/// be requested for the generated unit as well.
pub fn add_single_source(env: &mut BuildEnv) -> Result<()> {
    env.set_default_var("ESPURNA_SINGLE_SOURCE_TARGET", DEFAULT_TARGET);
    env.set_default_var("ESPURNA_SINGLE_SOURCE_DEP", DEFAULT_DEP);

    add_preprocess(env)?;
    add_sourcedep(env)?;

    // The rendered unit goes into the signature: the include lines change
    // when a source is added or renamed, even if no file contents did.
    env.add_builder(TaskDef::generator(SINGLE_SOURCE, "", ".cpp", |inv, env, _| {
        let unit = render_unit(&env.path(MASTER_HEADER), inv.sources);
        Action::function("merge_cpp", "Merging project sources into $TARGET", |inv, env| {
            let target = inv.target().context("merge needs a target")?;
            let unit = render_unit(&env.path(MASTER_HEADER), inv.sources);
            write_atomic(target, unit.as_bytes())
        })
        .with_param(unit)
    }));

    Ok(())
}
