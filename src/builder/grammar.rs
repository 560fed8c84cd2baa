//! re2c grammar generation ahead of the build.
//!
//! Generated `.re.ipp` files are included by sources whose dependencies are
//! only known once the build graph exists, so they cannot be ordinary
//! targets. When any requested target is a `.re.ipp` file, the pre-pass
//! generates the requested files and the run ends there.

use std::path::{Path, PathBuf};

use crate::builder::command::CommandSpec;
use crate::util::process::ProcessError;

/// Suffix of generated lexer sources.
pub const GENERATED_SUFFIX: &str = ".re.ipp";
/// Suffix of grammar sources.
pub const GRAMMAR_SUFFIX: &str = ".re";

/// Outcome of a pre-build phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing to do here; go on with the regular build.
    Continue,
    /// Stop the run with this exit status.
    Terminate(i32),
}

/// Something that turns a grammar into a generated source.
pub trait GrammarCompiler {
    fn compile(&self, source: &Path, target: &Path) -> Result<(), ProcessError>;
}

/// The `re2c` command line tool.
#[derive(Debug, Clone)]
pub struct Re2c {
    program: String,
    cwd: Option<PathBuf>,
}

impl Re2c {
    pub fn new(program: impl Into<String>) -> Self {
        Re2c {
            program: program.into(),
            cwd: None,
        }
    }

    /// Run from `dir`, so relative target names resolve against it.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn command(&self, source: &Path, target: &Path) -> CommandSpec {
        CommandSpec::new(&self.program)
            .args([
                "--no-generation-date",
                "--case-ranges",
                "--conditions",
                "-W",
                "-Werror",
                "-o",
            ])
            .arg(target.to_string_lossy())
            .arg(source.to_string_lossy())
    }
}

impl Default for Re2c {
    fn default() -> Self {
        Re2c::new("re2c")
    }
}

impl GrammarCompiler for Re2c {
    fn compile(&self, source: &Path, target: &Path) -> Result<(), ProcessError> {
        let mut process = self.command(source, target).to_process();
        if let Some(ref dir) = self.cwd {
            process = process.cwd(dir);
        }
        process.exec_and_check()?;
        Ok(())
    }
}

/// Grammar source for a generated file: `x.re.ipp` → `x.re`.
pub fn grammar_source(target: &str) -> PathBuf {
    let stem = target.strip_suffix(GENERATED_SUFFIX).unwrap_or(target);
    PathBuf::from(format!("{}{}", stem, GRAMMAR_SUFFIX))
}

pub struct GrammarPrePass<'a> {
    compiler: &'a dyn GrammarCompiler,
}

impl<'a> GrammarPrePass<'a> {
    pub fn new(compiler: &'a dyn GrammarCompiler) -> Self {
        GrammarPrePass { compiler }
    }

    /// Generate every requested `.re.ipp` target, in request order.
    ///
    /// Returns [`Phase::Continue`] when none was requested. Otherwise the
    /// run terminates: with status 1 at the first failure (later targets are
    /// not attempted), or with status 0 once all were generated.
    pub fn run(&self, requested: &[String]) -> Phase {
        let targets: Vec<&String> = requested
            .iter()
            .filter(|t| t.ends_with(GENERATED_SUFFIX))
            .collect();
        if targets.is_empty() {
            return Phase::Continue;
        }

        for target in targets {
            tracing::info!("Generating {}", target);
            let source = grammar_source(target);
            if let Err(e) = self.compiler.compile(&source, Path::new(target)) {
                tracing::error!("{}", e);
                return Phase::Terminate(1);
            }
        }

        Phase::Terminate(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Records calls; fails for sources listed in `failing`.
    #[derive(Default)]
    struct MockCompiler {
        calls: RefCell<Vec<(PathBuf, PathBuf)>>,
        failing: Vec<PathBuf>,
    }

    impl GrammarCompiler for MockCompiler {
        fn compile(&self, source: &Path, target: &Path) -> Result<(), ProcessError> {
            self.calls
                .borrow_mut()
                .push((source.to_path_buf(), target.to_path_buf()));
            if self.failing.iter().any(|f| f == source) {
                return Err(ProcessError::Failed {
                    command: format!("re2c {}", source.display()),
                    status: Some(1),
                    stderr: "syntax error".to_string(),
                });
            }
            Ok(())
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_no_grammar_targets_continues() {
        let mock = MockCompiler::default();
        let phase = GrammarPrePass::new(&mock).run(&strings(&["upload", "firmware.bin"]));
        assert_eq!(phase, Phase::Continue);
        assert!(mock.calls.borrow().is_empty());
    }

    #[test]
    fn test_all_succeed_terminates_zero() {
        let mock = MockCompiler::default();
        let phase = GrammarPrePass::new(&mock).run(&strings(&[
            "espurna/a.re.ipp",
            "build",
            "espurna/b.re.ipp",
        ]));
        assert_eq!(phase, Phase::Terminate(0));
        assert_eq!(
            *mock.calls.borrow(),
            [
                (PathBuf::from("espurna/a.re"), PathBuf::from("espurna/a.re.ipp")),
                (PathBuf::from("espurna/b.re"), PathBuf::from("espurna/b.re.ipp")),
            ]
        );
    }

    #[test]
    fn test_first_failure_stops() {
        let mock = MockCompiler {
            failing: vec![PathBuf::from("a.re")],
            ..Default::default()
        };
        let phase = GrammarPrePass::new(&mock).run(&strings(&["a.re.ipp", "b.re.ipp"]));
        assert_eq!(phase, Phase::Terminate(1));
        assert_eq!(mock.calls.borrow().len(), 1);
    }

    #[test]
    fn test_re2c_command_line() {
        let command = Re2c::default().command(Path::new("t.re"), Path::new("t.re.ipp"));
        assert_eq!(
            command.to_string(),
            "re2c --no-generation-date --case-ranges --conditions -W -Werror -o t.re.ipp t.re"
        );
    }

    #[test]
    fn test_grammar_source() {
        assert_eq!(grammar_source("x/y.re.ipp"), PathBuf::from("x/y.re"));
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_re2c_binary_terminates_one() {
        let re2c = Re2c::new("re2c-does-not-exist-here");
        let phase = GrammarPrePass::new(&re2c).run(&strings(&["x.re.ipp"]));
        assert_eq!(phase, Phase::Terminate(1));
    }
}
