//! Structured external commands.
//!
//! Commands are kept as an ordered argument list instead of a shell string,
//! so rewriting one flag or one argument can never touch a neighbouring
//! token by accident.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::util::process::ProcessBuilder;

/// Nesting limit for template values; guards against self-referencing
/// variables.
const MAX_SUBST_DEPTH: usize = 16;

static VAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("variable pattern is valid")
});

/// Errors raised when editing a command descriptor.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("command is empty")]
    Empty,

    #[error("flag `{flag}` not found in `{command}`")]
    FlagNotFound { flag: String, command: String },

    #[error("flag `{flag}` appears {count} times in `{command}`")]
    AmbiguousFlag {
        flag: String,
        count: usize,
        command: String,
    },

    #[error("argument index {index} out of range for `{command}`")]
    ArgOutOfRange { index: usize, command: String },

    #[error("unknown variable `{name}` in `{template}`")]
    UnknownVariable { name: String, template: String },
}

/// A program plus its arguments, possibly containing `$VAR` / `${VAR}`
/// references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        CommandSpec {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Build from a full argv, the first element being the program.
    pub fn from_argv<I, S>(argv: I) -> Result<Self, CommandError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut iter = argv.into_iter().map(Into::into);
        let program = iter.next().ok_or(CommandError::Empty)?;
        Ok(CommandSpec {
            program,
            args: iter.collect(),
        })
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Replace the single argument equal to `flag` with `replacement`
    /// (which may be several arguments).
    ///
    /// Fails when the flag is missing or present more than once.
    pub fn replace_flag(&self, flag: &str, replacement: &[&str]) -> Result<Self, CommandError> {
        let positions: Vec<usize> = self
            .args
            .iter()
            .enumerate()
            .filter(|(_, arg)| arg.as_str() == flag)
            .map(|(i, _)| i)
            .collect();

        let index = match positions.as_slice() {
            [] => {
                return Err(CommandError::FlagNotFound {
                    flag: flag.to_string(),
                    command: self.to_string(),
                })
            }
            [index] => *index,
            many => {
                return Err(CommandError::AmbiguousFlag {
                    flag: flag.to_string(),
                    count: many.len(),
                    command: self.to_string(),
                })
            }
        };

        let mut args = Vec::with_capacity(self.args.len() + replacement.len());
        args.extend_from_slice(&self.args[..index]);
        args.extend(replacement.iter().map(|s| s.to_string()));
        args.extend_from_slice(&self.args[index + 1..]);

        Ok(CommandSpec {
            program: self.program.clone(),
            args,
        })
    }

    /// Overwrite the argument at `index`, returning the previous value.
    pub fn set_arg(&mut self, index: usize, value: impl Into<String>) -> Result<String, CommandError> {
        let command = self.to_string();
        let slot = self
            .args
            .get_mut(index)
            .ok_or(CommandError::ArgOutOfRange { index, command })?;
        Ok(std::mem::replace(slot, value.into()))
    }

    /// Substitute variables in the program and every argument.
    pub fn expand(&self, lookup: &Lookup<'_>) -> Self {
        CommandSpec {
            program: subst(&self.program, lookup),
            args: self.args.iter().map(|a| subst(a, lookup)).collect(),
        }
    }

    pub fn to_process(&self) -> ProcessBuilder {
        ProcessBuilder::new(&self.program).args(&self.args)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Value of a substitution variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarValue {
    /// User-authored text; references inside it are expanded in turn.
    Template(String),
    /// Inserted as is. Paths are literal, so a `$` in a directory name is
    /// never read as a reference.
    Literal(String),
}

impl VarValue {
    pub fn as_str(&self) -> &str {
        match self {
            VarValue::Template(s) | VarValue::Literal(s) => s,
        }
    }
}

/// Variable lookup used by [`subst`].
pub type Lookup<'a> = dyn Fn(&str) -> Option<VarValue> + 'a;

/// Expand `$NAME` and `${NAME}` references.
///
/// Template values are expanded again, so variables may refer to other
/// variables; literal values are inserted verbatim. Unknown names expand to
/// an empty string.
pub fn subst(template: &str, lookup: &Lookup<'_>) -> String {
    let mut unknown = Vec::new();
    expand_into(template, lookup, 0, &mut unknown)
}

/// Like [`subst`], but an unknown name is an error.
pub fn subst_checked(template: &str, lookup: &Lookup<'_>) -> Result<String, CommandError> {
    let mut unknown = Vec::new();
    let expanded = expand_into(template, lookup, 0, &mut unknown);
    match unknown.into_iter().next() {
        None => Ok(expanded),
        Some(name) => Err(CommandError::UnknownVariable {
            name,
            template: template.to_string(),
        }),
    }
}

fn expand_into(
    template: &str,
    lookup: &Lookup<'_>,
    depth: usize,
    unknown: &mut Vec<String>,
) -> String {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in VAR_RE.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1).or_else(|| caps.get(2))) else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);
        last = whole.end();

        match lookup(name.as_str()) {
            Some(VarValue::Literal(value)) => out.push_str(&value),
            Some(VarValue::Template(value)) if depth < MAX_SUBST_DEPTH => {
                out.push_str(&expand_into(&value, lookup, depth + 1, unknown));
            }
            Some(VarValue::Template(value)) => out.push_str(&value),
            None => unknown.push(name.as_str().to_string()),
        }
    }
    out.push_str(&template[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_command() -> CommandSpec {
        CommandSpec::new("$CXX")
            .args(["-o", "$TARGET", "-c", "-std=gnu++17", "-Os", "$SOURCE"])
    }

    fn vars(name: &str) -> Option<VarValue> {
        let template = |s: &str| Some(VarValue::Template(s.to_string()));
        let literal = |s: &str| Some(VarValue::Literal(s.to_string()));
        match name {
            "CXX" => template("xtensa-lx106-elf-g++"),
            "BUILD_DIR" => template("${PROJECT_DIR}/.pio/build/${PIOENV}"),
            "PROJECT_DIR" => literal("/src/espurna/code"),
            "PIOENV" => literal("nodemcu"),
            "SOURCE" => literal("$SOURCE"),
            "LOOP" => template("x$LOOP"),
            _ => None,
        }
    }

    #[test]
    fn test_replace_flag_single_match() {
        let cmd = compile_command().replace_flag("-c", &["-dM", "-E"]).unwrap();
        assert_eq!(
            cmd.args,
            ["-o", "$TARGET", "-dM", "-E", "-std=gnu++17", "-Os", "$SOURCE"]
        );
        // The original descriptor is left alone.
        assert!(compile_command().args.contains(&"-c".to_string()));
    }

    #[test]
    fn test_replace_flag_ignores_substrings() {
        // "-c" as a substring of another flag is not a match.
        let cmd = CommandSpec::new("g++").args(["-fno-common", "-c", "x.cpp"]);
        let replaced = cmd.replace_flag("-c", &["-M"]).unwrap();
        assert_eq!(replaced.args, ["-fno-common", "-M", "x.cpp"]);
    }

    #[test]
    fn test_replace_flag_missing_or_ambiguous() {
        let cmd = CommandSpec::new("g++").args(["-o", "x.o", "x.cpp"]);
        assert!(matches!(
            cmd.replace_flag("-c", &["-M"]),
            Err(CommandError::FlagNotFound { .. })
        ));

        let cmd = CommandSpec::new("g++").args(["-c", "-c"]);
        assert!(matches!(
            cmd.replace_flag("-c", &["-M"]),
            Err(CommandError::AmbiguousFlag { count: 2, .. })
        ));
    }

    #[test]
    fn test_set_arg() {
        let mut cmd = CommandSpec::from_argv(["python3", "elf2bin.py", "--out", "x.bin"]).unwrap();
        let old = cmd.set_arg(0, "local_elf2bin.py").unwrap();
        assert_eq!(old, "elf2bin.py");
        assert_eq!(cmd.to_string(), "python3 local_elf2bin.py --out x.bin");

        assert!(matches!(
            cmd.set_arg(10, "x"),
            Err(CommandError::ArgOutOfRange { index: 10, .. })
        ));
    }

    #[test]
    fn test_from_argv_empty() {
        assert_eq!(
            CommandSpec::from_argv(Vec::<String>::new()),
            Err(CommandError::Empty)
        );
    }

    #[test]
    fn test_subst_nested_and_unknown() {
        assert_eq!(
            subst("${BUILD_DIR}/firmware.bin", &vars),
            "/src/espurna/code/.pio/build/nodemcu/firmware.bin"
        );
        assert_eq!(subst("a$UNKNOWN-b", &vars), "a-b");
        assert_eq!(subst("cost: $5", &vars), "cost: $5");
    }

    #[test]
    fn test_subst_keeps_self_references() {
        assert_eq!(subst("$CXX $SOURCE", &vars), "xtensa-lx106-elf-g++ $SOURCE");
    }

    #[test]
    fn test_subst_literal_values_are_not_rescanned() {
        let lookup = |name: &str| match name {
            "PROJECT_DIR" => Some(VarValue::Literal("/tmp/a$HOME_x".to_string())),
            "HOME_x" => Some(VarValue::Literal("/elsewhere".to_string())),
            "TARGET" => Some(VarValue::Literal("/out/$1.bin".to_string())),
            _ => None,
        };
        assert_eq!(subst("${PROJECT_DIR}/espurna", &lookup), "/tmp/a$HOME_x/espurna");
        assert_eq!(subst("-o $TARGET", &lookup), "-o /out/$1.bin");
    }

    #[test]
    fn test_subst_self_reference_terminates() {
        let expanded = subst("$LOOP", &vars);
        assert!(expanded.starts_with("xxxx"));
        assert!(expanded.ends_with("$LOOP"));
    }

    #[test]
    fn test_subst_checked_reports_unknown() {
        assert_eq!(
            subst_checked("${PROJECT_DIR}/build", &vars).unwrap(),
            "/src/espurna/code/build"
        );
        assert_eq!(
            subst_checked("$UNSET/out", &vars),
            Err(CommandError::UnknownVariable {
                name: "UNSET".to_string(),
                template: "$UNSET/out".to_string(),
            })
        );
    }

    #[test]
    fn test_expand() {
        let cmd = compile_command().expand(&vars);
        assert_eq!(cmd.program, "xtensa-lx106-elf-g++");
        assert_eq!(cmd.args.last().unwrap(), "$SOURCE");
        assert_eq!(cmd.args[1], "");
    }
}
