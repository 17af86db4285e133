//! Handing control to the Python interpreter
//!
//! An archive either has an entry point (`main`) or behaves like a plain
//! interpreter whose arguments are forwarded. With an entry point the
//! arguments after the archive become the program's `sys.argv[1:]`.

use crate::bootstrap::search_path::PYTHONPATH;
use crate::config::BootstrapConfig;
use crate::error::{ZipappsError, ZipappsResult};
use std::ffi::{OsStr, OsString};
use std::path::Path;
use tracing::{debug, info};

/// Run-time flags consumed by the launcher before dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeFlags {
    /// `--zipapps=` / `--env-paths=`: other archives to activate
    pub zipapps: Option<String>,
    /// `--activate-zipapps`: activate only, do not dispatch
    pub activate_only: bool,
}

impl RuntimeFlags {
    /// Strip the launcher's flags from `args`, returning them and the rest
    pub fn extract(args: Vec<OsString>) -> (Self, Vec<OsString>) {
        let mut flags = Self::default();
        let mut rest = Vec::with_capacity(args.len());

        for arg in args {
            match arg.to_str() {
                Some("--activate-zipapps") => flags.activate_only = true,
                Some(s) if s.starts_with("--zipapps=") => {
                    flags.zipapps = Some(s["--zipapps=".len()..].to_string());
                }
                Some(s) if s.starts_with("--env-paths=") => {
                    flags.zipapps = Some(s["--env-paths=".len()..].to_string());
                }
                _ => rest.push(arg),
            }
        }
        (flags, rest)
    }
}

/// A configured entry point
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPoint {
    /// `module` (imported) or `module:function` (imported and called)
    Module {
        module: String,
        function: Option<String>,
    },
    /// Raw Python statement
    Statement(String),
}

impl EntryPoint {
    /// Parse a `main` value; empty means no entry point
    pub fn parse(main: &str) -> Option<Self> {
        let main = main.trim();
        if main.is_empty() {
            return None;
        }
        if let Some((module, function)) = main.split_once(':') {
            if is_dotted_name(module) && is_dotted_name(function) {
                return Some(Self::Module {
                    module: module.to_string(),
                    function: Some(function.to_string()),
                });
            }
        } else if is_dotted_name(main) {
            return Some(Self::Module {
                module: main.to_string(),
                function: None,
            });
        }
        Some(Self::Statement(main.to_string()))
    }

    /// Interpreter arguments that run this entry point
    pub fn python_args(&self) -> Vec<OsString> {
        match self {
            Self::Module {
                module,
                function: Some(function),
            } => vec![
                "-c".into(),
                format!("import {m}; {m}.{f}()", m = module, f = function).into(),
            ],
            Self::Module {
                module,
                function: None,
            } => vec!["-c".into(), format!("import {}", module).into()],
            Self::Statement(code) => vec!["-c".into(), code.into()],
        }
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*` segments joined by dots
pub fn is_dotted_name(value: &str) -> bool {
    !value.is_empty() && value.split('.').all(is_identifier)
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// What a bare interpreter invocation asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// `-c <code> [args]`
    InlineSource { code: OsString, args: Vec<OsString> },
    /// `- [args]`: program read from stdin
    StdinSource { args: Vec<OsString> },
    /// `-m <module> [args]`
    RunModule { module: OsString, args: Vec<OsString> },
    /// `<file.py> [args]`
    RunFile { path: OsString, args: Vec<OsString> },
    /// No arguments: interactive prompt
    Interactive,
    /// Anything else is handed over unchanged
    Passthrough(Vec<OsString>),
}

impl Invocation {
    pub fn classify(args: Vec<OsString>) -> Self {
        let mut iter = args.into_iter();
        let Some(first) = iter.next() else {
            return Self::Interactive;
        };
        let rest: Vec<OsString> = iter.collect();

        match first.to_str() {
            Some("-c") if !rest.is_empty() => {
                let mut rest = rest.into_iter();
                let code = rest.next().unwrap_or_default();
                Self::InlineSource {
                    code,
                    args: rest.collect(),
                }
            }
            Some("-m") if !rest.is_empty() => {
                let mut rest = rest.into_iter();
                let module = rest.next().unwrap_or_default();
                Self::RunModule {
                    module,
                    args: rest.collect(),
                }
            }
            Some("-") => Self::StdinSource { args: rest },
            Some(s) if s.starts_with('-') => {
                let mut all = vec![first];
                all.extend(rest);
                Self::Passthrough(all)
            }
            _ if is_source_file(&first) => Self::RunFile {
                path: first,
                args: rest,
            },
            _ => {
                let mut all = vec![first];
                all.extend(rest);
                Self::Passthrough(all)
            }
        }
    }

    /// Interpreter arguments reproducing this invocation
    pub fn python_args(&self) -> Vec<OsString> {
        let mut out = Vec::new();
        match self {
            Self::InlineSource { code, args } => {
                out.push("-c".into());
                out.push(code.clone());
                out.extend(args.iter().cloned());
            }
            Self::StdinSource { args } => {
                out.push("-".into());
                out.extend(args.iter().cloned());
            }
            Self::RunModule { module, args } => {
                out.push("-m".into());
                out.push(module.clone());
                out.extend(args.iter().cloned());
            }
            Self::RunFile { path, args } => {
                out.push(path.clone());
                out.extend(args.iter().cloned());
            }
            Self::Interactive => {}
            Self::Passthrough(args) => out.extend(args.iter().cloned()),
        }
        out
    }
}

fn is_source_file(arg: &OsStr) -> bool {
    let path = Path::new(arg);
    path.extension().is_some_and(|ext| ext == "py" || ext == "pyz") || path.is_file()
}

/// How the interpreter is started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Replace the launcher process
    Exec,
    /// Run one child and propagate its exit status
    Spawn,
}

/// What gets run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Main {
        entry: EntryPoint,
        args: Vec<OsString>,
    },
    Interpreter(Invocation),
}

/// A fully resolved interpreter launch
#[derive(Debug, Clone)]
pub struct DispatchPlan {
    pub python: String,
    pub strict: bool,
    pub shell: bool,
    pub mode: DispatchMode,
    pub target: Target,
}

impl DispatchPlan {
    /// Plan the launch for an archive's record and the remaining argv.
    /// `needs_cleanup` forces a child process so the cleanup can run after it.
    pub fn new(config: &BootstrapConfig, args: Vec<OsString>, needs_cleanup: bool) -> Self {
        let target = match EntryPoint::parse(&config.main) {
            Some(entry) => Target::Main { entry, args },
            None => Target::Interpreter(Invocation::classify(args)),
        };
        let mode = if config.main_shell || needs_cleanup || !cfg!(unix) {
            DispatchMode::Spawn
        } else {
            DispatchMode::Exec
        };

        Self {
            python: config.python.clone(),
            strict: config.ignore_system_python_path,
            shell: config.shell,
            mode,
            target,
        }
    }

    /// Full interpreter argv (without the interpreter itself)
    pub fn python_args(&self) -> Vec<OsString> {
        let mut out: Vec<OsString> = Vec::new();
        if self.strict {
            // No user site-packages either
            out.push("-s".into());
        }
        match &self.target {
            Target::Main { entry, args } => {
                out.extend(entry.python_args());
                out.extend(args.iter().cloned());
            }
            Target::Interpreter(invocation) => out.extend(invocation.python_args()),
        }
        out
    }

    fn through_shell(&self) -> bool {
        self.shell && matches!(self.target, Target::Interpreter(_))
    }

    /// The command to run, with `PYTHONPATH` set explicitly
    pub fn command(&self, pythonpath: &OsStr) -> std::process::Command {
        let mut cmd = if self.through_shell() {
            let line = std::iter::once(OsString::from(&self.python))
                .chain(self.python_args())
                .map(|a| shell_quote(&a.to_string_lossy()))
                .collect::<Vec<_>>()
                .join(" ");
            let mut cmd = shell_command();
            cmd.arg(line);
            cmd
        } else {
            let mut cmd = std::process::Command::new(&self.python);
            cmd.args(self.python_args());
            cmd
        };
        cmd.env(PYTHONPATH, pythonpath);
        cmd
    }

    /// Start the interpreter. In `Exec` mode this only returns on failure.
    pub async fn run(&self, pythonpath: &OsStr) -> ZipappsResult<i32> {
        let cmd = self.command(pythonpath);
        let label = format!("{} {:?}", self.python, self.python_args());
        debug!("Dispatching ({:?}): {}", self.mode, label);

        match self.mode {
            DispatchMode::Exec => exec(cmd, &label),
            DispatchMode::Spawn => {
                info!("Running {}", label);
                let status = tokio::process::Command::from(cmd)
                    .status()
                    .await
                    .map_err(|e| ZipappsError::command_failed(&label, e))?;
                Ok(exit_code(status))
            }
        }
    }
}

/// Quote one word for the shell line; plain words are left as they are
#[cfg(unix)]
fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

#[cfg(not(unix))]
fn shell_quote(word: &str) -> String {
    if !word.is_empty() && !word.contains([' ', '\t', '"', '&', '|', '<', '>', '^']) {
        word.to_string()
    } else {
        format!("\"{}\"", word.replace('"', "\"\""))
    }
}

#[cfg(unix)]
fn shell_command() -> std::process::Command {
    let mut cmd = std::process::Command::new("sh");
    cmd.arg("-c");
    cmd
}

#[cfg(not(unix))]
fn shell_command() -> std::process::Command {
    let mut cmd = std::process::Command::new("cmd");
    cmd.arg("/C");
    cmd
}

#[cfg(unix)]
fn exec(mut cmd: std::process::Command, label: &str) -> ZipappsResult<i32> {
    use std::os::unix::process::CommandExt;
    let err = cmd.exec();
    Err(ZipappsError::command_failed(label, err))
}

#[cfg(not(unix))]
fn exec(mut cmd: std::process::Command, label: &str) -> ZipappsResult<i32> {
    let status = cmd
        .status()
        .map_err(|e| ZipappsError::command_failed(label, e))?;
    Ok(exit_code(status))
}

/// Exit code of a finished child; signals map to `128 + signo` on unix
pub fn exit_code(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn strips_runtime_flags() {
        let (flags, rest) = RuntimeFlags::extract(os(&[
            "--zipapps=a.pyz,b.pyz",
            "script.py",
            "--activate-zipapps",
            "--verbose",
        ]));
        assert_eq!(flags.zipapps.as_deref(), Some("a.pyz,b.pyz"));
        assert!(flags.activate_only);
        assert_eq!(rest, os(&["script.py", "--verbose"]));

        let (flags, _) = RuntimeFlags::extract(os(&["--env-paths=c.pyz"]));
        assert_eq!(flags.zipapps.as_deref(), Some("c.pyz"));
    }

    #[test]
    fn parses_entry_points() {
        assert_eq!(EntryPoint::parse("  "), None);
        assert_eq!(
            EntryPoint::parse("bottle_server:main"),
            Some(EntryPoint::Module {
                module: "bottle_server".to_string(),
                function: Some("main".to_string())
            })
        );
        assert_eq!(
            EntryPoint::parse("pkg.cli"),
            Some(EntryPoint::Module {
                module: "pkg.cli".to_string(),
                function: None
            })
        );
        assert_eq!(
            EntryPoint::parse("import sys; print(sys.argv)"),
            Some(EntryPoint::Statement("import sys; print(sys.argv)".to_string()))
        );
    }

    #[test]
    fn entry_point_arguments() {
        let call = EntryPoint::parse("pkg.server:main").unwrap();
        assert_eq!(call.python_args(), os(&["-c", "import pkg.server; pkg.server.main()"]));
        let module = EntryPoint::parse("http.server").unwrap();
        assert_eq!(module.python_args(), os(&["-c", "import http.server"]));
    }

    #[test]
    fn classifies_invocations() {
        assert_eq!(Invocation::classify(vec![]), Invocation::Interactive);
        assert_eq!(
            Invocation::classify(os(&["-c", "print(1)", "x"])),
            Invocation::InlineSource {
                code: "print(1)".into(),
                args: os(&["x"])
            }
        );
        assert_eq!(
            Invocation::classify(os(&["-", "a"])),
            Invocation::StdinSource { args: os(&["a"]) }
        );
        assert_eq!(
            Invocation::classify(os(&["-m", "pip", "list"])),
            Invocation::RunModule {
                module: "pip".into(),
                args: os(&["list"])
            }
        );
        assert_eq!(
            Invocation::classify(os(&["server.py", "--port", "8080"])),
            Invocation::RunFile {
                path: "server.py".into(),
                args: os(&["--port", "8080"])
            }
        );
        assert_eq!(
            Invocation::classify(os(&["-V"])),
            Invocation::Passthrough(os(&["-V"]))
        );
    }

    #[test]
    fn invocation_round_trips_argv() {
        let argv = os(&["-m", "pip", "install", "six"]);
        assert_eq!(Invocation::classify(argv.clone()).python_args(), argv);
    }

    #[test]
    fn plan_prefers_exec_unless_isolated() {
        let config = BootstrapConfig {
            main: "app:main".to_string(),
            ..Default::default()
        };
        let plan = DispatchPlan::new(&config, os(&["--flag"]), false);
        if cfg!(unix) {
            assert_eq!(plan.mode, DispatchMode::Exec);
        }
        assert_eq!(plan.python_args(), os(&["-c", "import app; app.main()", "--flag"]));

        let plan = DispatchPlan::new(&config, vec![], true);
        assert_eq!(plan.mode, DispatchMode::Spawn);

        let config = BootstrapConfig {
            main_shell: true,
            ..config
        };
        assert_eq!(DispatchPlan::new(&config, vec![], false).mode, DispatchMode::Spawn);
    }

    #[test]
    fn strict_mode_disables_user_site() {
        let config = BootstrapConfig {
            ignore_system_python_path: true,
            ..Default::default()
        };
        let plan = DispatchPlan::new(&config, os(&["-c", "pass"]), false);
        assert_eq!(plan.python_args(), os(&["-s", "-c", "pass"]));
    }

    #[cfg(unix)]
    #[test]
    fn shell_mode_wraps_passthrough() {
        let config = BootstrapConfig {
            shell: true,
            python: "python3".to_string(),
            ..Default::default()
        };
        let plan = DispatchPlan::new(&config, os(&["-c", "print('a b')"]), false);
        let cmd = plan.command(OsStr::new("/x"));
        assert_eq!(cmd.get_program(), "sh");
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(
            args,
            vec![OsStr::new("-c"), OsStr::new(r"python3 -c 'print('\''a b'\'')'")]
        );
    }

    #[cfg(unix)]
    #[test]
    fn shell_quoting_keeps_words_intact() {
        assert_eq!(shell_quote("-m"), "-m");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("$HOME"), "'$HOME'");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shell_mode_passes_spaced_arguments_whole() {
        let config = BootstrapConfig {
            main_shell: true,
            shell: true,
            python: "test".to_string(),
            ..Default::default()
        };
        let plan = DispatchPlan::new(&config, os(&["a b", "=", "a b"]), false);
        assert_eq!(plan.run(OsStr::new("")).await.unwrap(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawned_child_exit_code_propagates() {
        let config = BootstrapConfig {
            main_shell: true,
            shell: true,
            python: "exit".to_string(),
            ..Default::default()
        };
        let plan = DispatchPlan::new(&config, os(&["3"]), false);
        assert_eq!(plan.run(OsStr::new("")).await.unwrap(), 3);
    }
}
