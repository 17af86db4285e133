//! CLI argument definitions using clap derive

use crate::config::BuildConfig;
use clap::{ArgAction, Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// zipapps - Package Python code and dependencies into a single runnable archive
///
/// Archives are activated by the `run` launcher: selected members are
/// extracted to a cache, lazy dependencies are installed once, and the
/// search path is assembled before the entry point is dispatched.
#[derive(Parser, Debug)]
#[command(name = "zipapps")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build an archive from includes and pip requirements
    ///
    /// Options must come before the first pip argument: everything from
    /// there on, options included, is passed to `pip install`.
    Build(BuildArgs),

    /// Activate an archive and dispatch into it (used by the shebang)
    ///
    /// Every argument after the archive is handed to the entry point or the
    /// interpreter unchanged, including `-h`.
    #[command(disable_help_flag = true, disable_version_flag = true)]
    Run(RunArgs),

    /// Activate archives and print the resulting PYTHONPATH
    Activate(ActivateArgs),

    /// Resolve pip arguments into pinned requirements
    Freeze(FreezeArgs),
}

/// Arguments for the build command
#[derive(Parser, Debug, Default)]
pub struct BuildArgs {
    /// Archive output path; its stem must be a Python identifier
    #[arg(short, long)]
    pub output: Option<String>,

    /// Shebang interpreter written at the head of the archive
    #[arg(short = 'p', long = "interpreter")]
    pub interpreter: Option<String>,

    /// Python executable for pip at build time and dispatch at run time
    #[arg(long)]
    pub python: Option<String>,

    /// Entry point: `module`, `module:function` or a Python statement
    #[arg(short, long)]
    pub main: Option<String>,

    /// Deflate archive members
    #[arg(short, long)]
    pub compress: bool,

    /// Files and directories to include (comma separated)
    #[arg(short = 'a', long, visible_alias = "add", alias = "include")]
    pub includes: Option<String>,

    /// Members to extract at run time: `*`, `AUTO` or comma separated names
    #[arg(short, long)]
    pub unzip: Option<String>,

    /// Members never extracted, even when selected by --unzip
    #[arg(long, alias = "ue")]
    pub unzip_exclude: Option<String>,

    /// Cache directory template (`$SELF`, `$TEMP`, `$HOME`, `$PID`, `$CWD`)
    #[arg(long, alias = "up")]
    pub unzip_path: Option<String>,

    /// Byte-compile staged sources
    #[arg(long, visible_alias = "pyc", alias = "cc")]
    pub compiled: bool,

    /// Staging directory kept between builds
    #[arg(long, visible_alias = "source-dir", alias = "cp")]
    pub cache_path: Option<String>,

    /// Run passthrough commands through the system shell
    #[arg(short, long)]
    pub shell: bool,

    /// Call the entry point in a child interpreter
    #[arg(long, alias = "ss")]
    pub main_shell: bool,

    /// Ignore the inherited PYTHONPATH at run time
    #[arg(long, alias = "spp")]
    pub strict_python_path: bool,

    /// Skip the build when these paths (globs, comma separated) are unchanged
    #[arg(short, long)]
    pub build_id: Option<String>,

    /// Archives activated before dispatch (comma separated)
    #[arg(long, visible_alias = "zipapps")]
    pub env_paths: Option<String>,

    /// Install pip requirements on first run instead of now
    #[arg(short = 'd', long, visible_alias = "lazy-pip")]
    pub lazy_install: bool,

    /// Version components keying lazy-install targets
    #[arg(long, alias = "pva")]
    pub python_version_slice: Option<usize>,

    /// Extra search paths inserted at run time (comma separated)
    #[arg(long, visible_aliases = ["sys-path", "py-path", "python-path"])]
    pub sys_paths: Option<String>,

    /// Bootstrap pip with ensurepip before installing
    #[arg(long)]
    pub ensure_pip: bool,

    /// Build a layer without bootstrap files or shebang
    #[arg(long)]
    pub layer_mode: bool,

    /// Directory the tree is placed under in layer mode
    #[arg(long)]
    pub layer_mode_prefix: Option<String>,

    /// Remove the cache directory after the program exits
    #[arg(long, alias = "czc")]
    pub clear_zipapps_cache: bool,

    /// Remove the archive itself after the program exits
    #[arg(long, alias = "czs")]
    pub clear_zipapps_self: bool,

    /// Octal permission bits applied to extracted files
    #[arg(long)]
    pub chmod: Option<String>,

    /// Glob patterns removed from staging before sealing (comma separated)
    #[arg(long)]
    pub rm_patterns: Option<String>,

    /// Write the effective configuration as JSON (`-` for stdout) and exit
    #[arg(long, value_name = "PATH")]
    pub dump_config: Option<PathBuf>,

    /// Start from a JSON configuration; flags given here override it
    #[arg(long, value_name = "PATH")]
    pub load_config: Option<PathBuf>,

    /// Write pinned requirements of the pip arguments to this path (`-` for stdout)
    #[arg(long, value_name = "PATH")]
    pub freeze_reqs: Option<String>,

    /// Pass -q to pip (repeatable)
    #[arg(short, long, visible_alias = "quite", action = ArgAction::Count)]
    pub quiet: u8,

    /// Arguments forwarded to `pip install` (zipapps options go before them)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub pip_args: Vec<String>,
}

impl BuildArgs {
    /// Overlay the flags that were given on top of `config`
    pub fn apply(&self, config: &mut BuildConfig) {
        fn set(slot: &mut String, value: &Option<String>) {
            if let Some(v) = value {
                *slot = v.clone();
            }
        }

        set(&mut config.output, &self.output);
        set(&mut config.main, &self.main);
        set(&mut config.includes, &self.includes);
        set(&mut config.unzip, &self.unzip);
        set(&mut config.unzip_exclude, &self.unzip_exclude);
        set(&mut config.unzip_path, &self.unzip_path);
        set(&mut config.build_id, &self.build_id);
        set(&mut config.env_paths, &self.env_paths);
        set(&mut config.sys_paths, &self.sys_paths);
        set(&mut config.layer_mode_prefix, &self.layer_mode_prefix);
        set(&mut config.chmod, &self.chmod);
        set(&mut config.rm_patterns, &self.rm_patterns);
        set(&mut config.python, &self.python);

        if self.interpreter.is_some() {
            config.interpreter = self.interpreter.clone();
        }
        if self.cache_path.is_some() {
            config.cache_path = self.cache_path.clone();
        }
        if let Some(slice) = self.python_version_slice {
            config.python_version_slice = slice;
        }

        config.compressed |= self.compress;
        config.compiled |= self.compiled;
        config.shell |= self.shell;
        config.main_shell |= self.main_shell;
        config.ignore_system_python_path |= self.strict_python_path;
        config.lazy_install |= self.lazy_install;
        config.ensure_pip |= self.ensure_pip;
        config.layer_mode |= self.layer_mode;
        config.clear_zipapps_cache |= self.clear_zipapps_cache;
        config.clear_zipapps_self |= self.clear_zipapps_self;

        if !self.pip_args.is_empty() {
            config.pip_args = self.pip_args.clone();
        }
        if self.quiet > 0 && !config.pip_args.is_empty() && !has_quiet_flag(&config.pip_args) {
            config
                .pip_args
                .push(format!("-{}", "q".repeat(self.quiet as usize)));
        }
    }

    /// Configuration from `--load-config` (or defaults) with flags applied
    pub fn to_config(&self, base: Option<BuildConfig>) -> BuildConfig {
        let mut config = base.unwrap_or_default();
        self.apply(&mut config);
        config
    }
}

fn has_quiet_flag(args: &[String]) -> bool {
    args.iter().any(|a| {
        a == "--quiet" || (a.starts_with("-q") && a[1..].chars().all(|c| c == 'q'))
    })
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Archive to activate
    pub archive: PathBuf,

    /// Arguments for the entry point or interpreter
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<OsString>,
}

/// Arguments for the activate command
#[derive(Parser, Debug)]
pub struct ActivateArgs {
    /// Archives to activate, in search-path order
    #[arg(required = true, value_delimiter = ',')]
    pub archives: Vec<String>,
}

/// Arguments for the freeze command
#[derive(Parser, Debug)]
pub struct FreezeArgs {
    /// Where to write the requirements (`-` for stdout)
    #[arg(short, long, default_value = "-")]
    pub output: String,

    /// Python executable used to create the virtual environment
    #[arg(long)]
    pub python: Option<String>,

    /// Arguments forwarded to `pip install`
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub pip_args: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_args(argv: &[&str]) -> BuildArgs {
        let mut full = vec!["zipapps", "build"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Commands::Build(args) => args,
            _ => panic!("expected Build command"),
        }
    }

    #[test]
    fn cli_parses_build_with_pip_args() {
        let args = build_args(&["-m", "app:main", "-a", "app.py,pkg", "-c", "six", "--no-deps"]);
        assert_eq!(args.main.as_deref(), Some("app:main"));
        assert_eq!(args.includes.as_deref(), Some("app.py,pkg"));
        assert!(args.compress);
        assert_eq!(args.pip_args, vec!["six", "--no-deps"]);
    }

    #[test]
    fn cli_parses_hyphenated_pip_args() {
        let args = build_args(&["-o", "app.pyz", "-r", "requirements.txt"]);
        assert_eq!(args.pip_args, vec!["-r", "requirements.txt"]);
    }

    #[test]
    fn options_after_pip_args_go_to_pip() {
        let args = build_args(&["six", "-o", "x.pyz"]);
        assert_eq!(args.pip_args, vec!["six", "-o", "x.pyz"]);
        assert!(args.output.is_none());
    }

    #[test]
    fn cli_accepts_long_aliases() {
        let args = build_args(&["--add", "x.py", "--zipapps", "a.pyz", "--lazy-pip", "--pyc"]);
        assert_eq!(args.includes.as_deref(), Some("x.py"));
        assert_eq!(args.env_paths.as_deref(), Some("a.pyz"));
        assert!(args.lazy_install);
        assert!(args.compiled);
    }

    #[test]
    fn flags_override_loaded_config() {
        let base = BuildConfig {
            main: "old".to_string(),
            unzip: "six".to_string(),
            pip_args: vec!["six".to_string()],
            ..Default::default()
        };
        let config = build_args(&["-m", "new", "-s"]).to_config(Some(base));
        assert_eq!(config.main, "new");
        assert_eq!(config.unzip, "six");
        assert!(config.shell);
        assert_eq!(config.pip_args, vec!["six"]);
    }

    #[test]
    fn defaults_without_flags() {
        let config = build_args(&[]).to_config(None);
        assert_eq!(config, BuildConfig::default());
    }

    #[test]
    fn quiet_is_forwarded_to_pip() {
        let config = build_args(&["-qq", "six"]).to_config(None);
        assert_eq!(config.pip_args, vec!["six", "-qq"]);

        let config = build_args(&["-q", "six", "--quiet"]).to_config(None);
        assert_eq!(config.pip_args, vec!["six", "--quiet"]);

        let config = build_args(&["-q"]).to_config(None);
        assert!(config.pip_args.is_empty());
    }

    #[test]
    fn cli_parses_run_passthrough() {
        let cli = Cli::parse_from(["zipapps", "run", "app.pyz", "-h", "-c", "print(1)"]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.archive, PathBuf::from("app.pyz"));
                assert_eq!(args.args, vec!["-h", "-c", "print(1)"]);
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn cli_parses_activate_list() {
        let cli = Cli::parse_from(["zipapps", "activate", "a.pyz,b.pyz", "c.pyz"]);
        match cli.command {
            Commands::Activate(args) => assert_eq!(args.archives, vec!["a.pyz", "b.pyz", "c.pyz"]),
            _ => panic!("expected Activate command"),
        }
    }

    #[test]
    fn cli_parses_freeze() {
        let cli = Cli::parse_from(["zipapps", "freeze", "-o", "req.txt", "six", "--pre"]);
        match cli.command {
            Commands::Freeze(args) => {
                assert_eq!(args.output, "req.txt");
                assert_eq!(args.pip_args, vec!["six", "--pre"]);
            }
            _ => panic!("expected Freeze command"),
        }
    }

    #[test]
    fn cli_verbosity() {
        let cli = Cli::parse_from(["zipapps", "-vv", "activate", "a.pyz"]);
        assert_eq!(cli.verbose, 2);
    }
}
