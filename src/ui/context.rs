//! UI context for detecting interactive vs CI environments

use std::io::IsTerminal;

const CI_VARS: [&str; 9] = [
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "CIRCLECI",
    "TRAVIS",
    "JENKINS_URL",
    "BUILDKITE",
    "TEAMCITY_VERSION",
    "TF_BUILD",
];

/// UI context that determines output behavior
#[derive(Debug, Clone)]
pub struct UiContext {
    interactive: bool,
}

impl UiContext {
    /// Detect the current environment
    pub fn detect() -> Self {
        Self::from_parts(std::io::stderr().is_terminal(), |key| {
            std::env::var_os(key).is_some()
        })
    }

    /// Create a non-interactive context (for testing or explicit CI mode)
    pub fn non_interactive() -> Self {
        Self { interactive: false }
    }

    fn from_parts(stderr_tty: bool, is_set: impl Fn(&str) -> bool) -> Self {
        let in_ci = CI_VARS.iter().any(|var| is_set(var));
        Self {
            interactive: stderr_tty && !in_ci,
        }
    }

    /// Whether spinners may be drawn
    pub fn use_fancy_output(&self) -> bool {
        self.interactive
    }
}
