//! Terminal detection for choosing between styled and plain output

use std::io::IsTerminal;

/// Environment variables set by common CI providers
const CI_VARS: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "CIRCLECI",
    "BUILDKITE",
    "JENKINS_URL",
    "TF_BUILD",
];

/// How the CLI should present output
#[derive(Debug, Clone, Copy)]
pub struct UiContext {
    interactive: bool,
}

impl UiContext {
    /// Styled output only on a real terminal outside CI
    pub fn detect() -> Self {
        let on_terminal = std::io::stdout().is_terminal() && std::io::stderr().is_terminal();
        let in_ci = CI_VARS.iter().any(|var| std::env::var_os(var).is_some());
        Self {
            interactive: on_terminal && !in_ci,
        }
    }

    /// Plain line-oriented output, for tests and piped use
    pub fn plain() -> Self {
        Self { interactive: false }
    }

    /// Whether spinners and progress bars should be drawn
    pub fn is_interactive(&self) -> bool {
        self.interactive
    }
}
