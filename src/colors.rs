/// Color support with NO_COLOR and CLICOLOR environment variable handling
///
/// Installer output usually lands in CI logs, so colors follow the NO_COLOR
/// standard (https://no-color.org/) and the CLICOLOR conventions:
/// - `NO_COLOR`: if set (to any value), disable colors
/// - `CLICOLOR`: if set to 0, disable colors
/// - `CLICOLOR_FORCE`: if set to non-zero, force colors even without a TTY
use colored::control;

/// Color decision for the given environment values and TTY state.
pub fn colors_enabled(
    no_color: Option<&str>,
    clicolor: Option<&str>,
    clicolor_force: Option<&str>,
    is_tty: bool,
) -> bool {
    if no_color.is_some() {
        return false;
    }
    if clicolor_force.is_some_and(|v| v != "0") {
        return true;
    }
    if clicolor == Some("0") {
        return false;
    }
    is_tty
}

/// Configure color output for the whole program. Call early in `main`.
pub fn init_colors() {
    let var = |name: &str| std::env::var(name).ok();
    let is_tty = std::io::IsTerminal::is_terminal(&std::io::stdout());
    control::set_override(colors_enabled(
        var("NO_COLOR").as_deref(),
        var("CLICOLOR").as_deref(),
        var("CLICOLOR_FORCE").as_deref(),
        is_tty,
    ));
}
