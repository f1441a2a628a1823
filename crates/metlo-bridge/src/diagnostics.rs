//! Operator-facing `Metlo:` lines on stdout.

use tracing::warn;

pub const DIAGNOSTIC_PREFIX: &str = "Metlo:";

pub(crate) fn format_diagnostic(message: &str) -> String {
    format!("{} {}", DIAGNOSTIC_PREFIX, message)
}

/// Print a diagnostic line to stdout and mirror it as a `warn!` event.
pub(crate) fn diagnostic(message: &str) {
    warn!(detail = message, "Engine unavailable");
    println!("{}", format_diagnostic(message));
}
