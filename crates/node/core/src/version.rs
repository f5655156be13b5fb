//! Version information for the tether node.

/// The version string from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The git commit SHA, if provided at build time.
pub const GIT_SHA: &str = match option_env!("TETHER_GIT_SHA") {
    Some(sha) => sha,
    None => "unknown",
};

/// Version line shown in the startup banner and `--version` output.
pub fn long_version() -> String {
    format!("Version: {VERSION}\nCommit SHA: {GIT_SHA}")
}
