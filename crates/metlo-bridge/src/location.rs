//! Fixed install location of the native engine, per platform.

use std::path::PathBuf;

#[cfg(not(unix))]
use anyhow::bail;
use anyhow::Result;

/// Install path on Linux and macOS.
pub const UNIX_MODULE_PATH: &str = "/opt/metlo/libmetlo.so";

/// Appended verbatim to `%APPDATA%` on Windows.
pub const APPDATA_MODULE_SUFFIX: &str = "local/metlo/libmetlo.so";

/// Join an `APPDATA` value with the engine suffix.
///
/// No separator is inserted between the two.
pub fn appdata_module_path(appdata: &str) -> PathBuf {
    let mut path = String::with_capacity(appdata.len() + APPDATA_MODULE_SUFFIX.len());
    path.push_str(appdata);
    path.push_str(APPDATA_MODULE_SUFFIX);
    PathBuf::from(path)
}

/// Resolve the engine path for the running platform.
#[cfg(unix)]
pub fn module_path() -> Result<PathBuf> {
    Ok(PathBuf::from(UNIX_MODULE_PATH))
}

#[cfg(windows)]
pub fn module_path() -> Result<PathBuf> {
    use anyhow::Context;

    let appdata = std::env::var("APPDATA").context("APPDATA is not set")?;
    if appdata.is_empty() {
        bail!("APPDATA is empty");
    }
    Ok(appdata_module_path(&appdata))
}

#[cfg(not(any(unix, windows)))]
pub fn module_path() -> Result<PathBuf> {
    bail!("No engine install location for this platform")
}
