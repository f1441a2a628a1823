use std::ffi::{CStr, CString};
use std::fmt;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Log levels the engine understands
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Port value passed to the engine when no backend port is configured
pub const UNSET_PORT: u16 = 0;

/// Arguments handed verbatim to the engine's `metlo_startup` entry point.
#[derive(Clone, Copy)]
pub struct StartupArgs<'a> {
    pub url: &'a CStr,
    pub api_key: &'a CStr,
    pub backend_port: u16,
    pub collector_port: u16,
    pub log_level: &'a CStr,
    pub encryption_key: &'a CStr,
}

impl fmt::Debug for StartupArgs<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartupArgs")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .field("backend_port", &self.backend_port)
            .field("collector_port", &self.collector_port)
            .field("log_level", &self.log_level)
            .field("encryption_key", &"<redacted>")
            .finish()
    }
}

/// Owned startup settings, for hosts that configure the bridge from Rust.
#[derive(Clone, Deserialize)]
pub struct StartupOptions {
    pub url: String,
    pub api_key: String,
    /// Unset unless configured; the engine then picks its own backend port.
    #[serde(default)]
    pub backend_port: Option<u16>,
    #[serde(default = "default_collector_port")]
    pub collector_port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub encryption_key: String,
}

fn default_collector_port() -> u16 {
    8081
}

fn default_log_level() -> String {
    "info".to_string()
}

impl fmt::Debug for StartupOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartupOptions")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .field("backend_port", &self.backend_port)
            .field("collector_port", &self.collector_port)
            .field("log_level", &self.log_level)
            .field("encryption_key", &"<redacted>")
            .finish()
    }
}

impl StartupOptions {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            backend_port: None,
            collector_port: default_collector_port(),
            log_level: default_log_level(),
            encryption_key: String::new(),
        }
    }

    /// Read settings from `METLO_HOST`, `METLO_KEY`, `BACKEND_PORT`,
    /// `COLLECTOR_PORT`, `LOG_LEVEL` and `METLO_ENCRYPTION_KEY`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let url = lookup("METLO_HOST")
            .context("No value for METLO_HOST, set it in the environment")?;
        let api_key =
            lookup("METLO_KEY").context("No value for METLO_KEY, set it in the environment")?;

        let mut options = Self::new(url, api_key);

        if let Some(port) = lookup("BACKEND_PORT") {
            let port = port
                .parse()
                .with_context(|| format!("Invalid BACKEND_PORT: {}", port))?;
            options.backend_port = Some(port);
        }
        if let Some(port) = lookup("COLLECTOR_PORT") {
            options.collector_port = port
                .parse()
                .with_context(|| format!("Invalid COLLECTOR_PORT: {}", port))?;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            options.log_level = level;
        }
        if let Some(key) = lookup("METLO_ENCRYPTION_KEY") {
            options.encryption_key = key;
        }

        options.validate()?;
        Ok(options)
    }

    /// Reject a log level the engine would not recognise.
    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            bail!(
                "Invalid log level '{}', expected one of {:?}",
                self.log_level,
                LOG_LEVELS
            );
        }
        Ok(())
    }

    /// Convert to null-terminated strings for the C entry point.
    ///
    /// An unset backend port is passed as [`UNSET_PORT`].
    pub fn to_c_strings(&self) -> Result<OwnedStartupArgs> {
        Ok(OwnedStartupArgs {
            url: CString::new(self.url.as_str()).context("url contains a NUL byte")?,
            api_key: CString::new(self.api_key.as_str()).context("api_key contains a NUL byte")?,
            backend_port: self.backend_port.unwrap_or(UNSET_PORT),
            collector_port: self.collector_port,
            log_level: CString::new(self.log_level.as_str())
                .context("log_level contains a NUL byte")?,
            encryption_key: CString::new(self.encryption_key.as_str())
                .context("encryption_key contains a NUL byte")?,
        })
    }
}

/// Backing storage for a [`StartupArgs`] built from [`StartupOptions`].
pub struct OwnedStartupArgs {
    url: CString,
    api_key: CString,
    backend_port: u16,
    collector_port: u16,
    log_level: CString,
    encryption_key: CString,
}

impl OwnedStartupArgs {
    pub fn as_args(&self) -> StartupArgs<'_> {
        StartupArgs {
            url: &self.url,
            api_key: &self.api_key,
            backend_port: self.backend_port,
            collector_port: self.collector_port,
            log_level: &self.log_level,
            encryption_key: &self.encryption_key,
        }
    }
}
