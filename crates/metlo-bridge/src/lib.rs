//! Fail-open bridge to the native Metlo engine.
//!
//! The engine library is loaded from its fixed install location at startup.
//! When it is missing or incompatible every call degrades to "do not block"
//! and traces are dropped, so the host application is never affected.

pub mod bridge;
pub mod diagnostics;
pub mod engine;
pub mod exports;
pub mod location;
pub mod options;
pub mod records;

pub use bridge::{Bridge, BridgeStatus, DisableReason};
pub use engine::{EntryPoints, InertEngine, NativeEngine, NativeModule, TraceEngine};
pub use options::{OwnedStartupArgs, StartupArgs, StartupOptions};
pub use records::{
    ExchangeRecord, KeyValue, RequestUrl, TraceMeta, TraceRecord, TraceRequest, TraceResponse,
};

/// Initialize structured JSON logging on stderr.
///
/// `RUST_LOG` takes precedence over `default_level`. Does nothing if the host
/// already installed a global subscriber.
pub fn init_logging(default_level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
