//! Binding of the external engine library via libloading.
//!
//! The three entry points are plain `extern "C"` functions. They are resolved
//! once, copied out of their `Symbol`s, and kept valid by holding the
//! [`NativeModule`] in an `Arc` for as long as any [`NativeEngine`] exists.

use std::ffi::c_char;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use libloading::Library;
use tracing::debug;

use super::TraceEngine;
use crate::options::StartupArgs;
use crate::records::{ExchangeRecord, TraceRecord};

pub const STARTUP_SYMBOL: &str = "metlo_startup";
pub const BLOCK_TRACE_SYMBOL: &str = "metlo_block_trace";
pub const INGEST_TRACE_SYMBOL: &str = "metlo_ingest_trace";

/// `metlo_startup(url, api_key, backend_port, collector_port, log_level, encryption_key) -> u8`
pub type StartupFn = unsafe extern "C" fn(
    *const c_char,
    *const c_char,
    u16,
    u16,
    *const c_char,
    *const c_char,
) -> u8;

/// `metlo_block_trace(exchange) -> u8`
pub type BlockTraceFn = unsafe extern "C" fn(ExchangeRecord) -> u8;

/// `metlo_ingest_trace(trace)`
pub type IngestTraceFn = unsafe extern "C" fn(TraceRecord);

/// A loaded engine library. Unmapped when dropped.
pub struct NativeModule {
    library: Library,
    path: PathBuf,
}

impl fmt::Debug for NativeModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeModule")
            .field("path", &self.path)
            .finish()
    }
}

impl NativeModule {
    /// Load the shared library at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        // SAFETY: running the library's initialisers is the point of loading it;
        // the path is the engine's fixed install location.
        let library = unsafe { Library::new(path) }
            .with_context(|| format!("Failed to load library: {}", path.display()))?;

        debug!(path = %path.display(), "Engine library mapped");

        Ok(Self {
            library,
            path: path.to_path_buf(),
        })
    }

    /// Bind the running executable, which exports none of the entry points.
    #[cfg(all(test, unix))]
    pub(crate) fn this() -> Self {
        Self {
            library: Library::from(libloading::os::unix::Library::this()),
            path: PathBuf::from("<self>"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve one exported function and copy its pointer out.
    ///
    /// # Safety
    ///
    /// `F` must be the exact function pointer type the library exports under
    /// `name`. The returned pointer is only valid while this module is alive.
    pub unsafe fn entry_point<F: Copy>(&self, name: &str) -> Result<F> {
        let symbol = self
            .library
            .get::<F>(name.as_bytes())
            .with_context(|| format!("Symbol {} not found in {}", name, self.path.display()))?;
        Ok(*symbol)
    }
}

/// An entry point the engine library does not export.
#[derive(Debug)]
pub struct MissingEntryPoint {
    pub name: &'static str,
    pub error: anyhow::Error,
}

impl fmt::Display for MissingEntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error setting up {}: {:#}", self.name, self.error)
    }
}

impl std::error::Error for MissingEntryPoint {}

/// The engine's three entry points.
#[derive(Debug, Clone, Copy)]
pub struct EntryPoints {
    pub startup: StartupFn,
    pub block_trace: BlockTraceFn,
    pub ingest_trace: IngestTraceFn,
}

impl EntryPoints {
    /// Resolve all three entry points, stopping at the first that is missing.
    pub fn resolve(module: &NativeModule) -> std::result::Result<Self, MissingEntryPoint> {
        // SAFETY: the pointer types match the engine's exported signatures.
        unsafe {
            let startup = module
                .entry_point::<StartupFn>(STARTUP_SYMBOL)
                .map_err(|error| MissingEntryPoint {
                    name: STARTUP_SYMBOL,
                    error,
                })?;
            let block_trace = module
                .entry_point::<BlockTraceFn>(BLOCK_TRACE_SYMBOL)
                .map_err(|error| MissingEntryPoint {
                    name: BLOCK_TRACE_SYMBOL,
                    error,
                })?;
            let ingest_trace = module
                .entry_point::<IngestTraceFn>(INGEST_TRACE_SYMBOL)
                .map_err(|error| MissingEntryPoint {
                    name: INGEST_TRACE_SYMBOL,
                    error,
                })?;

            Ok(Self {
                startup,
                block_trace,
                ingest_trace,
            })
        }
    }
}

/// Engine backed by the external library's entry points.
pub struct NativeEngine {
    entry_points: EntryPoints,
    // Keeps the library mapped while the entry points are reachable.
    module: Option<Arc<NativeModule>>,
}

impl fmt::Debug for NativeEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeEngine")
            .field("module", &self.module)
            .finish()
    }
}

impl NativeEngine {
    /// Bind the entry points of a loaded module.
    pub fn bind(module: Arc<NativeModule>) -> std::result::Result<Self, MissingEntryPoint> {
        let entry_points = EntryPoints::resolve(&module)?;
        Ok(Self {
            entry_points,
            module: Some(module),
        })
    }

    /// Engine over entry points that are linked into the process.
    ///
    /// # Safety
    ///
    /// The pointers must stay callable for the lifetime of the engine.
    pub unsafe fn from_entry_points(entry_points: EntryPoints) -> Self {
        Self {
            entry_points,
            module: None,
        }
    }

    pub fn module(&self) -> Option<&Arc<NativeModule>> {
        self.module.as_ref()
    }
}

impl TraceEngine for NativeEngine {
    fn name(&self) -> &str {
        "native"
    }

    fn startup(&self, args: &StartupArgs<'_>) -> bool {
        // SAFETY: every string is a valid NUL-terminated buffer borrowed for the
        // duration of the call; the module outlives `self`.
        let status = unsafe {
            (self.entry_points.startup)(
                args.url.as_ptr(),
                args.api_key.as_ptr(),
                args.backend_port,
                args.collector_port,
                args.log_level.as_ptr(),
                args.encryption_key.as_ptr(),
            )
        };
        status == 1
    }

    fn should_block(&self, exchange: ExchangeRecord) -> bool {
        // SAFETY: the record is passed through untouched; its contents are the
        // caller's contract with the engine.
        unsafe { (self.entry_points.block_trace)(exchange) != 0 }
    }

    fn ingest(&self, trace: TraceRecord) {
        // SAFETY: as for `should_block`.
        unsafe { (self.entry_points.ingest_trace)(trace) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::StartupOptions;
    use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};

    static INGESTED_STATUS: AtomicU16 = AtomicU16::new(0);
    static STARTUP_PORTS: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn fake_startup(
        _url: *const c_char,
        _api_key: *const c_char,
        backend_port: u16,
        collector_port: u16,
        _log_level: *const c_char,
        _encryption_key: *const c_char,
    ) -> u8 {
        STARTUP_PORTS.store(
            (backend_port as usize) << 16 | collector_port as usize,
            Ordering::SeqCst,
        );
        1
    }

    unsafe extern "C" fn rejecting_startup(
        _url: *const c_char,
        _api_key: *const c_char,
        _backend_port: u16,
        _collector_port: u16,
        _log_level: *const c_char,
        _encryption_key: *const c_char,
    ) -> u8 {
        2
    }

    unsafe extern "C" fn block_incoming(exchange: ExchangeRecord) -> u8 {
        exchange.meta.incoming as u8
    }

    unsafe extern "C" fn record_status(trace: TraceRecord) {
        INGESTED_STATUS.store(trace.response.status, Ordering::SeqCst);
    }

    fn fake_entry_points(startup: StartupFn) -> EntryPoints {
        EntryPoints {
            startup,
            block_trace: block_incoming,
            ingest_trace: record_status,
        }
    }

    #[test]
    fn test_load_nonexistent_library() {
        let result = NativeModule::load(Path::new("/nonexistent/libmetlo.so"));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Failed to load"));
    }

    #[test]
    fn test_load_invalid_library() {
        let dir = tempfile::tempdir().unwrap();
        let fake_lib = dir.path().join("libmetlo.so");
        std::fs::write(&fake_lib, b"not a real library").unwrap();

        let result = NativeModule::load(&fake_lib);
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_bind_reports_first_missing_entry_point() {
        let module = Arc::new(NativeModule::this());
        let err = NativeEngine::bind(module).unwrap_err();
        assert_eq!(err.name, STARTUP_SYMBOL);
        assert!(err.to_string().contains("Error setting up metlo_startup"));
    }

    #[test]
    fn test_forwards_to_entry_points() {
        let engine = unsafe { NativeEngine::from_entry_points(fake_entry_points(fake_startup)) };
        let mut options = StartupOptions::new("https://example.com", "key123");
        options.backend_port = Some(8080);
        options.collector_port = 8081;
        let owned = options.to_c_strings().unwrap();

        assert!(engine.startup(&owned.as_args()));
        assert_eq!(STARTUP_PORTS.load(Ordering::SeqCst), 8080 << 16 | 8081);

        let mut exchange = ExchangeRecord::default();
        assert!(!engine.should_block(exchange));
        exchange.meta.incoming = true;
        assert!(engine.should_block(exchange));

        let mut trace = TraceRecord::default();
        trace.response.status = 418;
        engine.ingest(trace);
        assert_eq!(INGESTED_STATUS.load(Ordering::SeqCst), 418);
    }

    #[test]
    fn test_startup_requires_exactly_one() {
        let engine =
            unsafe { NativeEngine::from_entry_points(fake_entry_points(rejecting_startup)) };
        let owned = StartupOptions::new("https://example.com", "key123")
            .to_c_strings()
            .unwrap();
        assert!(!engine.startup(&owned.as_args()));
    }
}
