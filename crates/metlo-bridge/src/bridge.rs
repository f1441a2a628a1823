//! The bridge between host traffic hooks and the native engine.
//!
//! State moves `Unloaded -> {Disabled | Initialized}` on each startup attempt.
//! Only `Initialized` forwards anything; every other state fails open.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::diagnostics::diagnostic;
use crate::engine::{InertEngine, NativeEngine, NativeModule, TraceEngine};
use crate::location;
use crate::options::StartupArgs;
use crate::records::{ExchangeRecord, TraceRecord};

/// Why the last startup attempt left the bridge disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisableReason {
    /// The startup call carried a null or otherwise unusable argument
    InvalidArguments,
    /// The engine library could not be located or loaded
    LoadFailed,
    /// The library does not export the named entry point
    MissingEntryPoint(&'static str),
    /// The engine's startup entry point reported failure
    StartupRejected,
    /// The engine panicked while starting
    StartupPanicked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeStatus {
    Unloaded,
    Disabled(DisableReason),
    Initialized,
}

struct State {
    status: BridgeStatus,
    engine: Arc<dyn TraceEngine>,
    // Present from a successful load until the next attempt or shutdown,
    // even when the entry points could not be bound.
    module: Option<Arc<NativeModule>>,
}

impl State {
    fn unloaded() -> Self {
        Self {
            status: BridgeStatus::Unloaded,
            engine: Arc::new(InertEngine),
            module: None,
        }
    }

    fn disabled(reason: DisableReason, module: Option<Arc<NativeModule>>) -> Self {
        Self {
            status: BridgeStatus::Disabled(reason),
            engine: Arc::new(InertEngine),
            module,
        }
    }
}

/// Loads the engine and forwards trace calls to it, failing open.
///
/// Startup attempts are serialized by their own lock. Loading, binding and the
/// engine's startup call all run without holding the state lock, and the
/// outcome is published in one short write. Concurrent callers of
/// [`Bridge::should_block`] and [`Bridge::ingest_trace`] therefore never wait
/// on an engine starting up: they see the previous state until the new one is
/// complete. An engine may call back into the bridge from its startup,
/// including [`Bridge::shutdown`].
pub struct Bridge {
    startup_lock: Mutex<()>,
    state: RwLock<State>,
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Bridge")
            .field("status", &state.status)
            .field("engine", &state.engine.name())
            .field("module", &state.module)
            .finish()
    }
}

impl Bridge {
    pub fn new() -> Self {
        Self {
            startup_lock: Mutex::new(()),
            state: RwLock::new(State::unloaded()),
        }
    }

    pub fn status(&self) -> BridgeStatus {
        self.state.read().status
    }

    pub fn is_initialized(&self) -> bool {
        self.status() == BridgeStatus::Initialized
    }

    /// Whether an engine library is currently mapped.
    pub fn has_module(&self) -> bool {
        self.state.read().module.is_some()
    }

    /// Load the engine from its install location and start it.
    ///
    /// Returns `true` only when the library loaded, all three entry points
    /// resolved, and the engine accepted the startup call.
    pub fn startup(&self, args: &StartupArgs<'_>) -> bool {
        let _attempt = self.startup_lock.lock();
        let next = match location::module_path() {
            Ok(path) => Self::load(&path, args),
            Err(e) => {
                diagnostic(&format!("Error loading dynamic library: {:#}", e));
                State::disabled(DisableReason::LoadFailed, None)
            }
        };
        self.publish(next)
    }

    /// Same as [`Bridge::startup`], loading the engine from `path`.
    pub fn startup_from_path(&self, path: &Path, args: &StartupArgs<'_>) -> bool {
        let _attempt = self.startup_lock.lock();
        let next = Self::load(path, args);
        self.publish(next)
    }

    /// Bind and start an already loaded module.
    #[cfg(test)]
    pub(crate) fn start_module(&self, module: NativeModule, args: &StartupArgs<'_>) -> bool {
        let _attempt = self.startup_lock.lock();
        let next = Self::bind(module, args);
        self.publish(next)
    }

    /// Start an engine that was built without going through the loader.
    pub fn start_engine(&self, engine: Arc<dyn TraceEngine>, args: &StartupArgs<'_>) -> bool {
        let _attempt = self.startup_lock.lock();
        let next = Self::start(engine, None, args);
        self.publish(next)
    }

    /// Fail a startup attempt without loading anything.
    ///
    /// The running engine, if any, is dropped and its library released.
    pub fn disable(&self, reason: DisableReason) {
        let _attempt = self.startup_lock.lock();
        warn!(?reason, "Bridge disabled");
        self.publish(State::disabled(reason, None));
    }

    fn load(path: &Path, args: &StartupArgs<'_>) -> State {
        match NativeModule::load(path) {
            Ok(module) => {
                info!(path = %path.display(), "Engine library loaded");
                Self::bind(module, args)
            }
            Err(e) => {
                diagnostic(&format!("Error loading dynamic library: {:#}", e));
                State::disabled(DisableReason::LoadFailed, None)
            }
        }
    }

    fn bind(module: NativeModule, args: &StartupArgs<'_>) -> State {
        let module = Arc::new(module);

        match NativeEngine::bind(module.clone()) {
            Ok(engine) => Self::start(Arc::new(engine), Some(module), args),
            Err(missing) => {
                diagnostic(&missing.to_string());
                State::disabled(DisableReason::MissingEntryPoint(missing.name), Some(module))
            }
        }
    }

    fn start(
        engine: Arc<dyn TraceEngine>,
        module: Option<Arc<NativeModule>>,
        args: &StartupArgs<'_>,
    ) -> State {
        match catch_unwind(AssertUnwindSafe(|| engine.startup(args))) {
            Ok(true) => {
                info!(engine = engine.name(), "Engine initialized");
                State {
                    status: BridgeStatus::Initialized,
                    engine,
                    module,
                }
            }
            Ok(false) => {
                warn!(engine = engine.name(), "Engine startup rejected");
                State::disabled(DisableReason::StartupRejected, module)
            }
            Err(_) => {
                warn!(engine = engine.name(), "Engine panicked during startup");
                State::disabled(DisableReason::StartupPanicked, module)
            }
        }
    }

    /// Swap in the outcome of a startup attempt.
    ///
    /// The replaced engine and library are dropped after the lock is released.
    fn publish(&self, next: State) -> bool {
        let started = next.status == BridgeStatus::Initialized;
        let previous = std::mem::replace(&mut *self.state.write(), next);
        drop(previous);
        started
    }

    fn engine(&self) -> Arc<dyn TraceEngine> {
        self.state.read().engine.clone()
    }

    /// Ask the engine whether to block an exchange.
    ///
    /// `false` whenever the engine is not initialized or the call panics.
    pub fn should_block(&self, exchange: ExchangeRecord) -> bool {
        let engine = self.engine();
        match catch_unwind(AssertUnwindSafe(|| engine.should_block(exchange))) {
            Ok(block) => {
                debug!(engine = engine.name(), block, "Block decision");
                block
            }
            Err(_) => {
                warn!(engine = engine.name(), "Engine panicked during block decision");
                false
            }
        }
    }

    /// Forward a trace to the engine. A no-op unless initialized.
    pub fn ingest_trace(&self, trace: TraceRecord) {
        let engine = self.engine();
        if catch_unwind(AssertUnwindSafe(|| engine.ingest(trace))).is_err() {
            warn!(engine = engine.name(), "Engine panicked during trace ingestion");
        }
    }

    /// Drop the engine and release the library.
    ///
    /// Returns whether a library was released; a second call, or a call on a
    /// bridge that never loaded one, returns `false`. The library is unmapped
    /// once the last in-flight call has returned.
    pub fn shutdown(&self) -> bool {
        let previous = std::mem::replace(&mut *self.state.write(), State::unloaded());
        let released = previous.module.is_some();
        drop(previous);
        if released {
            info!("Engine library released");
        }
        released
    }
}
