//! The analysis engine behind the bridge.
//!
//! [`NativeEngine`] forwards to entry points bound from the external module;
//! [`InertEngine`] stands in whenever that module is unavailable.

pub mod native;

pub use native::{
    BlockTraceFn, EntryPoints, IngestTraceFn, MissingEntryPoint, NativeEngine, NativeModule,
    StartupFn, BLOCK_TRACE_SYMBOL, INGEST_TRACE_SYMBOL, STARTUP_SYMBOL,
};

use crate::options::StartupArgs;
use crate::records::{ExchangeRecord, TraceRecord};

/// Engine interface the bridge forwards to.
pub trait TraceEngine: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Start the engine. `true` means it is ready to receive traffic.
    fn startup(&self, args: &StartupArgs<'_>) -> bool;

    /// Decide whether the exchange should be blocked
    fn should_block(&self, exchange: ExchangeRecord) -> bool;

    /// Hand a completed trace over for analysis
    fn ingest(&self, trace: TraceRecord);
}

/// Engine used when the native module is missing or incompatible.
///
/// Never starts, never blocks, drops every trace.
#[derive(Debug, Default, Clone, Copy)]
pub struct InertEngine;

impl TraceEngine for InertEngine {
    fn name(&self) -> &str {
        "inert"
    }

    fn startup(&self, _args: &StartupArgs<'_>) -> bool {
        false
    }

    fn should_block(&self, _exchange: ExchangeRecord) -> bool {
        false
    }

    fn ingest(&self, _trace: TraceRecord) {}
}
