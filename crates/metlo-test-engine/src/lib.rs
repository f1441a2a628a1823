//! Minimal engine for exercising the real loader.
//!
//! Blocks every incoming exchange and counts ingested traces. Startup is
//! rejected when the api key is empty. `metlo_test_ingested` reports the count
//! so tests can see forwarded traces.

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::ensure;
use metlo_engine_sdk::{Engine, EngineConfig, ExchangeData, Result, TraceData};

static INGESTED: AtomicUsize = AtomicUsize::new(0);

pub struct FixtureEngine;

impl Engine for FixtureEngine {
    fn startup(config: EngineConfig) -> Result<Self> {
        ensure!(!config.api_key.is_empty(), "api key is required");
        Ok(Self)
    }

    fn block_trace(&self, exchange: &ExchangeData) -> bool {
        exchange.meta.incoming
    }

    fn ingest_trace(&self, _trace: TraceData) {
        INGESTED.fetch_add(1, Ordering::SeqCst);
    }
}

/// Number of traces ingested since the library was loaded.
#[no_mangle]
pub extern "C" fn metlo_test_ingested() -> usize {
    INGESTED.load(Ordering::SeqCst)
}

#[cfg(not(any(feature = "without-block-trace", feature = "without-ingest-trace")))]
metlo_engine_sdk::declare_engine!(FixtureEngine);

#[cfg(any(feature = "without-block-trace", feature = "without-ingest-trace"))]
mod partial {
    use std::ffi::c_char;
    use std::sync::OnceLock;

    use metlo_engine_sdk::__private;

    use super::FixtureEngine;

    static ENGINE: OnceLock<FixtureEngine> = OnceLock::new();

    /// # Safety
    ///
    /// Every pointer must be null or a NUL-terminated string.
    #[no_mangle]
    pub unsafe extern "C" fn metlo_startup(
        metlo_url: *const c_char,
        api_key: *const c_char,
        backend_port: u16,
        collector_port: u16,
        log_level: *const c_char,
        encryption_key: *const c_char,
    ) -> u8 {
        __private::startup(
            &ENGINE,
            metlo_url,
            api_key,
            backend_port,
            collector_port,
            log_level,
            encryption_key,
        )
    }

    /// # Safety
    ///
    /// The record's pointers must satisfy `ExchangeData::from_record`.
    #[cfg(not(feature = "without-block-trace"))]
    #[no_mangle]
    pub unsafe extern "C" fn metlo_block_trace(data: metlo_engine_sdk::ExchangeRecord) -> u8 {
        __private::block_trace(&ENGINE, data)
    }

    /// # Safety
    ///
    /// The record's pointers must satisfy `TraceData::from_record`.
    #[cfg(not(feature = "without-ingest-trace"))]
    #[no_mangle]
    pub unsafe extern "C" fn metlo_ingest_trace(trace: metlo_engine_sdk::TraceRecord) {
        __private::ingest_trace(&ENGINE, trace)
    }
}
