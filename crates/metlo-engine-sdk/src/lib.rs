//! Metlo Engine SDK
//!
//! Build the native library that `metlo-bridge` loads. Implement [`Engine`]
//! and export it with [`declare_engine!`]; the macro generates the
//! `metlo_startup`, `metlo_block_trace` and `metlo_ingest_trace` entry points.

mod data;

use std::ffi::c_char;
use std::fmt;

pub use anyhow::Result;
pub use data::{
    ExchangeData, KeyValueData, MetaData, RequestData, ResponseData, TraceData, UrlData,
};
pub use metlo_bridge::records::{ExchangeRecord, KeyValue, TraceRecord};

/// Settings passed to `metlo_startup`, copied into owned strings.
#[derive(Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub url: String,
    pub api_key: String,
    /// `0` when the host did not configure one.
    pub backend_port: u16,
    pub collector_port: u16,
    pub log_level: String,
    pub encryption_key: String,
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .field("backend_port", &self.backend_port)
            .field("collector_port", &self.collector_port)
            .field("log_level", &self.log_level)
            .field("encryption_key", &"<redacted>")
            .finish()
    }
}

impl EngineConfig {
    /// # Safety
    ///
    /// Every pointer must be null or a NUL-terminated string.
    pub unsafe fn from_raw(
        url: *const c_char,
        api_key: *const c_char,
        backend_port: u16,
        collector_port: u16,
        log_level: *const c_char,
        encryption_key: *const c_char,
    ) -> Self {
        Self {
            url: data::read_str(url),
            api_key: data::read_str(api_key),
            backend_port,
            collector_port,
            log_level: data::read_str(log_level),
            encryption_key: data::read_str(encryption_key),
        }
    }
}

/// Engine trait, the analysis side of the bridge.
///
/// One instance is built per process by the first successful `metlo_startup`.
pub trait Engine: Send + Sync + Sized + 'static {
    /// Build and start the engine
    fn startup(config: EngineConfig) -> Result<Self>;

    /// Decide whether to block an exchange
    fn block_trace(&self, exchange: &ExchangeData) -> bool;

    /// Take ownership of a completed trace
    fn ingest_trace(&self, trace: TraceData);
}

#[doc(hidden)]
pub mod __private {
    use std::ffi::c_char;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::OnceLock;

    use tracing::{info, warn};

    use super::{Engine, EngineConfig, ExchangeData, ExchangeRecord, TraceData, TraceRecord};

    pub unsafe fn startup<E: Engine>(
        slot: &OnceLock<E>,
        url: *const c_char,
        api_key: *const c_char,
        backend_port: u16,
        collector_port: u16,
        log_level: *const c_char,
        encryption_key: *const c_char,
    ) -> u8 {
        if slot.get().is_some() {
            return 1;
        }

        let config = EngineConfig::from_raw(
            url,
            api_key,
            backend_port,
            collector_port,
            log_level,
            encryption_key,
        );

        match catch_unwind(AssertUnwindSafe(|| E::startup(config))) {
            Ok(Ok(engine)) => {
                // A concurrent startup may have won; either way an engine is running.
                let _ = slot.set(engine);
                info!("Engine started");
                1
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Engine startup failed");
                0
            }
            Err(_) => {
                warn!("Engine panicked during startup");
                0
            }
        }
    }

    pub unsafe fn block_trace<E: Engine>(slot: &OnceLock<E>, record: ExchangeRecord) -> u8 {
        let Some(engine) = slot.get() else {
            return 0;
        };
        let exchange = ExchangeData::from_record(&record);
        let blocked = catch_unwind(AssertUnwindSafe(|| engine.block_trace(&exchange)));
        u8::from(blocked.unwrap_or(false))
    }

    pub unsafe fn ingest_trace<E: Engine>(slot: &OnceLock<E>, record: TraceRecord) {
        let Some(engine) = slot.get() else {
            return;
        };
        let trace = TraceData::from_record(&record);
        if catch_unwind(AssertUnwindSafe(|| engine.ingest_trace(trace))).is_err() {
            warn!("Engine panicked during trace ingestion");
        }
    }
}

/// Export an [`Engine`] implementation as the three C entry points.
///
/// ```ignore
/// use metlo_engine_sdk::*;
///
/// struct MyEngine;
/// impl Engine for MyEngine { ... }
///
/// declare_engine!(MyEngine);
/// ```
#[macro_export]
macro_rules! declare_engine {
    ($engine:ty) => {
        static __METLO_ENGINE: ::std::sync::OnceLock<$engine> = ::std::sync::OnceLock::new();

        /// # Safety
        ///
        /// Every pointer must be null or a NUL-terminated string.
        #[no_mangle]
        pub unsafe extern "C" fn metlo_startup(
            metlo_url: *const ::std::ffi::c_char,
            api_key: *const ::std::ffi::c_char,
            backend_port: u16,
            collector_port: u16,
            log_level: *const ::std::ffi::c_char,
            encryption_key: *const ::std::ffi::c_char,
        ) -> u8 {
            $crate::__private::startup(
                &__METLO_ENGINE,
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
        #[no_mangle]
        pub unsafe extern "C" fn metlo_block_trace(data: $crate::ExchangeRecord) -> u8 {
            $crate::__private::block_trace(&__METLO_ENGINE, data)
        }

        /// # Safety
        ///
        /// The record's pointers must satisfy `TraceData::from_record`.
        #[no_mangle]
        pub unsafe extern "C" fn metlo_ingest_trace(trace: $crate::TraceRecord) {
            $crate::__private::ingest_trace(&__METLO_ENGINE, trace)
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::ptr;

    #[test]
    fn test_config_from_raw() {
        let url = CString::new("https://example.com").unwrap();
        let key = CString::new("key123").unwrap();
        let level = CString::new("warn").unwrap();

        let config = unsafe {
            EngineConfig::from_raw(
                url.as_ptr(),
                key.as_ptr(),
                8080,
                8081,
                level.as_ptr(),
                ptr::null(),
            )
        };

        assert_eq!(config.url, "https://example.com");
        assert_eq!(config.backend_port, 8080);
        assert_eq!(config.collector_port, 8081);
        assert_eq!(config.log_level, "warn");
        assert!(config.encryption_key.is_empty());
        assert!(!format!("{:?}", config).contains("key123"));
    }
}
