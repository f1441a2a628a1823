//! C entry points for host ingestors (cgo, C middleware).
//!
//! One process-wide [`Bridge`] backs these functions. No panic crosses the
//! boundary: every export falls back to its fail-open result instead.
#![allow(non_snake_case)]

use std::ffi::{c_char, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::LazyLock;

use tracing::{debug, warn};

use crate::bridge::{Bridge, DisableReason};
use crate::diagnostics::diagnostic;
use crate::options::StartupArgs;
use crate::records::{ExchangeRecord, TraceRecord};

static BRIDGE: LazyLock<Bridge> = LazyLock::new(Bridge::new);

static CLEANUP_REGISTERED: AtomicBool = AtomicBool::new(false);

/// The bridge behind the C entry points.
pub fn global_bridge() -> &'static Bridge {
    &BRIDGE
}

unsafe fn c_str<'a>(ptr: *const c_char) -> Option<&'a CStr> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr))
    }
}

/// Register [`Metlo_cleanup`] to run at process exit, at most once.
///
/// Returns whether this call registered it.
fn register_exit_cleanup() -> bool {
    if CLEANUP_REGISTERED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return false;
    }

    // SAFETY: the callback takes no arguments and never unwinds.
    if unsafe { libc::atexit(cleanup_at_exit) } != 0 {
        warn!("Failed to register engine cleanup at exit");
        CLEANUP_REGISTERED.store(false, Ordering::SeqCst);
        return false;
    }
    true
}

extern "C" fn cleanup_at_exit() {
    Metlo_cleanup();
}

/// Load and start the engine. Returns 1 when initialized, 0 otherwise.
///
/// # Safety
///
/// Every pointer must be null or a valid NUL-terminated string that stays
/// alive for the duration of the call.
#[no_mangle]
pub unsafe extern "C" fn Metlo_startup(
    metlo_url: *const c_char,
    api_key: *const c_char,
    backend_port: u16,
    collector_port: u16,
    log_level: *const c_char,
    encryption_key: *const c_char,
) -> u8 {
    let result = catch_unwind(AssertUnwindSafe(|| {
        let (Some(url), Some(api_key), Some(log_level), Some(encryption_key)) = (
            c_str(metlo_url),
            c_str(api_key),
            c_str(log_level),
            c_str(encryption_key),
        ) else {
            diagnostic("Error starting up: null startup argument");
            BRIDGE.disable(DisableReason::InvalidArguments);
            return false;
        };

        crate::init_logging(log_level.to_str().unwrap_or("info"));

        let args = StartupArgs {
            url,
            api_key,
            backend_port,
            collector_port,
            log_level,
            encryption_key,
        };

        let started = BRIDGE.startup(&args);
        if BRIDGE.has_module() && register_exit_cleanup() {
            debug!("Registered engine cleanup at exit");
        }
        started
    }));

    u8::from(result.unwrap_or(false))
}

/// 1 if the engine asks to block this exchange. 0 when it does not, or when
/// no engine is running.
#[no_mangle]
pub extern "C" fn Metlo_block_trace(data: ExchangeRecord) -> u8 {
    let blocked = catch_unwind(AssertUnwindSafe(|| BRIDGE.should_block(data)));
    u8::from(blocked.unwrap_or(false))
}

/// Forward a trace to the engine; dropped when no engine is running.
#[no_mangle]
pub extern "C" fn Metlo_ingest_trace(trace: TraceRecord) {
    let _ = catch_unwind(AssertUnwindSafe(|| BRIDGE.ingest_trace(trace)));
}

/// Release the engine library. Safe to call any number of times.
#[no_mangle]
pub extern "C" fn Metlo_cleanup() {
    let _ = catch_unwind(AssertUnwindSafe(|| BRIDGE.shutdown()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_cleanup_registered_once() {
        assert!(register_exit_cleanup());
        assert!(!register_exit_cleanup());
        assert!(!register_exit_cleanup());
        assert!(CLEANUP_REGISTERED.load(Ordering::SeqCst));
    }
}
