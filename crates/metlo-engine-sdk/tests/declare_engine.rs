use std::ffi::CString;
use std::sync::{Arc, Mutex};

use anyhow::bail;
use metlo_bridge::{Bridge, BridgeStatus, EntryPoints, NativeEngine, StartupOptions};
use metlo_engine_sdk::*;

struct RecordingEngine {
    config: EngineConfig,
    ingested: Mutex<Vec<TraceData>>,
}

impl Engine for RecordingEngine {
    fn startup(config: EngineConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            bail!("missing api key");
        }
        Ok(Self {
            config,
            ingested: Mutex::new(Vec::new()),
        })
    }

    fn block_trace(&self, exchange: &ExchangeData) -> bool {
        exchange
            .request
            .headers
            .iter()
            .any(|h| h.name.eq_ignore_ascii_case("x-block"))
    }

    fn ingest_trace(&self, trace: TraceData) {
        self.ingested.lock().unwrap().push(trace);
    }
}

declare_engine!(RecordingEngine);

fn ingested_paths() -> Vec<String> {
    __METLO_ENGINE
        .get()
        .map(|engine| {
            engine
                .ingested
                .lock()
                .unwrap()
                .iter()
                .map(|t| t.request.url.path.clone())
                .collect()
        })
        .unwrap_or_default()
}

// The generated entry points share one engine slot, so the lifecycle runs in
// a single test.
#[test]
fn test_engine_lifecycle_through_bridge() {
    let name = CString::new("X-Block").unwrap();
    let value = CString::new("1").unwrap();
    let headers = [KeyValue {
        name: name.as_ptr(),
        value: value.as_ptr(),
    }];
    let mut blocked = ExchangeRecord::default();
    blocked.request.headers = headers.as_ptr();
    blocked.request.headers_len = headers.len();

    // Nothing runs before startup.
    assert_eq!(unsafe { metlo_block_trace(blocked) }, 0);
    unsafe { metlo_ingest_trace(TraceRecord::default()) };
    assert!(ingested_paths().is_empty());

    let bridge = Bridge::new();
    let entry_points = EntryPoints {
        startup: metlo_startup,
        block_trace: metlo_block_trace,
        ingest_trace: metlo_ingest_trace,
    };
    let engine = Arc::new(unsafe { NativeEngine::from_entry_points(entry_points) });

    // An engine error is a rejected startup.
    let rejected = StartupOptions::new("https://example.com", "");
    let owned = rejected.to_c_strings().unwrap();
    assert!(!bridge.start_engine(engine.clone(), &owned.as_args()));
    assert!(!bridge.is_initialized());
    assert!(!bridge.should_block(blocked));

    let mut options = StartupOptions::new("https://example.com", "key123");
    options.backend_port = Some(8080);
    options.encryption_key = "enc".into();
    let owned = options.to_c_strings().unwrap();
    assert!(bridge.start_engine(engine.clone(), &owned.as_args()));
    assert_eq!(bridge.status(), BridgeStatus::Initialized);

    let config = &__METLO_ENGINE.get().unwrap().config;
    assert_eq!(config.url, "https://example.com");
    assert_eq!(config.api_key, "key123");
    assert_eq!(config.backend_port, 8080);
    assert_eq!(config.collector_port, 8081);
    assert_eq!(config.encryption_key, "enc");

    // A repeat startup keeps the running engine.
    assert!(bridge.start_engine(engine, &owned.as_args()));

    assert!(bridge.should_block(blocked));
    assert!(!bridge.should_block(ExchangeRecord::default()));

    let path = CString::new("/users/42").unwrap();
    let mut trace = TraceRecord::default();
    trace.request.url.path = path.as_ptr();
    trace.response.status = 200;
    bridge.ingest_trace(trace);
    assert_eq!(ingested_paths(), vec!["/users/42".to_string()]);

    bridge.shutdown();
    bridge.ingest_trace(trace);
    assert_eq!(ingested_paths().len(), 1);
}
