//! `#[repr(C)]` layouts of the records passed to the native engine.
//!
//! The bridge treats these as opaque payloads: it copies them by value into the
//! engine's entry points and never dereferences any pointer they carry. Strings
//! are null-terminated and owned by the caller for the duration of the call.

use std::ffi::c_char;
use std::ptr;

/// A single name/value pair (header, query parameter).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct KeyValue {
    pub name: *const c_char,
    pub value: *const c_char,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RequestUrl {
    pub host: *const c_char,
    pub path: *const c_char,
    pub parameters: *const KeyValue,
    pub parameters_len: usize,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TraceRequest {
    pub url: RequestUrl,
    pub headers: *const KeyValue,
    pub headers_len: usize,
    pub body: *const c_char,
    pub method: *const c_char,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TraceResponse {
    pub status: u16,
    pub headers: *const KeyValue,
    pub headers_len: usize,
    pub body: *const c_char,
}

/// Where the traffic came from and which ingestor observed it.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TraceMeta {
    pub environment: *const c_char,
    pub incoming: bool,
    pub source: *const c_char,
    pub source_port: u16,
    pub destination: *const c_char,
    pub destination_port: u16,
    pub metlo_source: *const c_char,
}

/// Input to the block decision. Built before the response exists.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct ExchangeRecord {
    pub request: TraceRequest,
    pub meta: TraceMeta,
}

/// A completed request/response pair handed over for ingestion.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceRecord {
    pub request: TraceRequest,
    pub response: TraceResponse,
    pub meta: TraceMeta,
}

impl Default for KeyValue {
    fn default() -> Self {
        Self {
            name: ptr::null(),
            value: ptr::null(),
        }
    }
}

impl Default for RequestUrl {
    fn default() -> Self {
        Self {
            host: ptr::null(),
            path: ptr::null(),
            parameters: ptr::null(),
            parameters_len: 0,
        }
    }
}

impl Default for TraceRequest {
    fn default() -> Self {
        Self {
            url: RequestUrl::default(),
            headers: ptr::null(),
            headers_len: 0,
            body: ptr::null(),
            method: ptr::null(),
        }
    }
}

impl Default for TraceResponse {
    fn default() -> Self {
        Self {
            status: 0,
            headers: ptr::null(),
            headers_len: 0,
            body: ptr::null(),
        }
    }
}

impl Default for TraceMeta {
    fn default() -> Self {
        Self {
            environment: ptr::null(),
            incoming: false,
            source: ptr::null(),
            source_port: 0,
            destination: ptr::null(),
            destination_port: 0,
            metlo_source: ptr::null(),
        }
    }
}
