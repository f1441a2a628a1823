//! Owned, safe copies of the records an engine receives.

use std::ffi::{c_char, CStr};
use std::slice;

use anyhow::{Context, Result};
use serde::Serialize;

use metlo_bridge::records::{
    ExchangeRecord, KeyValue, RequestUrl, TraceMeta, TraceRecord, TraceRequest, TraceResponse,
};

/// Copy a C string, mapping null to an empty string.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated buffer.
pub(crate) unsafe fn read_str(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

unsafe fn read_pairs(ptr: *const KeyValue, len: usize) -> Vec<KeyValueData> {
    if ptr.is_null() || len == 0 {
        return Vec::new();
    }
    slice::from_raw_parts(ptr, len)
        .iter()
        .map(|pair| KeyValueData {
            name: read_str(pair.name),
            value: read_str(pair.value),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyValueData {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UrlData {
    pub host: String,
    pub path: String,
    pub parameters: Vec<KeyValueData>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestData {
    pub url: UrlData,
    pub headers: Vec<KeyValueData>,
    pub body: String,
    pub method: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResponseData {
    pub status: u16,
    pub headers: Vec<KeyValueData>,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaData {
    pub environment: String,
    pub incoming: bool,
    pub source: String,
    pub source_port: u16,
    pub destination: String,
    pub destination_port: u16,
    pub metlo_source: String,
}

/// Request side of an exchange awaiting a block decision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExchangeData {
    pub request: RequestData,
    pub meta: MetaData,
}

/// A completed request/response pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TraceData {
    pub request: RequestData,
    pub response: ResponseData,
    pub meta: MetaData,
}

impl UrlData {
    unsafe fn from_record(url: &RequestUrl) -> Self {
        Self {
            host: read_str(url.host),
            path: read_str(url.path),
            parameters: read_pairs(url.parameters, url.parameters_len),
        }
    }
}

impl RequestData {
    unsafe fn from_record(request: &TraceRequest) -> Self {
        Self {
            url: UrlData::from_record(&request.url),
            headers: read_pairs(request.headers, request.headers_len),
            body: read_str(request.body),
            method: read_str(request.method),
        }
    }
}

impl ResponseData {
    unsafe fn from_record(response: &TraceResponse) -> Self {
        Self {
            status: response.status,
            headers: read_pairs(response.headers, response.headers_len),
            body: read_str(response.body),
        }
    }
}

impl MetaData {
    unsafe fn from_record(meta: &TraceMeta) -> Self {
        Self {
            environment: read_str(meta.environment),
            incoming: meta.incoming,
            source: read_str(meta.source),
            source_port: meta.source_port,
            destination: read_str(meta.destination),
            destination_port: meta.destination_port,
            metlo_source: read_str(meta.metlo_source),
        }
    }
}

impl ExchangeData {
    /// Copy everything out of an exchange record.
    ///
    /// # Safety
    ///
    /// Every non-null string pointer must be NUL-terminated and every non-null
    /// array pointer must reference at least its `_len` elements.
    pub unsafe fn from_record(record: &ExchangeRecord) -> Self {
        Self {
            request: RequestData::from_record(&record.request),
            meta: MetaData::from_record(&record.meta),
        }
    }
}

impl TraceData {
    /// Copy everything out of a trace record.
    ///
    /// # Safety
    ///
    /// Same contract as [`ExchangeData::from_record`].
    pub unsafe fn from_record(record: &TraceRecord) -> Self {
        Self {
            request: RequestData::from_record(&record.request),
            response: ResponseData::from_record(&record.response),
            meta: MetaData::from_record(&record.meta),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize trace")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn test_empty_record_reads_as_empty() {
        let data = unsafe { TraceData::from_record(&TraceRecord::default()) };
        assert_eq!(data, TraceData::default());
    }

    #[test]
    fn test_exchange_copies_strings_and_pairs() {
        let host = CString::new("api.example.com").unwrap();
        let path = CString::new("/users/42").unwrap();
        let method = CString::new("POST").unwrap();
        let name = CString::new("X-Api-Key").unwrap();
        let value = CString::new("abc").unwrap();
        let source = CString::new("10.0.0.7").unwrap();
        let headers = [KeyValue {
            name: name.as_ptr(),
            value: value.as_ptr(),
        }];

        let mut record = ExchangeRecord::default();
        record.request.url.host = host.as_ptr();
        record.request.url.path = path.as_ptr();
        record.request.method = method.as_ptr();
        record.request.headers = headers.as_ptr();
        record.request.headers_len = headers.len();
        record.meta.source = source.as_ptr();
        record.meta.source_port = 51000;
        record.meta.incoming = true;

        let data = unsafe { ExchangeData::from_record(&record) };
        assert_eq!(data.request.url.host, "api.example.com");
        assert_eq!(data.request.url.path, "/users/42");
        assert_eq!(data.request.method, "POST");
        assert_eq!(data.request.headers.len(), 1);
        assert_eq!(data.request.headers[0].name, "X-Api-Key");
        assert!(data.request.body.is_empty());
        assert_eq!(data.meta.source, "10.0.0.7");
        assert_eq!(data.meta.source_port, 51000);
        assert!(data.meta.incoming);
    }

    #[test]
    fn test_zero_length_array_ignores_pointer() {
        let name = CString::new("ignored").unwrap();
        let pairs = [KeyValue {
            name: name.as_ptr(),
            value: name.as_ptr(),
        }];
        let mut record = TraceRecord::default();
        record.response.headers = pairs.as_ptr();
        record.response.headers_len = 0;

        let data = unsafe { TraceData::from_record(&record) };
        assert!(data.response.headers.is_empty());
    }

    #[test]
    fn test_trace_json_uses_camel_case_meta() {
        let mut data = TraceData::default();
        data.meta.source_port = 443;
        data.meta.metlo_source = "rust/bridge".into();

        let json: serde_json::Value = serde_json::from_str(&data.to_json().unwrap()).unwrap();
        assert_eq!(json["meta"]["sourcePort"], 443);
        assert_eq!(json["meta"]["metloSource"], "rust/bridge");
        assert_eq!(json["response"]["status"], 0);
    }
}
