//! Counter backend on the Windows Performance Data Helper API.
//!
//! Each counter gets its own PDH query, so one counter's object vanishing
//! cannot spoil reads of the others.

use std::mem;
use std::ptr;

use windows_sys::Win32::System::Performance::{
    PdhAddEnglishCounterW, PdhCloseQuery, PdhCollectQueryData, PdhEnumObjectItemsW,
    PdhGetFormattedCounterValue, PdhOpenQueryW, PDH_FMT_COUNTERVALUE, PDH_HCOUNTER, PDH_HQUERY,
};

use crate::core::system_monitor::{CounterBackend, CounterPath, RawCounter, ReadFailure};
use crate::error::{MonitorError, Result};

const ERROR_SUCCESS: u32 = 0;
const PDH_MORE_DATA: u32 = 0x8000_07D2;
const PDH_CSTATUS_NO_INSTANCE: u32 = 0x8000_07D1;
const PDH_CSTATUS_NO_OBJECT: u32 = 0xC000_0BB8;
const PDH_CSTATUS_NO_COUNTER: u32 = 0xC000_0BB9;
const PDH_FMT_DOUBLE: u32 = 0x0000_0200;
const PDH_FMT_NOCAP100: u32 = 0x0000_8000;
const PERF_DETAIL_WIZARD: u32 = 400;

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Split a double-NUL-terminated UTF-16 string list.
fn split_multi_sz(buffer: &[u16]) -> Vec<String> {
    buffer
        .split(|c| *c == 0)
        .take_while(|s| !s.is_empty())
        .map(String::from_utf16_lossy)
        .collect()
}

fn status_text(status: u32) -> String {
    format!("PDH status 0x{:08X}", status)
}

/// Maps a failed read status onto how the handle should react.
fn classify(status: u32) -> ReadFailure {
    match status {
        PDH_CSTATUS_NO_INSTANCE | PDH_CSTATUS_NO_OBJECT => {
            ReadFailure::Vanished(status_text(status))
        }
        _ => ReadFailure::Transient(status_text(status)),
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PdhBackend;

impl PdhBackend {
    pub fn new() -> Self {
        Self
    }
}

impl CounterBackend for PdhBackend {
    fn open(&self, path: &CounterPath) -> Result<Box<dyn RawCounter>> {
        let full_path = wide(&path.to_string());

        unsafe {
            let mut query: PDH_HQUERY = mem::zeroed();
            let status = PdhOpenQueryW(ptr::null(), 0, &mut query) as u32;
            if status != ERROR_SUCCESS {
                return Err(MonitorError::acquisition(path, status_text(status)));
            }

            let mut counter: PDH_HCOUNTER = mem::zeroed();
            let status = PdhAddEnglishCounterW(query, full_path.as_ptr(), 0, &mut counter) as u32;
            if status != ERROR_SUCCESS {
                PdhCloseQuery(query);
                let reason = match status {
                    PDH_CSTATUS_NO_OBJECT => "unknown category".to_string(),
                    PDH_CSTATUS_NO_COUNTER => "unknown counter".to_string(),
                    PDH_CSTATUS_NO_INSTANCE => "unknown instance".to_string(),
                    other => status_text(other),
                };
                return Err(MonitorError::acquisition(path, reason));
            }

            Ok(Box::new(PdhCounter { query, counter }))
        }
    }

    fn instances(&self, category: &str) -> Result<Vec<String>> {
        let object = wide(category);
        let mut counter_len: u32 = 0;
        let mut instance_len: u32 = 0;

        unsafe {
            let status = PdhEnumObjectItemsW(
                ptr::null(),
                ptr::null(),
                object.as_ptr(),
                ptr::null_mut(),
                &mut counter_len,
                ptr::null_mut(),
                &mut instance_len,
                PERF_DETAIL_WIZARD,
                0,
            ) as u32;
            if status != PDH_MORE_DATA && status != ERROR_SUCCESS {
                return Err(MonitorError::acquisition(category, status_text(status)));
            }

            let mut counters = vec![0u16; counter_len as usize];
            let mut instances = vec![0u16; instance_len as usize];
            let status = PdhEnumObjectItemsW(
                ptr::null(),
                ptr::null(),
                object.as_ptr(),
                counters.as_mut_ptr(),
                &mut counter_len,
                instances.as_mut_ptr(),
                &mut instance_len,
                PERF_DETAIL_WIZARD,
                0,
            ) as u32;
            if status != ERROR_SUCCESS {
                return Err(MonitorError::acquisition(category, status_text(status)));
            }

            Ok(split_multi_sz(&instances))
        }
    }
}

struct PdhCounter {
    query: PDH_HQUERY,
    counter: PDH_HCOUNTER,
}

// PDH handles may be used from any thread; the registry serializes access.
unsafe impl Send for PdhCounter {}

impl RawCounter for PdhCounter {
    fn next_value(&mut self) -> std::result::Result<f64, ReadFailure> {
        unsafe {
            let status = PdhCollectQueryData(self.query) as u32;
            if status != ERROR_SUCCESS {
                return Err(classify(status));
            }

            let mut value: PDH_FMT_COUNTERVALUE = mem::zeroed();
            let status = PdhGetFormattedCounterValue(
                self.counter,
                PDH_FMT_DOUBLE | PDH_FMT_NOCAP100,
                ptr::null_mut(),
                &mut value,
            ) as u32;
            if status != ERROR_SUCCESS {
                return Err(classify(status));
            }
            if value.CStatus != ERROR_SUCCESS {
                return Err(classify(value.CStatus));
            }

            Ok(value.Anonymous.doubleValue)
        }
    }
}

impl Drop for PdhCounter {
    fn drop(&mut self) {
        unsafe {
            PdhCloseQuery(self.query);
        }
    }
}
