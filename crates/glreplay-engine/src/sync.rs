//! Mirroring resource info back to the host.

use serde_json::Value;
use tracing::warn;

use crate::info::ResourceInfo;
use crate::registry::Handle;

/// Receives changed info records after each batch.
pub trait InfoSink {
    fn publish(&mut self, handle: Handle, info: &ResourceInfo);
}

impl<F> InfoSink for F
where
    F: FnMut(Handle, &ResourceInfo),
{
    fn publish(&mut self, handle: Handle, info: &ResourceInfo) {
        self(handle, info)
    }
}

/// Drops every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl InfoSink for NullSink {
    fn publish(&mut self, _handle: Handle, _info: &ResourceInfo) {}
}

/// Keeps the JSON form of every published record, latest last.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub records: Vec<(Handle, Value)>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent record published for `handle`.
    pub fn latest(&self, handle: Handle) -> Option<&Value> {
        self.records
            .iter()
            .rev()
            .find(|(h, _)| *h == handle)
            .map(|(_, value)| value)
    }
}

impl InfoSink for RecordingSink {
    fn publish(&mut self, handle: Handle, info: &ResourceInfo) {
        match serde_json::to_value(info) {
            Ok(value) => self.records.push((handle, value)),
            Err(e) => warn!(%handle, error = %e, "Failed to serialize info record"),
        }
    }
}
