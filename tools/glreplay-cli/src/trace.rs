//! Recorded traces and their replay on the headless context.
//!
//! A trace is what a host session sent, written down as JSON:
//!
//! ```json
//! {
//!   "config": { "width": 320, "height": 240 },
//!   "resources": 4,
//!   "batches": [
//!     { "commands": [ ... ], "buffers": ["AACAPw=="] }
//!   ]
//! }
//! ```
//!
//! `buffers` holds the batch payloads, base64 encoded, in payload index
//! order.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use glreplay_common::GlReplayError;
use glreplay_engine::{
    Command, CommandBatch, GlViewer, RecordingSink, ReplayReport, ViewerConfig,
};
use glreplay_webgl::HeadlessContext;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Error type for trace operations.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed trace: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Batch {batch}, buffer {buffer}: {source}")]
    Payload {
        batch: usize,
        buffer: usize,
        #[source]
        source: base64::DecodeError,
    },

    #[error(transparent)]
    Replay(#[from] GlReplayError),
}

/// One recorded batch.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TraceBatch {
    #[serde(default)]
    pub clear: bool,
    #[serde(default)]
    pub only_once: bool,
    #[serde(default)]
    pub commands: Vec<Command>,
    #[serde(default)]
    pub buffers: Vec<String>,
}

/// A recorded session.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Trace {
    #[serde(default)]
    pub config: Option<ViewerConfig>,
    /// Number of resources the host registered, uids `0..resources`.
    #[serde(default)]
    pub resources: u32,
    #[serde(default)]
    pub batches: Vec<TraceBatch>,
}

impl Trace {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Decode every batch's payloads up front.
    pub fn decode_batches(&self) -> Result<Vec<(CommandBatch, Vec<Vec<u8>>)>, TraceError> {
        self.batches
            .iter()
            .enumerate()
            .map(|(batch, recorded)| {
                let payloads = recorded
                    .buffers
                    .iter()
                    .enumerate()
                    .map(|(buffer, encoded)| {
                        STANDARD
                            .decode(encoded)
                            .map_err(|source| TraceError::Payload {
                                batch,
                                buffer,
                                source,
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let commands = CommandBatch {
                    clear: recorded.clear,
                    only_once: recorded.only_once,
                    commands: recorded.commands.clone(),
                };
                Ok((commands, payloads))
            })
            .collect()
    }
}

/// A skipped command, flattened for output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    pub batch: usize,
    pub index: usize,
    pub cmd: &'static str,
    pub error: String,
}

/// A resource's info record after the last batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceRecord {
    pub uid: u32,
    pub info: serde_json::Value,
}

/// What a replay did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplaySummary {
    pub executed: usize,
    pub failures: Vec<FailureRecord>,
    pub draw_calls: usize,
    /// Info records mirrored to the host over the whole session.
    pub info_updates: usize,
    pub resources: Vec<ResourceRecord>,
}

impl ReplaySummary {
    fn record(&mut self, batch: usize, report: ReplayReport) {
        self.executed += report.executed;
        self.failures
            .extend(report.failures.into_iter().map(|failure| FailureRecord {
                batch,
                index: failure.index,
                cmd: failure.cmd,
                error: failure.error.to_string(),
            }));
    }
}

/// Options for [`replay`].
#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    /// Overrides the trace's own config.
    pub config: Option<ViewerConfig>,
    pub check_gl_errors: bool,
}

/// Replay `trace` on a fresh headless context.
pub fn replay(trace: &Trace, options: &ReplayOptions) -> Result<ReplaySummary, TraceError> {
    let config = options
        .config
        .clone()
        .or_else(|| trace.config.clone())
        .unwrap_or_default();
    let batches = trace.decode_batches()?;

    let context = HeadlessContext::new(config.width, config.height);
    let mut viewer = GlViewer::new(Some(context), config, RecordingSink::new())?
        .with_error_checks(options.check_gl_errors);
    for uid in 0..trace.resources {
        viewer.register_resource(uid)?;
    }

    let mut summary = ReplaySummary::default();
    for (index, (batch, payloads)) in batches.into_iter().enumerate() {
        debug!(
            batch = index,
            commands = batch.commands.len(),
            "Replaying batch"
        );
        let report = viewer.receive_batch(batch, payloads)?;
        summary.record(index, report);
    }

    summary.draw_calls = viewer
        .context()
        .map(|gl| gl.draw_calls().len())
        .unwrap_or_default();
    summary.info_updates = viewer.sink().records.len();
    summary.resources = viewer
        .registry()
        .iter()
        .map(|resource| {
            Ok(ResourceRecord {
                uid: resource.handle.0,
                info: serde_json::to_value(&resource.info)?,
            })
        })
        .collect::<Result<_, serde_json::Error>>()?;

    info!(
        executed = summary.executed,
        failed = summary.failures.len(),
        draws = summary.draw_calls,
        "Trace replayed"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_trace(value: serde_json::Value) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{value}").unwrap();
        file
    }

    fn f32_base64(values: &[f32]) -> String {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        STANDARD.encode(bytes)
    }

    #[test]
    fn test_load_and_replay() {
        let file = write_trace(json!({
            "config": {"width": 64, "height": 32},
            "resources": 1,
            "batches": [{
                "commands": [
                    {"cmd": "createBuffer", "resource": 0},
                    {"cmd": "bindBuffer", "target": "ARRAY_BUFFER", "buffer": 0},
                    {"cmd": "bufferData", "target": "ARRAY_BUFFER", "usage": "STATIC_DRAW", "update_info": true,
                     "buffer_metadata": {"index": 0, "dtype": "float32", "shape": [2]}},
                    {"cmd": "clearColor", "r": 0, "g": 0, "b": 0, "a": 1},
                    {"cmd": "clear", "color": true}
                ],
                "buffers": [f32_base64(&[1.0, 2.0])]
            }]
        }));

        let trace = Trace::load(file.path()).unwrap();
        let summary = replay(&trace, &ReplayOptions::default()).unwrap();
        assert_eq!(summary.executed, 5);
        assert!(summary.failures.is_empty());
        assert_eq!(summary.resources.len(), 1);
        assert_eq!(
            summary.resources[0].info,
            json!({"type": "Buffer", "size": 8, "target": "ARRAY_BUFFER"})
        );
        assert!(summary.info_updates >= 1);
    }

    #[test]
    fn test_failures_are_reported_per_batch() {
        let trace: Trace = serde_json::from_value(json!({
            "batches": [
                {"commands": [{"cmd": "depthFunc", "func": "sometimes"}]},
                {"commands": [{"cmd": "frobnicate"}]}
            ]
        }))
        .unwrap();
        let summary = replay(&trace, &ReplayOptions::default()).unwrap();
        // The second batch replays the first, so its failure shows twice.
        assert_eq!(summary.failures.len(), 3);
        assert_eq!(summary.failures[0].batch, 0);
        assert_eq!(summary.failures[0].cmd, "depthFunc");
        assert_eq!(summary.failures[2].batch, 1);
        assert_eq!(summary.failures[2].cmd, "unknown");
    }

    #[test]
    fn test_bad_base64_payload() {
        let trace: Trace = serde_json::from_value(json!({
            "batches": [{"commands": [], "buffers": ["not base64!"]}]
        }))
        .unwrap();
        let err = replay(&trace, &ReplayOptions::default()).unwrap_err();
        assert!(matches!(err, TraceError::Payload { batch: 0, buffer: 0, .. }));
    }

    #[test]
    fn test_config_override() {
        let trace: Trace = serde_json::from_value(json!({
            "config": {"move_keys": "wa"},
            "resources": 0
        }))
        .unwrap();
        assert!(matches!(
            replay(&trace, &ReplayOptions::default()),
            Err(TraceError::Replay(_))
        ));

        let options = ReplayOptions {
            config: Some(ViewerConfig::default()),
            check_gl_errors: true,
        };
        let summary = replay(&trace, &options).unwrap();
        assert_eq!(summary, ReplaySummary::default());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Trace::load("/nonexistent/trace.json"),
            Err(TraceError::Io(_))
        ));
    }
}
