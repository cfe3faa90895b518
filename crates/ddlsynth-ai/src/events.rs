use async_trait::async_trait;
use ddlsynth_core::Row;
use serde::{Deserialize, Serialize};

/// Where a table's rows came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RowSource {
    Ai,
    Fallback,
    Minimal,
    Deterministic,
}

/// Progress notifications emitted while a dataset is produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProgressEvent {
    #[serde(rename_all = "camelCase")]
    TableStarted {
        table: String,
        index: usize,
        total: usize,
    },
    #[serde(rename_all = "camelCase")]
    RowsChunk {
        table: String,
        rows: Vec<Row>,
        delivered: usize,
        total: usize,
    },
    #[serde(rename_all = "camelCase")]
    TableCompleted {
        table: String,
        rows: usize,
        source: RowSource,
    },
    /// Share of tables fully delivered, in `[0, 1]`.
    Progress { ratio: f64 },
}

/// Receiver of [`ProgressEvent`]s.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn emit(&self, event: ProgressEvent);
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

#[async_trait]
impl ProgressSink for NoopSink {
    async fn emit(&self, _event: ProgressEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = ProgressEvent::TableCompleted {
            table: "users".to_string(),
            rows: 3,
            source: RowSource::Fallback,
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "type": "tableCompleted",
                "table": "users",
                "rows": 3,
                "source": "fallback"
            })
        );
    }
}
