use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A single line appended to a deployment's log pipeline (§4.1).
///
/// Levels are advisory only — ordering and persistence never depend on
/// `level`, just on append order.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct LogEntry {
    /// Monotonic within a deployment; assigned by the durable store, not by
    /// the ring buffer (a replayed ring entry and its durable row share it
    /// once the batched writer has flushed).
    pub id: Option<i64>,
    pub level: LogLevel,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(level: LogLevel, content: impl Into<String>) -> Self {
        Self {
            id: None,
            level,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// The `data: <LEVEL> <ISO-timestamp> <content>` line shape required by
    /// the SSE contract in §6.
    pub fn to_sse_data(&self) -> String {
        format!(
            "{} {} {}",
            self.level,
            self.timestamp.to_rfc3339(),
            self.content
        )
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, Eq, PartialEq, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
#[strum(ascii_case_insensitive)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_data_matches_contract_shape() {
        let entry = LogEntry::new(LogLevel::Info, "cloning repository");
        let line = entry.to_sse_data();
        assert!(line.starts_with("INFO "));
        assert!(line.ends_with("cloning repository"));
    }
}
