//! Spreadsheet sink abstraction

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

use super::rows::Row;

/// Errors reported by a sink; all of them are retried by the scheduler
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Quota exceeded: {0}")]
    Quota(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Write rejected: {0}")]
    Rejected(String),
}

impl SinkError {
    /// Classify an HTTP status returned by the remote sheet API
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 | 403 => SinkError::Auth(body),
            429 => SinkError::Quota(body),
            500..=599 => SinkError::Network(format!("HTTP {status}: {body}")),
            _ => SinkError::Rejected(format!("HTTP {status}: {body}")),
        }
    }
}

impl From<reqwest::Error> for SinkError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => SinkError::from_status(status.as_u16(), err.to_string()),
            None => SinkError::Network(err.to_string()),
        }
    }
}

/// Destination worksheet; a write replaces the whole worksheet
#[async_trait]
pub trait SheetSink: Send + Sync {
    async fn clear_and_write_rows(&self, rows: &[Row]) -> Result<(), SinkError>;

    /// Human-readable destination for logs and status
    fn describe(&self) -> String;
}

/// Sink that keeps the last written grid in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    rows: Mutex<Vec<Row>>,
    writes: Mutex<u64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<Row> {
        self.rows.lock().clone()
    }

    pub fn write_count(&self) -> u64 {
        *self.writes.lock()
    }
}

#[async_trait]
impl SheetSink for MemorySink {
    async fn clear_and_write_rows(&self, rows: &[Row]) -> Result<(), SinkError> {
        *self.rows.lock() = rows.to_vec();
        *self.writes.lock() += 1;
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(SinkError::from_status(401, "x"), SinkError::Auth(_)));
        assert!(matches!(SinkError::from_status(403, "x"), SinkError::Auth(_)));
        assert!(matches!(SinkError::from_status(429, "x"), SinkError::Quota(_)));
        assert!(matches!(SinkError::from_status(503, "x"), SinkError::Network(_)));
        assert!(matches!(SinkError::from_status(400, "x"), SinkError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_memory_sink_overrides() {
        let sink = MemorySink::new();
        let first = vec![vec!["h".to_string()], vec!["a".to_string()], vec!["b".to_string()]];
        sink.clear_and_write_rows(&first).await.unwrap();
        sink.clear_and_write_rows(&first[..2]).await.unwrap();
        assert_eq!(sink.rows().len(), 2);
        assert_eq!(sink.write_count(), 2);
    }
}
