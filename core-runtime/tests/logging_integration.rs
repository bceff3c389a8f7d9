//! Integration tests for logging system

use async_trait::async_trait;
use bridge_traits::error::Result as SinkResult;
use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{
    init_logging, redact_if_sensitive, strip_path, LogFormat, LoggingConfig,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct CollectingSink {
    entries: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl LoggerSink for CollectingSink {
    async fn log(&self, entry: LogEntry) -> SinkResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        LogLevel::Info
    }
}

// Global subscriber can only be installed once per test binary, so a single
// test covers init, forwarding and the second-init error.
#[tokio::test]
async fn test_init_logging_forwards_to_sink_once() {
    let sink = Arc::new(CollectingSink::default());
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_filter("logging_integration=debug")
        .with_logger_sink(sink.clone());

    init_logging(config).unwrap();

    tracing::debug!(item_id = "li_1", "below sink threshold");
    tracing::info!(session_id = "s1", api_token = "abc", "session synced");

    // Sink delivery is spawned on the runtime
    tokio::time::sleep(Duration::from_millis(50)).await;

    {
        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "session synced");
        assert_eq!(entries[0].fields.get("session_id"), Some(&"s1".to_string()));
        assert_eq!(
            entries[0].fields.get("api_token"),
            Some(&"[REDACTED]".to_string())
        );
    }

    assert!(init_logging(LoggingConfig::default()).is_err());
}

#[test]
fn test_pii_redaction() {
    assert_eq!(redact_if_sensitive("api_token", "abc"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("password", "hunter2"), "[REDACTED]");

    let email = redact_if_sensitive("account", "listener@example.com");
    assert!(!email.contains("example.com"));

    assert_eq!(redact_if_sensitive("item_id", "li_42"), "li_42");
    assert_eq!(redact_if_sensitive("title", "Dune"), "Dune");
}

#[test]
fn test_path_stripping() {
    assert_eq!(strip_path("/data/downloads/li_1/3.m4a"), "3.m4a");
    assert_eq!(strip_path("D:\\data\\li_1\\0.mp3"), "0.mp3");
    assert_eq!(strip_path(""), "");
}
