use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc::UnboundedSender;

use crate::utils::error::ModbusError;

/// Fault report handed to the driver's owner out of band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorNotification {
    pub message: String,
    pub code: Option<u8>,
    /// Address or operation the fault belongs to.
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorNotification {
    pub fn new(message: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            source: source.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn from_error(err: &ModbusError, source: impl Into<String>) -> Self {
        Self {
            message: err.to_string(),
            code: Some(err.code()),
            source: source.into(),
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for ErrorNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "[{}] {} (code {})", self.source, self.message, code),
            None => write!(f, "[{}] {}", self.source, self.message),
        }
    }
}

/// Receiver of error notifications. Must not block the caller.
pub trait ErrorSink: Send + Sync {
    fn notify(&self, notification: ErrorNotification);
}

/// Writes notifications to the log.
pub struct LogSink;

impl ErrorSink for LogSink {
    fn notify(&self, notification: ErrorNotification) {
        error!("❌ {}", notification);
    }
}

/// Drops every notification.
pub struct NullSink;

impl ErrorSink for NullSink {
    fn notify(&self, _notification: ErrorNotification) {}
}

impl ErrorSink for UnboundedSender<ErrorNotification> {
    fn notify(&self, notification: ErrorNotification) {
        // A closed receiver just means nobody is listening any more
        let _ = self.send(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_channel_sink() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.notify(ErrorNotification::from_error(
            &ModbusError::Exception { code: 2 },
            "1:40001",
        ));

        let received = rx.try_recv().unwrap();
        assert_eq!(received.code, Some(2));
        assert_eq!(received.source, "1:40001");
        assert!(received.message.contains("illegal data address"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel::<ErrorNotification>();
        drop(rx);
        tx.notify(ErrorNotification::new("lost", "test"));
    }

    #[test]
    fn test_display() {
        let n = ErrorNotification::from_error(&ModbusError::Timeout, "2:30001");
        assert_eq!(n.to_string(), "[2:30001] Timeout occurred (code 255)");
    }
}
