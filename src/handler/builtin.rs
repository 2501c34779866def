//! Message handlers shipped with the harness

use crate::errors::{Result, SwarmError};
use crate::handler::MessageHandler;
use crate::message::{MessageKind, TopicMessage};

use tracing::{debug, info};

/// Logs every message at debug level
#[derive(Debug, Default)]
pub struct LogHandler {
    seen: u64,
}

impl LogHandler {
    pub const NAME: &'static str = "log";
}

impl MessageHandler for LogHandler {
    fn handle(&mut self, message: &TopicMessage) -> Result<()> {
        self.seen += 1;
        debug!(
            "#{} {:?} on {} headers={:?} ({} bytes)",
            self.seen,
            message.kind,
            message.topic,
            message.headers,
            message.data.len()
        );
        Ok(())
    }
}

/// Checks that delta sequence headers increase by one
#[derive(Debug, Default)]
pub struct SequenceHandler {
    last: Option<u64>,
    gaps: u64,
}

impl SequenceHandler {
    pub const NAME: &'static str = "sequence";

    pub fn gaps(&self) -> u64 {
        self.gaps
    }
}

impl MessageHandler for SequenceHandler {
    fn handle(&mut self, message: &TopicMessage) -> Result<()> {
        if message.kind != MessageKind::Delta {
            return Ok(());
        }
        let Some(sequence) = message.sequence() else {
            return Ok(());
        };

        let previous = self.last.replace(sequence);
        match previous {
            Some(previous) if sequence != previous + 1 => {
                self.gaps += 1;
                Err(SwarmError::handler(format!(
                    "Sequence gap on {}: expected {}, got {}",
                    message.topic,
                    previous + 1,
                    sequence
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Tracks payload sizes and logs a summary when dropped
#[derive(Debug, Default)]
pub struct PayloadSizeHandler {
    messages: u64,
    total_bytes: u64,
    largest: usize,
}

impl PayloadSizeHandler {
    pub const NAME: &'static str = "payload-size";

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn largest(&self) -> usize {
        self.largest
    }
}

impl MessageHandler for PayloadSizeHandler {
    fn handle(&mut self, message: &TopicMessage) -> Result<()> {
        let size = message.data.len();
        self.messages += 1;
        self.total_bytes += size as u64;
        self.largest = self.largest.max(size);
        Ok(())
    }
}

impl Drop for PayloadSizeHandler {
    fn drop(&mut self) {
        if self.messages > 0 {
            info!(
                "Payload sizes: {} messages, {} bytes total, largest {} bytes, average {} bytes",
                self.messages,
                self.total_bytes,
                self.largest,
                self.total_bytes / self.messages
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(seq: u64) -> TopicMessage {
        TopicMessage::delta("Stress", "x").with_headers([seq.to_string()])
    }

    #[test]
    fn test_sequence_accepts_consecutive_deltas() {
        let mut handler = SequenceHandler::default();
        handler.handle(&TopicMessage::load("Stress", "state")).unwrap();
        for seq in 1..=5 {
            handler.handle(&delta(seq)).unwrap();
        }
        assert_eq!(handler.gaps(), 0);
    }

    #[test]
    fn test_sequence_reports_gap_and_resyncs() {
        let mut handler = SequenceHandler::default();
        handler.handle(&delta(1)).unwrap();
        assert!(matches!(
            handler.handle(&delta(3)),
            Err(SwarmError::Handler(_))
        ));
        handler.handle(&delta(4)).unwrap();
        assert_eq!(handler.gaps(), 1);
    }

    #[test]
    fn test_sequence_ignores_deltas_without_header() {
        let mut handler = SequenceHandler::default();
        handler.handle(&TopicMessage::delta("Stress", "x")).unwrap();
        handler.handle(&delta(9)).unwrap();
        handler.handle(&TopicMessage::delta("Stress", "y")).unwrap();
        handler.handle(&delta(10)).unwrap();
        assert_eq!(handler.gaps(), 0);
    }

    #[test]
    fn test_payload_size_tracks_total_and_largest() {
        let mut handler = PayloadSizeHandler::default();
        handler.handle(&TopicMessage::load("T", "abcd")).unwrap();
        handler.handle(&TopicMessage::delta("T", "ab")).unwrap();
        handler.handle(&TopicMessage::delta("T", "abcdefgh")).unwrap();
        assert_eq!(handler.total_bytes(), 14);
        assert_eq!(handler.largest(), 8);
    }

    #[test]
    fn test_log_handler_never_fails() {
        let mut handler = LogHandler::default();
        assert!(handler.handle(&delta(1)).is_ok());
        assert!(handler.handle(&TopicMessage::load("T", "")).is_ok());
    }
}
